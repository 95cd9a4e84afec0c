//! Version metadata for depot repositories.
//!
//! Each `group:artifact` has one [`MetadataDocument`] stored as
//! `maven-metadata.json` in its GA directory. The [`MetadataEngine`] derives
//! it from the version directories on disk ([`rebuild`](MetadataEngine::rebuild))
//! or folds in a fragment from elsewhere ([`merge`](MetadataEngine::merge)),
//! serializing both per document through a [`LockTable`].

mod document;
mod engine;
pub mod error;
mod lock;

pub use crate::document::{MetadataDocument, SnapshotBlock, format_last_updated};
pub use crate::engine::{MetadataEngine, RebuildSummary};
pub use crate::lock::{LockTable, MetadataGuard, MetadataKey};
