//! Provider registry for depot repositories.
//!
//! A repository names two providers by tag: a [`StorageProvider`] (its
//! `implementation`, which decides where bytes live) and a
//! [`LayoutProvider`] (its `layout`, which decides how coordinates map to
//! paths and which versions belong). The [`ProviderRegistry`] resolves both
//! and hands back a [`RepositoryHandle`] the engines work through.

pub mod error;
mod layout;
mod registry;
mod storage;

pub use crate::layout::{Artifact, LayoutProvider, Maven2Provider, VersionDirectory, VersionPolicy};
pub use crate::registry::{ProviderRegistry, RepositoryHandle};
pub use crate::storage::{FileSystemStorageProvider, FixedStorageProvider, StorageProvider};
