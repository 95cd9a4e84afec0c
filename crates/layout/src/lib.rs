//! Coordinate & layout resolution for depot repositories.
//!
//! Everything in this crate is a pure function of its inputs: converting
//! [`Coordinate`]s to repository-relative paths and back, and ordering
//! [`Version`]s the way Maven clients expect.

mod consts;
mod coordinate;
pub mod error;
mod layout;
mod version;

pub use crate::consts::{AUXILIARY_SUFFIXES, METADATA_FILE_NAME, SNAPSHOT_SUFFIX};
pub use crate::coordinate::Coordinate;
pub use crate::layout::{FileKind, Layout};
pub use crate::version::{Version, VersionKind};
