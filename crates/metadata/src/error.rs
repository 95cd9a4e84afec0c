//! Metadata Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A stored document could not be parsed. Rebuild recovers from this on
    /// its own; only [`get`](crate::MetadataEngine::get) reports it.
    #[display("corrupt metadata document: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    #[display("could not read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The GA directory itself could not be listed.
    #[display("could not scan {}", _0.display())]
    Scan(#[error(not(source))] PathBuf),
    /// Writing the document failed. Nothing partial is visible.
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    #[display("could not delete {}", _0.display())]
    Delete(#[error(not(source))] PathBuf),
    /// A fragment handed to merge does not describe the target coordinate,
    /// or carries an unusable version or stamp.
    #[display("invalid metadata fragment: {_0}")]
    InvalidFragment(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Scan(_) | Self::Write(_) | Self::Delete(_))
    }
}
