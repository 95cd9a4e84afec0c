//! Provider Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A provider error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No provider is registered for a repository's implementation or layout tag.
    #[display("no {_0} provider registered for tag {_1:?}")]
    UnsupportedProvider(#[error(not(source))] &'static str, #[error(not(source))] String),
    /// The storage provider could not open a backend for the repository.
    #[display("could not open storage for repository {_0}")]
    Backend(#[error(not(source))] String),
    /// The layout provider does not hold versions like this one.
    #[display("version {_0} is not accepted by this repository")]
    VersionRejected(#[error(not(source))] String),
    /// Listing one version directory failed.
    #[display("could not scan {}", _0.display())]
    Scan(#[error(not(source))] PathBuf),
    #[display("storage operation failed")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Scan(_) | Self::Storage)
    }
}
