//! Checksum Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A checksum error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for checksum operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configured digest algorithm is not known. Raised before any file is
    /// touched.
    #[display("digest algorithm unavailable: {_0}")]
    AlgorithmUnavailable(#[error(not(source))] String),
    #[display("could not read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("could not digest {}", _0.display())]
    Digest(#[error(not(source))] PathBuf),
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AlgorithmUnavailable(_))
    }
}
