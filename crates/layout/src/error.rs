//! Layout Error Types

use derive_more::{Display, Error};

/// A layout error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for layout operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Coordinate string could not be parsed.
    #[display("invalid coordinate: {_0}")]
    InvalidCoordinate(#[error(not(source))] String),
    /// Version string is empty or contains characters that cannot appear in a path segment.
    #[display("invalid version: {_0}")]
    InvalidVersion(#[error(not(source))] String),
    /// The layout tag does not name a known layout.
    #[display("unknown layout: {_0}")]
    UnknownLayout(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
