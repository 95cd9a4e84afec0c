//! Engine Error Types
//!
//! Validation and policy kinds are returned as-is so callers can reject a
//! request with a specific reason. Failures from lower crates are wrapped in
//! the kind naming the subsystem, keeping the original as a child.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The policy flag a request ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Policy {
    #[display("deployment")]
    Deployment,
    #[display("redeployment")]
    Redeployment,
    #[display("deletion")]
    Deletion,
}

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The storage id was missing or names no configured storage.
    #[display("no such storage: {_0:?}")]
    NoSuchStorage(#[error(not(source))] String),
    #[display("no such repository: {_0:?}")]
    NoSuchRepository(#[error(not(source))] String),
    /// The artifact path was missing, empty or escapes the repository.
    #[display("invalid artifact path: {_0:?}")]
    InvalidArtifactPath(#[error(not(source))] String),
    #[display("{_0} is not allowed in this repository")]
    PolicyViolation(#[error(not(source))] Policy),
    /// A provider could not be resolved or failed.
    #[display("provider failure")]
    Provider,
    #[display("checksum failure")]
    Checksum,
    #[display("metadata failure")]
    Metadata,
    #[display("storage failure")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Checksum | Self::Metadata | Self::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorKind::PolicyViolation(Policy::Redeployment).to_string(),
            "redeployment is not allowed in this repository"
        );
        assert_eq!(ErrorKind::NoSuchStorage("storage9".into()).to_string(), "no such storage: \"storage9\"");
    }

    #[test]
    fn test_policy_errors_are_final() {
        assert!(!ErrorKind::PolicyViolation(Policy::Deletion).is_retryable());
        assert!(!ErrorKind::InvalidArtifactPath(String::new()).is_retryable());
        assert!(ErrorKind::Storage.is_retryable());
    }
}
