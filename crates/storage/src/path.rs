//! Path validation for repository-relative storage paths.
//!
//! Artifact paths arrive from deploy requests, job definitions and directory
//! walks. Every one of them goes through [`validate`] before a backend turns
//! it into something on disk.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the repository root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use depot_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("org/acme/widget/1.0/widget-1.0.jar").is_ok());
/// assert!(validate_path("org/../org/acme").is_ok()); // (never leaves repository root)
/// // Invalid paths
/// assert!(validate_path("../storage1/releases").is_err());
/// assert!(validate_path("org/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("org/./acme//widget/../widget/1.0/").unwrap(),
///     Path::new("org/acme/widget/1.0")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    // Rust's component parser takes care of duplicate separators and `.`
    // segments, and keeps non-UTF8 names intact.
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls; reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(
            validate(Path::new("org/acme/widget/1.0/widget-1.0.jar")).unwrap(),
            Path::new("org/acme/widget/1.0/widget-1.0.jar")
        );
        assert_eq!(validate(Path::new("maven-metadata.json")).unwrap(), Path::new("maven-metadata.json"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("org//acme//widget")).unwrap(), Path::new("org/acme/widget"));
        assert_eq!(validate(Path::new("org/./acme/./widget")).unwrap(), Path::new("org/acme/widget"));
        assert_eq!(validate(Path::new("/org/acme")).unwrap(), Path::new("org/acme"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../snapshots/org")).is_err());
        assert!(validate(Path::new("org/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
        assert!(validate(Path::new("../..")).is_err());
    }

    #[test]
    fn test_reverse_attempts() {
        // Traversal remains within repository root
        assert_eq!(validate(Path::new("org/acme/..")).unwrap(), Path::new("org"));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("\0")).is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
        assert!(validate(Path::new("./")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }

    #[test]
    fn test_trailing_slashes() {
        assert_eq!(validate(Path::new("org/acme/")).unwrap(), Path::new("org/acme"));
        assert_eq!(validate(Path::new("org/acme///")).unwrap(), Path::new("org/acme"));
    }
}
