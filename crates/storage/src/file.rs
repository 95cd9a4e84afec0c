//! File metadata returned by storage backends for listing and stat calls.

use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by storage backends.
///
/// This represents information about a file in storage, used for traversal
/// during checksum regeneration and metadata rebuilds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from repository root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// The final path component as UTF-8, if it is representable.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_component() {
        let info = FileInfo::new("org/acme/widget/1.0/widget-1.0.jar", 3, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.file_name(), Some("widget-1.0.jar"));
    }
}
