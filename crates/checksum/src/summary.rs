use std::fmt::Display;
use std::path::PathBuf;

/// A file (or listing) the checksum walk could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl ChecksumFailure {
    pub fn new(path: impl Into<PathBuf>, reason: &impl Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a regeneration pass.
///
/// `files_processed` counts every file visited, failed ones included.
/// `files_rewritten` counts files that had at least one sidecar written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumSummary {
    pub files_processed: u64,
    pub files_failed: u64,
    pub files_rewritten: u64,
    pub failures: Vec<ChecksumFailure>,
}

impl ChecksumSummary {
    pub(crate) fn record_success(&mut self, rewritten: bool) {
        self.files_processed += 1;
        if rewritten {
            self.files_rewritten += 1;
        }
    }

    pub(crate) fn record_failure(&mut self, failure: ChecksumFailure) {
        self.files_processed += 1;
        self.files_failed += 1;
        self.failures.push(failure);
    }

    /// Fold another pass into this one.
    pub fn absorb(&mut self, other: ChecksumSummary) {
        self.files_processed += other.files_processed;
        self.files_failed += other.files_failed;
        self.files_rewritten += other.files_rewritten;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.files_failed == 0
    }
}
