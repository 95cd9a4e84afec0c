//! Storage providers: where a repository's bytes live.

use crate::error::{ErrorKind, Result};
use dashmap::DashMap;
use depot_config::Repository;
use depot_storage::BackendHandle;
use depot_storage::backend::LocalBackend;
use exn::{OptionExt, ResultExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Opens the [`StorageBackend`](depot_storage::StorageBackend) for a
/// repository. Selected by the repository's `implementation` tag.
pub trait StorageProvider: Send + Sync {
    /// Backend rooted at the repository's base directory. Repeated calls for
    /// the same repository may return the same handle.
    fn backend(&self, repository: &Repository) -> Result<BackendHandle>;
}

/// Repositories stored as plain directory trees on the local filesystem.
#[derive(Default)]
pub struct FileSystemStorageProvider {
    backends: DashMap<(String, PathBuf), BackendHandle>,
}

impl FileSystemStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for FileSystemStorageProvider {
    fn backend(&self, repository: &Repository) -> Result<BackendHandle> {
        let key = (repository.key(), repository.basedir.clone());
        if let Some(handle) = self.backends.get(&key) {
            return Ok(handle.clone());
        }
        debug!(repository = %repository.key(), basedir = %repository.basedir.display(), "opening local backend");
        let backend = LocalBackend::new(repository.key(), &repository.basedir)
            .or_raise(|| ErrorKind::Backend(repository.key()))?;
        let handle: BackendHandle = Arc::new(backend);
        // A concurrent caller may have won the race; either handle is fine.
        Ok(self.backends.entry(key).or_insert(handle).clone())
    }
}

/// Backends supplied up front, keyed by `storage/repository`.
///
/// For embedding depot over storage it does not manage itself, and for tests
/// that run against in-memory backends.
#[derive(Default)]
pub struct FixedStorageProvider {
    backends: DashMap<String, BackendHandle>,
}

impl FixedStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(self, storage_id: &str, repository_id: &str, backend: BackendHandle) -> Self {
        self.backends.insert(format!("{storage_id}/{repository_id}"), backend);
        self
    }
}

impl StorageProvider for FixedStorageProvider {
    fn backend(&self, repository: &Repository) -> Result<BackendHandle> {
        let handle = self
            .backends
            .get(&repository.key())
            .ok_or_raise(|| ErrorKind::Backend(repository.key()))?;
        Ok(handle.clone())
    }
}
