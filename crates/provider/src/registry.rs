use crate::error::{ErrorKind, Result};
use crate::layout::{Artifact, LayoutProvider, Maven2Provider, VersionDirectory, VersionPolicy};
use crate::storage::{FileSystemStorageProvider, StorageProvider};
use depot_config::Repository;
use depot_layout::{Coordinate, FileKind};
use depot_storage::BackendHandle;
use exn::OptionExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maps repository tags to provider implementations.
///
/// Built once at startup and handed to every component that needs it. Tags
/// are matched case-insensitively.
///
/// ```
/// use depot_config::Repository;
/// use depot_provider::ProviderRegistry;
///
/// let registry = ProviderRegistry::with_defaults();
/// let repository = Repository::new("storage0", "snapshots", "/srv/depot/snapshots").with_layout("maven2-snapshot");
/// assert!(registry.resolve_layout_provider(&repository).is_ok());
/// let unknown = repository.with_layout("npm");
/// assert!(registry.resolve_layout_provider(&unknown).is_err());
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    storage: HashMap<String, Arc<dyn StorageProvider>>,
    layout: HashMap<String, Arc<dyn LayoutProvider>>,
}

impl ProviderRegistry {
    /// A registry with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// `file-system` storage, and the `maven2`, `maven2-release` and
    /// `maven2-snapshot` layouts.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_storage_provider("file-system", FileSystemStorageProvider::new())
            .with_layout_provider("maven2", Maven2Provider::new(VersionPolicy::Mixed))
            .with_layout_provider("maven2-release", Maven2Provider::new(VersionPolicy::Release))
            .with_layout_provider("maven2-snapshot", Maven2Provider::new(VersionPolicy::Snapshot))
    }

    /// Register a storage provider, returning the one it replaced.
    pub fn register_storage_provider(
        &mut self,
        tag: &str,
        provider: impl StorageProvider + 'static,
    ) -> Option<Arc<dyn StorageProvider>> {
        self.storage.insert(tag.to_ascii_lowercase(), Arc::new(provider))
    }

    /// Register a layout provider, returning the one it replaced.
    pub fn register_layout_provider(
        &mut self,
        tag: &str,
        provider: impl LayoutProvider + 'static,
    ) -> Option<Arc<dyn LayoutProvider>> {
        self.layout.insert(tag.to_ascii_lowercase(), Arc::new(provider))
    }

    pub fn with_storage_provider(mut self, tag: &str, provider: impl StorageProvider + 'static) -> Self {
        self.register_storage_provider(tag, provider);
        self
    }

    pub fn with_layout_provider(mut self, tag: &str, provider: impl LayoutProvider + 'static) -> Self {
        self.register_layout_provider(tag, provider);
        self
    }

    pub fn resolve_storage_provider(&self, repository: &Repository) -> Result<Arc<dyn StorageProvider>> {
        let provider = self
            .storage
            .get(&repository.implementation.to_ascii_lowercase())
            .ok_or_raise(|| ErrorKind::UnsupportedProvider("storage", repository.implementation.clone()))?;
        Ok(Arc::clone(provider))
    }

    pub fn resolve_layout_provider(&self, repository: &Repository) -> Result<Arc<dyn LayoutProvider>> {
        let provider = self
            .layout
            .get(&repository.layout.to_ascii_lowercase())
            .ok_or_raise(|| ErrorKind::UnsupportedProvider("layout", repository.layout.clone()))?;
        Ok(Arc::clone(provider))
    }

    /// Resolve both providers and open the repository's backend.
    pub fn open(&self, repository: &Repository) -> Result<RepositoryHandle> {
        let layout = self.resolve_layout_provider(repository)?;
        let backend = self.resolve_storage_provider(repository)?.backend(repository)?;
        Ok(RepositoryHandle {
            repository: repository.clone(),
            backend,
            layout,
        })
    }
}

/// A repository with its providers resolved.
#[derive(Clone)]
pub struct RepositoryHandle {
    repository: Repository,
    backend: BackendHandle,
    layout: Arc<dyn LayoutProvider>,
}

impl RepositoryHandle {
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn layout_provider(&self) -> &dyn LayoutProvider {
        self.layout.as_ref()
    }

    pub fn resolve_path(&self, coordinate: &Coordinate) -> Result<PathBuf> {
        self.layout.resolve_path(coordinate)
    }

    pub fn to_coordinate(&self, path: &Path) -> Option<Coordinate> {
        self.layout.to_coordinate(path)
    }

    pub fn classify(&self, path: &Path) -> Option<FileKind> {
        self.layout.classify(path)
    }

    pub fn ga_path(&self, group_id: &str, artifact_id: &str) -> PathBuf {
        self.layout.layout().ga_path(group_id, artifact_id)
    }

    pub fn metadata_path(&self, group_id: &str, artifact_id: &str) -> PathBuf {
        self.layout.layout().metadata_path(group_id, artifact_id)
    }

    pub async fn exists(&self, coordinate: &Coordinate) -> Result<bool> {
        self.layout.exists(self.backend.as_ref(), coordinate).await
    }

    pub async fn list_version_directories(&self, ga_path: &Path) -> Result<Vec<Result<VersionDirectory>>> {
        self.layout.list_version_directories(self.backend.as_ref(), ga_path).await
    }

    pub fn find_coordinates<'a>(&'a self, prefix: Option<&'a Path>) -> BoxStream<'a, Result<Artifact>> {
        self.layout.find_coordinates(self.backend.as_ref(), prefix)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut storage: Vec<&String> = self.storage.keys().collect();
        let mut layout: Vec<&String> = self.layout.keys().collect();
        storage.sort();
        layout.sort();
        f.debug_struct("ProviderRegistry").field("storage", &storage).field("layout", &layout).finish()
    }
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("repository", &self.repository.key())
            .field("backend", &self.backend.name())
            .field("layout", &self.layout.layout())
            .finish()
    }
}
