use crate::error::{ErrorKind, Result};
use crate::validator::OperationValidator;
use depot_checksum::{ChecksumEngine, ChecksumStatus, ChecksumSummary, DigestAlgorithm};
use depot_config::Configuration;
use depot_layout::{Coordinate, FileKind};
use depot_metadata::{MetadataDocument, MetadataEngine, MetadataKey, RebuildSummary};
use depot_provider::{ProviderRegistry, RepositoryHandle};
use depot_storage::StorageBackend;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Every operation the engine offers to the outside, by storage and
/// repository id.
///
/// Cheap to clone; clones share the configuration, the provider registry
/// and the metadata lock table.
#[derive(Debug, Clone)]
pub struct Depot {
    configuration: Arc<Configuration>,
    registry: Arc<ProviderRegistry>,
    validator: OperationValidator,
    checksums: ChecksumEngine,
    metadata: MetadataEngine,
}

impl Depot {
    /// Fails if the configured checksum algorithms are not all available.
    pub fn new(configuration: Configuration, registry: ProviderRegistry) -> Result<Self> {
        let checksums = ChecksumEngine::new(configuration.checksum()).or_raise(|| ErrorKind::Checksum)?;
        let configuration = Arc::new(configuration);
        Ok(Self {
            validator: OperationValidator::new(Arc::clone(&configuration)),
            configuration,
            registry: Arc::new(registry),
            metadata: MetadataEngine::new(checksums.clone()),
            checksums,
        })
    }

    /// [`new`](Self::new) with the built-in providers.
    pub fn with_defaults(configuration: Configuration) -> Result<Self> {
        Self::new(configuration, ProviderRegistry::with_defaults())
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn validator(&self) -> &OperationValidator {
        &self.validator
    }

    pub fn checksums(&self) -> &ChecksumEngine {
        &self.checksums
    }

    pub fn metadata(&self) -> &MetadataEngine {
        &self.metadata
    }

    /// Resolve a configured repository to its providers.
    pub fn open(&self, storage_id: &str, repository_id: &str) -> Result<RepositoryHandle> {
        let repository = self.validator.repository(Some(storage_id), Some(repository_id))?;
        self.registry.open(repository).or_raise(|| ErrorKind::Provider)
    }

    pub async fn rebuild_metadata(
        &self,
        storage_id: &str,
        repository_id: &str,
        base_path: Option<&Path>,
    ) -> Result<RebuildSummary> {
        let handle = self.open(storage_id, repository_id)?;
        self.metadata.rebuild(&handle, base_path).await.or_raise(|| ErrorKind::Metadata)
    }

    pub async fn merge_metadata(
        &self,
        storage_id: &str,
        repository_id: &str,
        coordinate: &Coordinate,
        fragment: &MetadataDocument,
    ) -> Result<MetadataDocument> {
        let handle = self.open(storage_id, repository_id)?;
        self.metadata.merge(&handle, coordinate, fragment).await.or_raise(|| ErrorKind::Metadata)
    }

    /// The document for `coordinate`'s group and artifact, if one is stored.
    pub async fn get_metadata(
        &self,
        storage_id: &str,
        repository_id: &str,
        coordinate: &Coordinate,
    ) -> Result<Option<MetadataDocument>> {
        let handle = self.open(storage_id, repository_id)?;
        self.metadata
            .get(&handle, &coordinate.group_id, &coordinate.artifact_id)
            .await
            .or_raise(|| ErrorKind::Metadata)
    }

    pub async fn regenerate_checksum(
        &self,
        storage_id: &str,
        repository_id: &str,
        base_path: Option<&Path>,
        force_regeneration: bool,
    ) -> Result<ChecksumSummary> {
        let handle = self.open(storage_id, repository_id)?;
        self.checksums.regenerate(&handle, base_path, force_regeneration).await.or_raise(|| ErrorKind::Checksum)
    }

    pub async fn validate_checksum(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &Path,
    ) -> Result<Vec<(DigestAlgorithm, ChecksumStatus)>> {
        let (_, path) = self.validator.validate(Some(storage_id), Some(repository_id), Some(path))?;
        let handle = self.open(storage_id, repository_id)?;
        self.checksums.validate(&handle, &path).await.or_raise(|| ErrorKind::Checksum)
    }

    /// Store `data` as `coordinate`, then refresh the artifact's metadata and
    /// write the file's sidecars. Nothing is written if a check fails.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn deploy(
        &self,
        storage_id: &str,
        repository_id: &str,
        coordinate: &Coordinate,
        data: &[u8],
    ) -> Result<PathBuf> {
        let handle = self.open(storage_id, repository_id)?;
        let path = handle.resolve_path(coordinate).or_raise(|| ErrorKind::InvalidArtifactPath(coordinate.to_string()))?;
        let (repository, path) = self.validator.validate(Some(storage_id), Some(repository_id), Some(&path))?;
        OperationValidator::check_allows_deployment(repository)?;

        let backend = handle.backend().as_ref();
        {
            // Concurrent first deployments of one artifact must not both pass the
            // redeployment check. Released before the rebuild takes the same key.
            let key = MetadataKey::new(storage_id, repository_id, &coordinate.group_id, &coordinate.artifact_id);
            let _guard = self.metadata.locks().lock(key).await;
            OperationValidator::check_allows_redeployment(&handle, coordinate).await?;
            backend.write(&path, data).await.or_raise(|| ErrorKind::Storage)?;
        }
        self.metadata
            .rebuild_artifact(&handle, &coordinate.group_id, &coordinate.artifact_id)
            .await
            .or_raise(|| ErrorKind::Metadata)?;
        self.checksums.write_sidecars(backend, &path, data).await.or_raise(|| ErrorKind::Checksum)?;
        info!(repository = %repository.key(), path = %path.display(), "artifact deployed");
        Ok(path)
    }

    /// Remove one artifact file with its sidecars, then refresh the
    /// artifact's metadata.
    #[instrument(skip(self))]
    pub async fn delete(&self, storage_id: &str, repository_id: &str, path: &Path) -> Result<Coordinate> {
        let (repository, path) = self.validator.validate(Some(storage_id), Some(repository_id), Some(path))?;
        OperationValidator::check_allows_deletion(repository)?;
        let handle = self.open(storage_id, repository_id)?;
        let Some(FileKind::Artifact(coordinate)) = handle.classify(&path) else {
            exn::bail!(ErrorKind::InvalidArtifactPath(path.display().to_string()));
        };

        let backend = handle.backend().as_ref();
        backend.delete(&path).await.or_raise(|| ErrorKind::Storage)?;
        self.checksums.remove_sidecars(backend, &path).await.or_raise(|| ErrorKind::Checksum)?;
        self.metadata
            .rebuild_artifact(&handle, &coordinate.group_id, &coordinate.artifact_id)
            .await
            .or_raise(|| ErrorKind::Metadata)?;
        info!(repository = %repository.key(), path = %path.display(), "artifact deleted");
        Ok(coordinate)
    }

    /// Remove every file of `coordinate`'s version and refresh the metadata.
    #[instrument(skip(self))]
    pub async fn delete_version(
        &self,
        storage_id: &str,
        repository_id: &str,
        coordinate: &Coordinate,
    ) -> Result<RebuildSummary> {
        let repository = self.validator.repository(Some(storage_id), Some(repository_id))?;
        OperationValidator::check_allows_deletion(repository)?;
        let handle = self.open(storage_id, repository_id)?;
        self.metadata.delete_version(&handle, coordinate).await.or_raise(|| ErrorKind::Metadata)
    }
}
