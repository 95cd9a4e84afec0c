use crate::error::{ErrorKind, Policy, Result};
use depot_config::{Configuration, Repository};
use depot_layout::Coordinate;
use depot_provider::RepositoryHandle;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Checks a mutating request before anything reaches storage.
///
/// Every check is independent and has no side effects; callers compose the
/// ones their operation needs.
#[derive(Debug, Clone)]
pub struct OperationValidator {
    configuration: Arc<Configuration>,
}

impl OperationValidator {
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self { configuration }
    }

    /// The configured repository, or [`NoSuchStorage`](ErrorKind::NoSuchStorage)
    /// / [`NoSuchRepository`](ErrorKind::NoSuchRepository).
    pub fn repository(&self, storage_id: Option<&str>, repository_id: Option<&str>) -> Result<&Repository> {
        let storage_id = storage_id.unwrap_or_default();
        let storage = self
            .configuration
            .storage(storage_id)
            .ok_or_raise(|| ErrorKind::NoSuchStorage(storage_id.to_string()))?;
        let repository_id = repository_id.unwrap_or_default();
        storage
            .repository(repository_id)
            .ok_or_raise(|| ErrorKind::NoSuchRepository(format!("{storage_id}/{repository_id}")))
    }

    /// Storage, then repository, then artifact path. Returns the repository
    /// and the normalized path.
    pub fn validate(
        &self,
        storage_id: Option<&str>,
        repository_id: Option<&str>,
        artifact_path: Option<&Path>,
    ) -> Result<(&Repository, PathBuf)> {
        let repository = self.repository(storage_id, repository_id)?;
        let path = artifact_path.ok_or_raise(|| ErrorKind::InvalidArtifactPath(String::new()))?;
        let path = depot_storage::validate_path(path)
            .or_raise(|| ErrorKind::InvalidArtifactPath(path.display().to_string()))?;
        Ok((repository, path))
    }

    pub fn check_allows_deployment(repository: &Repository) -> Result<()> {
        if !repository.policy.allows_deployment {
            debug!(repository = %repository.key(), "deployment refused");
            exn::bail!(ErrorKind::PolicyViolation(Policy::Deployment));
        }
        Ok(())
    }

    /// Only refuses when the artifact is already stored; a new artifact may
    /// always be deployed whatever the redeployment flag says.
    pub async fn check_allows_redeployment(handle: &RepositoryHandle, coordinate: &Coordinate) -> Result<()> {
        if handle.repository().policy.allows_redeployment {
            return Ok(());
        }
        if handle.exists(coordinate).await.or_raise(|| ErrorKind::Provider)? {
            debug!(repository = %handle.repository().key(), %coordinate, "redeployment refused");
            exn::bail!(ErrorKind::PolicyViolation(Policy::Redeployment));
        }
        Ok(())
    }

    pub fn check_allows_deletion(repository: &Repository) -> Result<()> {
        if !repository.policy.allows_deletion {
            debug!(repository = %repository.key(), "deletion refused");
            exn::bail!(ErrorKind::PolicyViolation(Policy::Deletion));
        }
        Ok(())
    }
}
