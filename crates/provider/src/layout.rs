//! Layout (repository) providers: how coordinates map onto a repository's
//! files, and which versions a repository holds.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use depot_layout::{Coordinate, FileKind, Layout, Version};
use depot_storage::{FileInfo, StorageBackend};
use exn::ResultExt;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version directories scanned at the same time for one GA.
const SCAN_CONCURRENCY: usize = 8;

/// An artifact file together with the coordinate it stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub coordinate: Coordinate,
    pub file: FileInfo,
}

/// One version directory below a GA path and the artifacts found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDirectory {
    pub path: PathBuf,
    /// The directory's version: a release or a nominal `-SNAPSHOT`.
    pub version: Version,
    /// Never empty. Timestamped snapshot artifacts carry their own version.
    pub artifacts: Vec<Artifact>,
}

/// Which versions a repository accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    #[default]
    Mixed,
    Release,
    Snapshot,
}

impl VersionPolicy {
    pub fn accepts(&self, version: &Version) -> bool {
        match self {
            Self::Mixed => true,
            Self::Release => !version.is_snapshot(),
            Self::Snapshot => version.is_snapshot(),
        }
    }
}

/// Capabilities a repository layout must offer. Selected by the
/// repository's `layout` tag.
#[async_trait]
pub trait LayoutProvider: Send + Sync {
    fn layout(&self) -> Layout;

    /// Whether the repository holds versions like `version`. Files and
    /// directories of other versions are invisible to the provider.
    fn accepts(&self, _version: &Version) -> bool {
        true
    }

    /// Repository-relative path of `coordinate`.
    fn resolve_path(&self, coordinate: &Coordinate) -> Result<PathBuf> {
        if !self.accepts(&coordinate.version) {
            exn::bail!(ErrorKind::VersionRejected(coordinate.version.to_string()));
        }
        Ok(self.layout().to_path(coordinate))
    }

    fn to_coordinate(&self, path: &Path) -> Option<Coordinate> {
        self.layout().to_coordinate(path).filter(|coordinate| self.accepts(&coordinate.version))
    }

    fn classify(&self, path: &Path) -> Option<FileKind> {
        match self.layout().classify(path)? {
            FileKind::Artifact(coordinate) if !self.accepts(&coordinate.version) => None,
            kind => Some(kind),
        }
    }

    async fn exists(&self, backend: &dyn StorageBackend, coordinate: &Coordinate) -> Result<bool> {
        let path = self.resolve_path(coordinate)?;
        backend.exists(&path).await.or_raise(|| ErrorKind::Storage)
    }

    /// Scan the version directories directly below `ga_path`.
    ///
    /// The outer result fails only when `ga_path` itself cannot be listed.
    /// A directory that cannot be read yields an inner
    /// [`Scan`](ErrorKind::Scan) error and does not stop the others. Names
    /// that are not versions this provider accepts, and directories without
    /// any artifact, are left out.
    async fn list_version_directories(
        &self,
        backend: &dyn StorageBackend,
        ga_path: &Path,
    ) -> Result<Vec<Result<VersionDirectory>>> {
        let directories = backend.list_directories(Some(ga_path)).await.or_raise(|| ErrorKind::Storage)?;
        let candidates: Vec<(PathBuf, Version)> = directories
            .into_iter()
            .filter_map(|path| {
                let version = path.file_name()?.to_str()?.parse::<Version>().ok()?;
                // Timestamps never name a directory
                let nominal = version.base_version() == version;
                (nominal && self.accepts(&version)).then_some((path, version))
            })
            .collect();

        let scanned: Vec<Result<Option<VersionDirectory>>> = stream::iter(candidates)
            .map(|(path, version)| scan_version_directory(self, backend, path, version))
            .buffered(SCAN_CONCURRENCY)
            .collect()
            .await;
        Ok(scanned.into_iter().filter_map(Result::transpose).collect())
    }

    /// Every accepted artifact below `prefix` (or the whole repository).
    /// Listing errors are passed through for the caller to record.
    fn find_coordinates<'a>(
        &'a self,
        backend: &'a dyn StorageBackend,
        prefix: Option<&'a Path>,
    ) -> BoxStream<'a, Result<Artifact>> {
        backend
            .list_stream(prefix)
            .filter_map(move |item| async move {
                match item {
                    Ok(file) => self.to_coordinate(&file.path).map(|coordinate| Ok(Artifact { coordinate, file })),
                    Err(e) => Some(Err(e.raise(ErrorKind::Storage))),
                }
            })
            .boxed()
    }
}

async fn scan_version_directory<P: LayoutProvider + ?Sized>(
    provider: &P,
    backend: &dyn StorageBackend,
    path: PathBuf,
    version: Version,
) -> Result<Option<VersionDirectory>> {
    let files = match backend.list(Some(&path)).await {
        Ok(files) => files,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not scan version directory");
            return Err(e.raise(ErrorKind::Scan(path)));
        },
    };
    let mut artifacts: Vec<Artifact> = files
        .into_iter()
        .filter(|file| file.path.parent() == Some(path.as_path()))
        .filter_map(|file| {
            let coordinate = provider.to_coordinate(&file.path)?;
            (coordinate.version.base_version() == version).then_some(Artifact { coordinate, file })
        })
        .collect();
    if artifacts.is_empty() {
        debug!(path = %path.display(), "no artifacts in version directory");
        return Ok(None);
    }
    artifacts.sort_by(|a, b| a.file.path.cmp(&b.file.path));
    Ok(Some(VersionDirectory { path, version, artifacts }))
}

/// The Maven 2 layout, optionally restricted to releases or snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maven2Provider {
    policy: VersionPolicy,
}

impl Maven2Provider {
    pub fn new(policy: VersionPolicy) -> Self {
        Self { policy }
    }
}

impl LayoutProvider for Maven2Provider {
    fn layout(&self) -> Layout {
        Layout::Maven2
    }

    fn accepts(&self, version: &Version) -> bool {
        self.policy.accepts(version)
    }
}
