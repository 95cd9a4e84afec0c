//! In-memory storage backend for testing.

use super::{BoxSyncRead, FileInfoStream};
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Directories are
/// implied by the stored paths, as they are on object stores.
///
/// Individual paths can be marked unreadable or unwritable to exercise the
/// fail-soft paths of bulk traversals.
///
/// # Examples
///
/// ```
/// use depot_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("org/acme/widget/1.0/widget-1.0.jar", b"PK..."),
/// ]);
/// assert!(backend.exists(Path::new("org/acme/widget/1.0/widget-1.0.jar")).await?);
///
/// backend.write(Path::new("org/acme/widget/1.0/widget-1.0.pom"), b"<project/>").await?;
/// assert!(backend.exists(Path::new("org/acme/widget/1.0/widget-1.0.pom")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    unreadable: HashSet<PathBuf>,
    unwritable: HashSet<PathBuf>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let validated = Self::validated_or_panic(path.into());
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            unreadable: HashSet::new(),
            unwritable: HashSet::new(),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make reads of `path` fail with [`ErrorKind::PermissionDenied`]. The
    /// file still shows up in listings.
    pub fn with_unreadable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unreadable.insert(Self::validated_or_panic(path.into()));
        self
    }

    /// Make writes to `path` fail with [`ErrorKind::PermissionDenied`].
    pub fn with_unwritable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unwritable.insert(Self::validated_or_panic(path.into()));
        self
    }

    fn validated_or_panic(path: PathBuf) -> PathBuf {
        let Ok(validated) = validate_path(&path) else {
            // The panic here is DELIBERATE. MockBackend is intended to be
            // used in tests; panics are expected. There is no error result.
            panic!("MockBackend: invalid path {}", path.display());
        };
        validated
    }

    fn check_readable(&self, path: &Path) -> Result<()> {
        if self.unreadable.contains(path) {
            exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let mut entries: Vec<(PathBuf, OffsetDateTime, u64)> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| (path.clone(), *modified, data.len() as u64))
                    .collect()
            };
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (path, modified, size) in entries {
                yield Ok(FileInfo::new(path, size, modified));
            }
        })
    }

    async fn list_directories(&self, parent: Option<&Path>) -> Result<Vec<PathBuf>> {
        let parent = parent.map(validate_path).transpose()?.unwrap_or_default();
        let guard = self.storage.read().await;
        let directories: BTreeSet<PathBuf> = guard
            .keys()
            .filter_map(|path| {
                let rest = path.strip_prefix(&parent).ok()?;
                let mut components = rest.components();
                let child = components.next()?;
                // Only a directory if something lives beneath it.
                components.next()?;
                Some(parent.join(child))
            })
            .collect();
        Ok(directories.into_iter().collect())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        Ok(guard.contains_key(&path) || guard.keys().any(|key| key.starts_with(&path)))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.check_readable(&path)?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let data = self.read(path).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        if self.unwritable.contains(&path) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}
