//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for the file operations a repository needs (local filesystem,
//! in-memory for tests).
//!

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous so that traversal of large
/// repositories can overlap file I/O. It's a glorified CRUD interface, with
/// one promise on top: [`write()`](Self::write) is atomic.
///
/// # Path Handling
/// All paths are relative to the repository root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use depot_storage::{backend::StorageBackend, error::Result};
///
/// async fn size_of_pom(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("org/acme/widget/1.0/widget-1.0.pom");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning. The first error aborts the listing.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Returns metadata for all files beneath the prefix as a [`Stream`],
    /// yielding results incrementally. The prefix is matched per path
    /// component, so `org/acme` matches `org/acme/widget/1.0/widget-1.0.jar`
    /// but not `org/acme-tools/...`.
    ///
    /// Errors for a single directory or entry are yielded as `Err` items
    /// without ending the stream, which lets bulk traversals record the
    /// failure and carry on.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// use std::path::Path;
    /// # use depot_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("org/acme")));
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(info) => println!("{}: {} bytes", info.path.display(), info.size),
    ///         Err(e) => eprintln!("skipping unreadable entry: {e}"),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// List the immediate child directories of `parent` (or of the root).
    ///
    /// Returns an empty list when `parent` does not exist. Returned paths are
    /// relative to the repository root, sorted.
    async fn list_directories(&self, parent: Option<&Path>) -> Result<Vec<PathBuf>>;

    /// Check if a file (or directory) exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`](std::io::Read) suitable for use
    /// inside [`spawn_blocking`](tokio::task::spawn_blocking). The async
    /// setup (opening the file) happens before returning.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use depot_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut reader = backend.reader(Path::new("org/acme/widget/1.0/widget-1.0.jar")).await?;
    /// let size = tokio::task::spawn_blocking(move || {
    ///     std::io::copy(&mut reader, &mut std::io::sink())
    /// }).await.unwrap().unwrap();
    /// # Ok(())
    /// # }
    /// ```
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Atomically write file contents.
    ///
    /// Creates a new file or replaces an existing one. Readers observe either
    /// the previous contents or the new contents, never a partial write.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the path
    /// does not exist or is not a regular file.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
