use crate::document::{MetadataDocument, is_last_updated, is_snapshot_timestamp};
use crate::error::{ErrorKind, Result};
use crate::lock::{LockTable, MetadataKey};
use depot_checksum::ChecksumEngine;
use depot_layout::{Coordinate, FileKind, Version};
use depot_provider::{RepositoryHandle, VersionDirectory};
use depot_storage::StorageBackend;
use exn::ResultExt;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

/// Counts from one [`MetadataEngine::rebuild`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub documents_written: u64,
    /// Documents deleted because their artifact has no versions left.
    pub documents_removed: u64,
    /// Version directories that could not be scanned and were left out.
    pub versions_skipped: u64,
}

impl RebuildSummary {
    fn absorb(&mut self, other: RebuildSummary) {
        self.documents_written += other.documents_written;
        self.documents_removed += other.documents_removed;
        self.versions_skipped += other.versions_skipped;
    }
}

/// Rebuilds and merges metadata documents.
///
/// Every read-modify-write of a document happens while holding that
/// document's entry in the [`LockTable`]; documents for different artifacts
/// never wait on each other. Documents are written through the backend's
/// atomic `write` and get fresh checksum sidecars right after.
#[derive(Debug, Clone)]
pub struct MetadataEngine {
    checksums: ChecksumEngine,
    locks: LockTable,
}

impl MetadataEngine {
    pub fn new(checksums: ChecksumEngine) -> Self {
        Self {
            checksums,
            locks: LockTable::new(),
        }
    }

    /// Share a lock table with other engines writing the same documents.
    pub fn with_locks(mut self, locks: LockTable) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Recompute the document of every artifact below `base_path` from the
    /// files on disk.
    ///
    /// `base_path` may be a GA directory, a version directory, a single
    /// artifact file, any directory above those, or absent for the whole
    /// repository. A file names its own GA root.
    ///
    /// A stored document that cannot be parsed is replaced. Version
    /// directories that cannot be scanned are skipped and counted. Failing
    /// to list a GA directory or to write a document fails the call.
    #[instrument(skip(self, handle), fields(repository = %handle.repository().key()))]
    pub async fn rebuild(&self, handle: &RepositoryHandle, base_path: Option<&Path>) -> Result<RebuildSummary> {
        let roots = self.discover_roots(handle, base_path).await;
        let mut summary = RebuildSummary::default();
        for (group_id, artifact_id) in &roots {
            summary.absorb(self.rebuild_artifact(handle, group_id, artifact_id).await?);
        }
        info!(
            artifacts = roots.len(),
            written = summary.documents_written,
            removed = summary.documents_removed,
            skipped = summary.versions_skipped,
            "metadata rebuild complete"
        );
        Ok(summary)
    }

    /// GA roots with at least one artifact or document below `base_path`.
    ///
    /// A `maven-metadata.json` only names a root when it sits in a directory
    /// holding no artifacts of its own and parses as the document of the
    /// artifact that directory stands for. Anything else is a foreign file.
    async fn discover_roots(&self, handle: &RepositoryHandle, base_path: Option<&Path>) -> BTreeSet<(String, String)> {
        let mut discovery = Discovery::default();
        let file = match base_path {
            Some(path) => handle.backend().stat(path).await.ok(),
            None => None,
        };
        match file {
            Some(file) => discovery.note(handle, &file.path),
            None => {
                let mut listing = handle.backend().list_stream(base_path);
                while let Some(item) = listing.next().await {
                    match item {
                        Ok(file) => discovery.note(handle, &file.path),
                        Err(e) => warn!(error = %e, "listing failed during metadata rebuild"),
                    }
                }
            },
        }

        let Discovery {
            mut roots,
            version_directories,
            documents,
        } = discovery;
        for path in documents {
            if path.parent().is_some_and(|dir| version_directories.contains(dir)) {
                debug!(path = %path.display(), "ignoring metadata file inside a version directory");
                continue;
            }
            if let Some(owner) = document_owner(handle, &path).await {
                roots.insert(owner);
            }
        }
        debug!(artifacts = roots.len(), "discovered metadata roots");
        roots
    }

    /// Rebuild one document under its lock.
    pub async fn rebuild_artifact(
        &self,
        handle: &RepositoryHandle,
        group_id: &str,
        artifact_id: &str,
    ) -> Result<RebuildSummary> {
        let _guard = self.locks.lock(key(handle, group_id, artifact_id)).await;
        let path = handle.metadata_path(group_id, artifact_id);
        let backend = handle.backend().as_ref();

        let previous = match read_document(backend, &path).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unusable metadata document");
                None
            },
        };
        let (document, skipped) = derive_from_tree(handle, group_id, artifact_id, previous.as_ref()).await?;
        let mut summary = RebuildSummary {
            versions_skipped: skipped,
            ..RebuildSummary::default()
        };

        if document.versions.is_empty() {
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "no readable versions; leaving metadata document as is");
            } else if previous.is_some() || backend.exists(&path).await.or_raise(|| ErrorKind::Read(path.clone()))? {
                backend.delete(&path).await.or_raise(|| ErrorKind::Delete(path.clone()))?;
                self.checksums.remove_sidecars(backend, &path).await.or_raise(|| ErrorKind::Delete(path.clone()))?;
                info!(path = %path.display(), "removed metadata document without versions");
                summary.documents_removed = 1;
            }
            return Ok(summary);
        }

        self.write_document(backend, &path, &document).await?;
        summary.documents_written = 1;
        Ok(summary)
    }

    /// Fold `fragment` into the stored document for `coordinate`'s artifact.
    ///
    /// If there is no usable stored document, one is derived from the files
    /// on disk first. Returns the document as written.
    #[instrument(skip(self, handle, fragment), fields(repository = %handle.repository().key(), %coordinate))]
    pub async fn merge(
        &self,
        handle: &RepositoryHandle,
        coordinate: &Coordinate,
        fragment: &MetadataDocument,
    ) -> Result<MetadataDocument> {
        check_fragment(coordinate, fragment)?;
        let (group_id, artifact_id) = (coordinate.group_id.as_str(), coordinate.artifact_id.as_str());
        let _guard = self.locks.lock(key(handle, group_id, artifact_id)).await;
        let path = handle.metadata_path(group_id, artifact_id);
        let backend = handle.backend().as_ref();

        let stored = match read_document(backend, &path).await {
            Ok(stored) => stored,
            Err(e) if matches!(&*e, ErrorKind::Corrupt(_)) => {
                warn!(path = %path.display(), error = %e, "rebuilding corrupt metadata document before merge");
                None
            },
            Err(e) => return Err(e),
        };
        let mut document = match stored {
            Some(document) => document,
            None => derive_from_tree(handle, group_id, artifact_id, None).await?.0,
        };
        document.merge(fragment, OffsetDateTime::now_utc());
        self.write_document(backend, &path, &document).await?;
        debug!(path = %path.display(), versions = document.versions.len(), "metadata merged");
        Ok(document)
    }

    /// The stored document, or `None` if there is none.
    pub async fn get(
        &self,
        handle: &RepositoryHandle,
        group_id: &str,
        artifact_id: &str,
    ) -> Result<Option<MetadataDocument>> {
        let path = handle.metadata_path(group_id, artifact_id);
        read_document(handle.backend().as_ref(), &path).await
    }

    /// Delete every file of `coordinate`'s version, then rebuild the
    /// artifact's document so no pointer names the removed version.
    #[instrument(skip(self, handle), fields(repository = %handle.repository().key(), %coordinate))]
    pub async fn delete_version(&self, handle: &RepositoryHandle, coordinate: &Coordinate) -> Result<RebuildSummary> {
        let version_path = handle.layout_provider().layout().version_path(coordinate);
        let backend = handle.backend().as_ref();
        let files = backend.list(Some(&version_path)).await.or_raise(|| ErrorKind::Scan(version_path.clone()))?;
        for file in &files {
            backend.delete(&file.path).await.or_raise(|| ErrorKind::Delete(file.path.clone()))?;
        }
        info!(path = %version_path.display(), files = files.len(), "version deleted");
        self.rebuild_artifact(handle, &coordinate.group_id, &coordinate.artifact_id).await
    }

    async fn write_document(&self, backend: &dyn StorageBackend, path: &Path, document: &MetadataDocument) -> Result<()> {
        let bytes = document.to_json().or_raise(|| ErrorKind::Write(path.to_path_buf()))?;
        backend.write(path, &bytes).await.or_raise(|| ErrorKind::Write(path.to_path_buf()))?;
        // The document is in place; a stale sidecar is repaired by the next regeneration.
        if let Err(e) = self.checksums.write_sidecars(backend, path, &bytes).await {
            warn!(path = %path.display(), error = %e, "could not write metadata checksums");
        }
        Ok(())
    }
}

fn key(handle: &RepositoryHandle, group_id: &str, artifact_id: &str) -> MetadataKey {
    let repository = handle.repository();
    MetadataKey::new(&repository.storage_id, &repository.id, group_id, artifact_id)
}

#[derive(Default)]
struct Discovery {
    roots: BTreeSet<(String, String)>,
    version_directories: BTreeSet<PathBuf>,
    documents: Vec<PathBuf>,
}

impl Discovery {
    fn note(&mut self, handle: &RepositoryHandle, path: &Path) {
        match handle.classify(path) {
            Some(FileKind::Artifact(coordinate)) => {
                self.version_directories.extend(path.parent().map(Path::to_path_buf));
                self.roots.insert((coordinate.group_id, coordinate.artifact_id));
            },
            Some(FileKind::Metadata) => self.documents.push(path.to_path_buf()),
            None => {},
        }
    }
}

/// Group and artifact a document path would belong to, judging by its
/// directory alone.
fn document_ga(path: &Path) -> Option<(String, String)> {
    let mut components: Vec<&str> = path.parent()?.iter().map(|c| c.to_str()).collect::<Option<_>>()?;
    let artifact_id = components.pop()?;
    (!components.is_empty()).then(|| (components.join("."), artifact_id.to_string()))
}

/// The GA a stored document belongs to, if it really is the document the
/// layout would put at `path`.
async fn document_owner(handle: &RepositoryHandle, path: &Path) -> Option<(String, String)> {
    let (group_id, artifact_id) = document_ga(path)?;
    if handle.metadata_path(&group_id, &artifact_id) != path {
        return None;
    }
    match read_document(handle.backend().as_ref(), path).await {
        Ok(Some(document)) if document.group_id == group_id && document.artifact_id == artifact_id => {
            Some((group_id, artifact_id))
        },
        Ok(_) | Err(_) => {
            debug!(path = %path.display(), "ignoring metadata file that is not a document of this repository");
            None
        },
    }
}

fn check_fragment(coordinate: &Coordinate, fragment: &MetadataDocument) -> Result<()> {
    if fragment.group_id != coordinate.group_id || fragment.artifact_id != coordinate.artifact_id {
        exn::bail!(ErrorKind::InvalidFragment(format!(
            "fragment describes {}:{}, not {}",
            fragment.group_id,
            fragment.artifact_id,
            coordinate.ga()
        )));
    }
    let named = fragment.versions.iter().chain(&fragment.latest).chain(&fragment.release);
    let keys = fragment.snapshots.keys();
    if let Some(bad) = named.chain(keys).find(|v| Version::parse(v.as_str()).is_err()) {
        exn::bail!(ErrorKind::InvalidFragment(format!("unusable version {bad:?}")));
    }
    if let Some(stamp) = fragment.last_updated.as_ref().filter(|stamp| !is_last_updated(stamp)) {
        exn::bail!(ErrorKind::InvalidFragment(format!("last_updated {stamp:?} is not yyyyMMddHHmmss")));
    }
    if let Some(block) = fragment.snapshots.values().find(|block| !is_snapshot_timestamp(&block.timestamp)) {
        exn::bail!(ErrorKind::InvalidFragment(format!(
            "snapshot timestamp {:?} is not yyyyMMdd.HHmmss",
            block.timestamp
        )));
    }
    Ok(())
}

/// `None` when there is no document at `path`.
async fn read_document(backend: &dyn StorageBackend, path: &Path) -> Result<Option<MetadataDocument>> {
    let bytes = match backend.read(path).await {
        Ok(bytes) => bytes,
        Err(e) if matches!(&*e, depot_storage::error::ErrorKind::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.raise(ErrorKind::Read(path.to_path_buf()))),
    };
    let document = MetadataDocument::from_json(&bytes).or_raise(|| ErrorKind::Corrupt(path.to_path_buf()))?;
    Ok(Some(document))
}

/// Derive a document from the version directories below the GA root,
/// returning it with the number of directories that could not be scanned.
async fn derive_from_tree(
    handle: &RepositoryHandle,
    group_id: &str,
    artifact_id: &str,
    previous: Option<&MetadataDocument>,
) -> Result<(MetadataDocument, u64)> {
    let ga_path: PathBuf = handle.ga_path(group_id, artifact_id);
    let listing = handle.list_version_directories(&ga_path).await.or_raise(|| ErrorKind::Scan(ga_path.clone()))?;
    let mut skipped = 0;
    let directories: Vec<VersionDirectory> = listing
        .into_iter()
        .filter_map(|entry| entry.inspect_err(|_| skipped += 1).ok())
        .collect();
    Ok((MetadataDocument::derive(group_id, artifact_id, &directories, previous), skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use depot_config::{ChecksumSettings, Repository};
    use depot_provider::{FixedStorageProvider, ProviderRegistry};
    use depot_storage::backend::{BoxSyncRead, FileInfoStream, MockBackend};
    use depot_storage::{BackendHandle, FileInfo};
    use std::sync::Arc;

    const GROUP: &str = "org.carlspring.strongbox";
    const METADATA: &str = "org/carlspring/strongbox/strongbox-metadata/maven-metadata.json";

    fn open_with(backend: BackendHandle, layout: &str) -> RepositoryHandle {
        let provider = FixedStorageProvider::new().with_backend("storage0", "snapshots", backend);
        let registry = ProviderRegistry::with_defaults().with_storage_provider("memory", provider);
        let repository =
            Repository::new("storage0", "snapshots", "/unused").with_implementation("memory").with_layout(layout);
        registry.open(&repository).unwrap()
    }

    fn open(backend: MockBackend) -> RepositoryHandle {
        open_with(Arc::new(backend), "maven2")
    }

    fn engine() -> MetadataEngine {
        MetadataEngine::new(ChecksumEngine::new(&ChecksumSettings::default()).unwrap())
    }

    fn snapshot_files() -> Vec<(String, Vec<u8>)> {
        ["2.0-20240101.000000-1", "2.0-20240101.000100-2", "2.0-20240101.000200-3"]
            .into_iter()
            .map(|version| {
                let path = format!("org/carlspring/strongbox/strongbox-metadata/2.0-SNAPSHOT/strongbox-metadata-{version}.jar");
                (path, version.as_bytes().to_vec())
            })
            .collect()
    }

    async fn stored(handle: &RepositoryHandle, path: &str) -> Vec<u8> {
        handle.backend().read(Path::new(path)).await.unwrap()
    }

    #[tokio::test]
    async fn test_rebuild_timestamped_snapshots() {
        let handle = open(MockBackend::with_files(snapshot_files()));
        let summary = engine().rebuild(&handle, None).await.unwrap();
        assert_eq!(summary.documents_written, 1);

        let doc = engine().get(&handle, GROUP, "strongbox-metadata").await.unwrap().unwrap();
        assert_eq!(doc.versions, vec!["2.0-SNAPSHOT"]);
        assert_eq!(doc.snapshots["2.0-SNAPSHOT"].build_number, 3);
        assert!(handle.backend().exists(Path::new(&format!("{METADATA}.sha256"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let mut files = snapshot_files();
        files.push(("org/acme/widget/1.0/widget-1.0.jar".into(), b"a".to_vec()));
        files.push(("org/acme/widget/1.1/widget-1.1.jar".into(), b"b".to_vec()));
        let handle = open(MockBackend::with_files(files));
        let engine = engine();

        let first = engine.rebuild(&handle, None).await.unwrap();
        assert_eq!(first.documents_written, 2);
        let before = stored(&handle, METADATA).await;
        let widget_before = stored(&handle, "org/acme/widget/maven-metadata.json").await;

        engine.rebuild(&handle, None).await.unwrap();
        assert_eq!(stored(&handle, METADATA).await, before);
        assert_eq!(stored(&handle, "org/acme/widget/maven-metadata.json").await, widget_before);
    }

    #[rstest::rstest]
    #[case::ga_root("org/acme/widget", 1)]
    #[case::version_directory("org/acme/widget/1.0", 1)]
    #[case::artifact_file("org/acme/widget/1.0/widget-1.0.jar", 1)]
    #[case::group_prefix("org/acme", 2)]
    #[case::sidecar("org/acme/widget/1.0/widget-1.0.jar.sha1", 0)]
    #[case::nothing_there("org/other", 0)]
    #[tokio::test]
    async fn test_rebuild_scoping(#[case] base_path: &str, #[case] expected: u64) {
        let handle = open(MockBackend::with_files([
            ("org/acme/widget/1.0/widget-1.0.jar", Vec::from(*b"a")),
            ("org/acme/widget/1.0/widget-1.0.jar.sha1", Vec::from(*b"0")),
            ("org/acme/gadget/3.1/gadget-3.1.pom", Vec::from(*b"b")),
        ]));
        let summary = engine().rebuild(&handle, Some(Path::new(base_path))).await.unwrap();
        assert_eq!(summary.documents_written, expected);
    }

    #[tokio::test]
    async fn test_rebuild_recovers_corrupt_document() {
        let mut files = snapshot_files();
        files.push((METADATA.to_string(), b"{ not json".to_vec()));
        let handle = open(MockBackend::with_files(files));
        let engine = engine();

        let err = engine.get(&handle, GROUP, "strongbox-metadata").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(_)));

        let summary = engine.rebuild(&handle, Some(Path::new("org/carlspring"))).await.unwrap();
        assert_eq!(summary.documents_written, 1);
        let doc = engine.get(&handle, GROUP, "strongbox-metadata").await.unwrap().unwrap();
        assert_eq!(doc.latest.as_deref(), Some("2.0-SNAPSHOT"));
    }

    #[tokio::test]
    async fn test_rebuild_write_failure_is_fatal() {
        let handle = open(MockBackend::with_files(snapshot_files()).with_unwritable(METADATA));
        let err = engine().rebuild(&handle, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Write(path) if path == Path::new(METADATA)));
        assert!(!handle.backend().exists(Path::new(METADATA)).await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_removes_document_without_versions() {
        let handle = open(MockBackend::with_files([("org/acme/widget/1.0/widget-1.0.jar", Vec::from(*b"a"))]));
        let engine = engine();
        engine.rebuild(&handle, None).await.unwrap();

        let coordinate: Coordinate = "org.acme:widget:1.0".parse().unwrap();
        let summary = engine.delete_version(&handle, &coordinate).await.unwrap();
        assert_eq!(summary.documents_removed, 1);
        assert!(engine.get(&handle, "org.acme", "widget").await.unwrap().is_none());
        assert!(!handle.backend().exists(Path::new("org/acme/widget/maven-metadata.json.sha256")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_version_moves_pointers() {
        let handle = open(MockBackend::with_files([
            ("org/acme/widget/1.0/widget-1.0.jar", Vec::from(*b"a")),
            ("org/acme/widget/1.1/widget-1.1.jar", Vec::from(*b"b")),
            ("org/acme/widget/1.1/widget-1.1.pom", Vec::from(*b"c")),
        ]));
        let engine = engine();
        engine.rebuild(&handle, None).await.unwrap();

        let coordinate: Coordinate = "org.acme:widget:1.1".parse().unwrap();
        engine.delete_version(&handle, &coordinate).await.unwrap();
        let doc = engine.get(&handle, "org.acme", "widget").await.unwrap().unwrap();
        assert_eq!(doc.versions, vec!["1.0"]);
        assert_eq!(doc.release.as_deref(), Some("1.0"));
        assert_eq!(doc.latest.as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn test_rebuild_respects_layout_policy() {
        let backend: BackendHandle = Arc::new(MockBackend::with_files([
            ("org/acme/widget/1.0/widget-1.0.jar", Vec::from(*b"a")),
            ("org/acme/widget/2.0-SNAPSHOT/widget-2.0-SNAPSHOT.jar", Vec::from(*b"b")),
        ]));
        let handle = open_with(backend, "maven2-release");
        engine().rebuild(&handle, None).await.unwrap();
        let doc = engine().get(&handle, "org.acme", "widget").await.unwrap().unwrap();
        assert_eq!(doc.versions, vec!["1.0"]);
        assert!(doc.snapshots.is_empty());
    }

    /// Delegates to a [`MockBackend`] but fails every listing below one prefix.
    struct BrokenDirectory {
        inner: MockBackend,
        broken: PathBuf,
    }

    #[async_trait]
    impl StorageBackend for BrokenDirectory {
        fn name(&self) -> &str {
            "broken"
        }

        fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
            if prefix.is_some_and(|p| p.starts_with(&self.broken)) {
                let err = exn::Exn::from(depot_storage::error::ErrorKind::PermissionDenied(self.broken.clone()));
                return Box::pin(futures::stream::once(async move { Err(err) }));
            }
            self.inner.list_stream(prefix)
        }

        async fn list_directories(&self, parent: Option<&Path>) -> depot_storage::error::Result<Vec<PathBuf>> {
            self.inner.list_directories(parent).await
        }

        async fn exists(&self, path: &Path) -> depot_storage::error::Result<bool> {
            self.inner.exists(path).await
        }

        async fn read(&self, path: &Path) -> depot_storage::error::Result<Vec<u8>> {
            self.inner.read(path).await
        }

        async fn reader(&self, path: &Path) -> depot_storage::error::Result<BoxSyncRead> {
            self.inner.reader(path).await
        }

        async fn write(&self, path: &Path, data: &[u8]) -> depot_storage::error::Result<()> {
            self.inner.write(path, data).await
        }

        async fn delete(&self, path: &Path) -> depot_storage::error::Result<()> {
            self.inner.delete(path).await
        }

        async fn stat(&self, path: &Path) -> depot_storage::error::Result<FileInfo> {
            self.inner.stat(path).await
        }
    }

    #[tokio::test]
    async fn test_unreadable_version_directory_is_skipped() {
        let backend: BackendHandle = Arc::new(BrokenDirectory {
            inner: MockBackend::with_files([
                ("org/acme/widget/1.0/widget-1.0.jar", Vec::from(*b"a")),
                ("org/acme/widget/1.1/widget-1.1.jar", Vec::from(*b"b")),
            ]),
            broken: PathBuf::from("org/acme/widget/1.1"),
        });
        let handle = open_with(backend, "maven2");
        let engine = engine();
        let summary = engine.rebuild_artifact(&handle, "org.acme", "widget").await.unwrap();
        assert_eq!((summary.documents_written, summary.versions_skipped), (1, 1));
        let doc = engine.get(&handle, "org.acme", "widget").await.unwrap().unwrap();
        assert_eq!(doc.versions, vec!["1.0"]);
    }

    #[tokio::test]
    async fn test_merge_into_stored_document() {
        let handle = open(MockBackend::default());
        let engine = engine();
        let coordinate: Coordinate = format!("{GROUP}:strongbox-metadata-merge:1.3-SNAPSHOT").parse().unwrap();
        let existing = MetadataDocument::new(GROUP, "strongbox-metadata-merge")
            .with_versions(["2.0-20240101.000000-1"])
            .with_latest("2.0-20240101.000000-1")
            .with_last_updated("20240101000000");
        let path = handle.metadata_path(GROUP, "strongbox-metadata-merge");
        handle.backend().write(&path, &existing.to_json().unwrap()).await.unwrap();

        let fragment = MetadataDocument::new(GROUP, "strongbox-metadata-merge")
            .with_versions(["1.0-SNAPSHOT", "1.3-SNAPSHOT"])
            .with_latest("1.3-SNAPSHOT");
        let merged = engine.merge(&handle, &coordinate, &fragment).await.unwrap();
        assert_eq!(merged.versions.len(), 3);
        assert_eq!(merged.latest.as_deref(), Some("1.3-SNAPSHOT"));
        assert_eq!(engine.get(&handle, GROUP, "strongbox-metadata-merge").await.unwrap(), Some(merged));
    }

    #[tokio::test]
    async fn test_merge_without_document_rebuilds_first() {
        let handle = open(MockBackend::with_files(snapshot_files()));
        let coordinate: Coordinate = format!("{GROUP}:strongbox-metadata:1.0").parse().unwrap();
        let fragment = MetadataDocument::new(GROUP, "strongbox-metadata").with_versions(["1.0"]).with_release("1.0");
        let merged = engine().merge(&handle, &coordinate, &fragment).await.unwrap();
        assert_eq!(merged.versions, vec!["1.0", "2.0-SNAPSHOT"]);
        assert_eq!(merged.release.as_deref(), Some("1.0"));
        assert_eq!(merged.snapshots["2.0-SNAPSHOT"].build_number, 3);
    }

    #[rstest::rstest]
    #[case::other_artifact(MetadataDocument::new("org.acme", "gadget"))]
    #[case::bad_version(MetadataDocument { versions: vec!["1.0/../x".into()], ..MetadataDocument::new("org.acme", "widget") })]
    #[case::short_last_updated(MetadataDocument::new("org.acme", "widget").with_versions(["1.5"]).with_last_updated("9"))]
    #[case::impossible_last_updated(MetadataDocument::new("org.acme", "widget").with_last_updated("20241332000000"))]
    #[case::dotted_last_updated(MetadataDocument::new("org.acme", "widget").with_last_updated("20240101.000000"))]
    #[case::bad_snapshot_timestamp(MetadataDocument::new("org.acme", "widget").with_snapshot("1.0-SNAPSHOT", "2024", 1))]
    #[case::undotted_snapshot_timestamp(
        MetadataDocument::new("org.acme", "widget").with_snapshot("1.0-SNAPSHOT", "20240101000000", 1)
    )]
    #[tokio::test]
    async fn test_merge_rejects_bad_fragments(#[case] fragment: MetadataDocument) {
        let handle = open(MockBackend::default());
        let coordinate: Coordinate = "org.acme:widget:1.0".parse().unwrap();
        let err = engine().merge(&handle, &coordinate, &fragment).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidFragment(_)));
        assert!(!handle.backend().exists(Path::new("org/acme/widget/maven-metadata.json")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_stamp_does_not_block_later_merges() {
        let handle = open(MockBackend::default());
        let engine = engine();
        let coordinate: Coordinate = "org.acme:widget:1.0".parse().unwrap();
        let first = MetadataDocument::new("org.acme", "widget")
            .with_versions(["1.0"])
            .with_release("1.0")
            .with_last_updated("20240101000000");
        engine.merge(&handle, &coordinate, &first).await.unwrap();

        let garbled = MetadataDocument::new("org.acme", "widget").with_latest("1.5").with_last_updated("9");
        assert!(engine.merge(&handle, &coordinate, &garbled).await.is_err());

        let newer = MetadataDocument::new("org.acme", "widget")
            .with_versions(["2.0"])
            .with_latest("2.0")
            .with_release("2.0")
            .with_last_updated("20250101000000");
        let merged = engine.merge(&handle, &coordinate, &newer).await.unwrap();
        assert_eq!(merged.latest.as_deref(), Some("2.0"));
        assert_eq!(merged.release.as_deref(), Some("2.0"));
        assert_eq!(merged.last_updated.as_deref(), Some("20250101000000"));
        assert_eq!(merged.versions, vec!["1.0", "2.0"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_merges_lose_nothing() {
        let handle = open(MockBackend::default());
        let engine = engine();
        let coordinate: Coordinate = "org.acme:widget:1.0".parse().unwrap();

        let merges = (0..32).map(|i| {
            let (engine, handle, coordinate) = (engine.clone(), handle.clone(), coordinate.clone());
            tokio::spawn(async move {
                let fragment = MetadataDocument::new("org.acme", "widget").with_versions([format!("1.{i}")]);
                engine.merge(&handle, &coordinate, &fragment).await.unwrap();
            })
        });
        for merge in futures::future::join_all(merges).await {
            merge.unwrap();
        }
        let doc = engine.get(&handle, "org.acme", "widget").await.unwrap().unwrap();
        assert_eq!(doc.versions.len(), 32);
        assert!(engine.locks().is_empty());
    }

    #[test]
    fn test_document_ga() {
        let path = Path::new("org/acme/widget/maven-metadata.json");
        assert_eq!(document_ga(path), Some(("org.acme".to_string(), "widget".to_string())));
        assert_eq!(document_ga(Path::new("maven-metadata.json")), None);
    }

    #[rstest::rstest]
    #[case::whole_repository(None)]
    #[case::the_file_itself(Some("org/acme/widget/1.0/maven-metadata.json"))]
    #[tokio::test]
    async fn test_rebuild_keeps_foreign_metadata_files(#[case] base_path: Option<&str>) {
        let foreign = "org/acme/widget/1.0/maven-metadata.json";
        let handle = open(MockBackend::with_files([
            ("org/acme/widget/1.0/widget-1.0.jar", Vec::from(*b"a")),
            (foreign, Vec::from(*b"{\"something\": \"else\"}")),
        ]));
        let summary = engine().rebuild(&handle, base_path.map(Path::new)).await.unwrap();
        assert_eq!(summary.documents_removed, 0);
        assert_eq!(stored(&handle, foreign).await, b"{\"something\": \"else\"}");
    }

    #[tokio::test]
    async fn test_rebuild_keeps_foreign_document_without_artifacts() {
        // Parses as a document, but of another artifact than its directory names.
        let foreign = "org/acme/widget/1.0/maven-metadata.json";
        let contents = MetadataDocument::new("org.acme", "widget").with_versions(["1.0"]).to_json().unwrap();
        let handle = open(MockBackend::with_files([(foreign, contents.clone())]));
        let summary = engine().rebuild(&handle, None).await.unwrap();
        assert_eq!(summary, RebuildSummary::default());
        assert_eq!(stored(&handle, foreign).await, contents);
    }

    #[tokio::test]
    async fn test_rebuild_removes_orphaned_document() {
        let path = "org/acme/widget/maven-metadata.json";
        let contents = MetadataDocument::new("org.acme", "widget").with_versions(["1.0"]).to_json().unwrap();
        let handle = open(MockBackend::with_files([(path, contents)]));
        let summary = engine().rebuild(&handle, None).await.unwrap();
        assert_eq!(summary.documents_removed, 1);
        assert!(!handle.backend().exists(Path::new(path)).await.unwrap());
    }
}
