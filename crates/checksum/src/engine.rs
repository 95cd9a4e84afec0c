use crate::algorithm::{DigestAlgorithm, Digests, compute_digests, digest_bytes};
use crate::error::{ErrorKind, Result};
use crate::summary::{ChecksumFailure, ChecksumSummary};
use depot_config::ChecksumSettings;
use depot_provider::RepositoryHandle;
use depot_storage::StorageBackend;
use exn::ResultExt;
use futures::stream::{self, BoxStream, FuturesUnordered};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// State of one sidecar compared with its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumStatus {
    Match,
    Mismatch { expected: String, actual: String },
    Missing,
}

/// Computes, writes and checks checksum sidecars.
#[derive(Debug, Clone)]
pub struct ChecksumEngine {
    algorithms: Vec<DigestAlgorithm>,
    concurrency: usize,
}

impl ChecksumEngine {
    /// Fails with [`AlgorithmUnavailable`](ErrorKind::AlgorithmUnavailable)
    /// if any configured algorithm is unknown.
    pub fn new(settings: &ChecksumSettings) -> Result<Self> {
        let algorithms = DigestAlgorithm::resolve_all(&settings.algorithms)?;
        if algorithms.is_empty() {
            exn::bail!(ErrorKind::AlgorithmUnavailable(String::new()));
        }
        Ok(Self {
            algorithms,
            concurrency: settings.concurrency.max(1),
        })
    }

    pub fn algorithms(&self) -> &[DigestAlgorithm] {
        &self.algorithms
    }

    /// Bring the sidecars below `base_path` (or of the whole repository) up
    /// to date.
    ///
    /// `base_path` may name a single file or a directory. Every artifact and
    /// metadata document found is visited; checksum sidecars and foreign
    /// files are not. Without `force`, only missing sidecars are written and
    /// existing ones are left alone even if stale. With `force`, every
    /// sidecar is recomputed and overwritten.
    ///
    /// A file that cannot be read or whose sidecar cannot be written is
    /// recorded in the summary and the walk carries on.
    #[instrument(skip(self, handle), fields(repository = %handle.repository().key()))]
    pub async fn regenerate(
        &self,
        handle: &RepositoryHandle,
        base_path: Option<&Path>,
        force: bool,
    ) -> Result<ChecksumSummary> {
        let mut summary = ChecksumSummary::default();
        let mut targets = self.targets(handle, base_path).await;
        let mut processing = FuturesUnordered::new();
        let mut discovering = true;
        loop {
            // Keep at most `concurrency` files in flight, topping up as they finish.
            while discovering && processing.len() < self.concurrency {
                match targets.next().await {
                    Some(Ok(path)) => processing.push(self.regenerate_file(handle.backend().as_ref(), path, force)),
                    Some(Err(failure)) => summary.record_failure(failure),
                    None => discovering = false,
                }
            }
            match processing.next().await {
                Some(Ok((_path, written))) => summary.record_success(written > 0),
                Some(Err(failure)) => summary.record_failure(failure),
                None => break,
            }
        }
        info!(
            processed = summary.files_processed,
            failed = summary.files_failed,
            rewritten = summary.files_rewritten,
            "checksum regeneration complete"
        );
        Ok(summary)
    }

    /// Paths to checksum below `base_path`; listing failures come through as
    /// failures to record.
    async fn targets<'a>(
        &self,
        handle: &'a RepositoryHandle,
        base_path: Option<&'a Path>,
    ) -> BoxStream<'a, std::result::Result<PathBuf, ChecksumFailure>> {
        if let Some(path) = base_path
            && let Ok(file) = handle.backend().stat(path).await
        {
            let target = handle.classify(&file.path).map(|_| Ok(file.path));
            if target.is_none() {
                debug!(path = %path.display(), "base path is not an artifact or metadata document");
            }
            return stream::iter(target).boxed();
        }
        handle
            .backend()
            .list_stream(base_path)
            .filter_map(move |item| async move {
                match item {
                    Ok(file) => handle.classify(&file.path).map(|_| Ok(file.path)),
                    Err(e) => {
                        let path = base_path.map(Path::to_path_buf).unwrap_or_default();
                        warn!(path = %path.display(), error = %e, "listing failed during checksum walk");
                        Some(Err(ChecksumFailure::new(path, &e)))
                    },
                }
            })
            .boxed()
    }

    /// Returns how many sidecars were written.
    async fn regenerate_file(
        &self,
        backend: &dyn StorageBackend,
        path: PathBuf,
        force: bool,
    ) -> std::result::Result<(PathBuf, usize), ChecksumFailure> {
        match self.regenerate_file_inner(backend, &path, force).await {
            Ok(written) => Ok((path, written)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "checksum regeneration failed for file");
                Err(ChecksumFailure::new(path, &e))
            },
        }
    }

    async fn regenerate_file_inner(&self, backend: &dyn StorageBackend, path: &Path, force: bool) -> Result<usize> {
        let mut pending = Vec::with_capacity(self.algorithms.len());
        for algorithm in &self.algorithms {
            let sidecar = algorithm.sidecar_path(path);
            let exists = backend.exists(&sidecar).await.or_raise(|| ErrorKind::Read(sidecar.clone()))?;
            if force || !exists {
                pending.push(*algorithm);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }
        let digests = digest_file(backend, path, pending).await?;
        for (algorithm, digest) in &digests {
            let sidecar = algorithm.sidecar_path(path);
            backend.write(&sidecar, digest.as_bytes()).await.or_raise(|| ErrorKind::Write(sidecar.clone()))?;
        }
        debug!(path = %path.display(), written = digests.len(), "sidecars written");
        Ok(digests.len())
    }

    /// Write a sidecar for every configured algorithm for contents the
    /// caller already holds in memory (freshly deployed files, metadata
    /// documents).
    pub async fn write_sidecars(&self, backend: &dyn StorageBackend, path: &Path, data: &[u8]) -> Result<()> {
        for (algorithm, digest) in digest_bytes(data, &self.algorithms) {
            let sidecar = algorithm.sidecar_path(path);
            backend.write(&sidecar, digest.as_bytes()).await.or_raise(|| ErrorKind::Write(sidecar.clone()))?;
        }
        Ok(())
    }

    /// Remove every sidecar `path` may have, for any known algorithm.
    /// Returns how many were removed.
    pub async fn remove_sidecars(&self, backend: &dyn StorageBackend, path: &Path) -> Result<usize> {
        let mut removed = 0;
        for algorithm in DigestAlgorithm::ALL {
            let sidecar = algorithm.sidecar_path(path);
            if backend.exists(&sidecar).await.or_raise(|| ErrorKind::Read(sidecar.clone()))? {
                backend.delete(&sidecar).await.or_raise(|| ErrorKind::Write(sidecar.clone()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Recompute the digests of `path` and compare them with its sidecars.
    #[instrument(skip(self, handle), fields(repository = %handle.repository().key()))]
    pub async fn validate(
        &self,
        handle: &RepositoryHandle,
        path: &Path,
    ) -> Result<Vec<(DigestAlgorithm, ChecksumStatus)>> {
        let backend = handle.backend().as_ref();
        let digests = digest_file(backend, path, self.algorithms.clone()).await?;
        let mut report = Vec::with_capacity(digests.len());
        for (algorithm, actual) in digests {
            let sidecar = algorithm.sidecar_path(path);
            let status = match backend.read(&sidecar).await {
                Ok(stored) => {
                    // Accept `sha256sum`-style "<digest>  <file name>" contents too.
                    let stored = String::from_utf8_lossy(&stored);
                    let expected = stored.split_whitespace().next().unwrap_or_default().to_ascii_lowercase();
                    match expected == actual {
                        true => ChecksumStatus::Match,
                        false => ChecksumStatus::Mismatch { expected, actual },
                    }
                },
                Err(e) if matches!(&*e, depot_storage::error::ErrorKind::NotFound(_)) => ChecksumStatus::Missing,
                Err(e) => return Err(e.raise(ErrorKind::Read(sidecar))),
            };
            report.push((algorithm, status));
        }
        Ok(report)
    }
}

/// Stream `path` through every algorithm on the blocking pool.
async fn digest_file(backend: &dyn StorageBackend, path: &Path, algorithms: Vec<DigestAlgorithm>) -> Result<Digests> {
    let reader = backend.reader(path).await.or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
    tokio::task::spawn_blocking(move || compute_digests(reader, &algorithms))
        .await
        .or_raise(|| ErrorKind::Digest(path.to_path_buf()))?
        .or_raise(|| ErrorKind::Read(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_config::Repository;
    use depot_provider::{FixedStorageProvider, ProviderRegistry};
    use depot_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;

    const JAR: &str = "org/acme/widget/1.0/widget-1.0.jar";

    fn open(backend: MockBackend) -> RepositoryHandle {
        let provider = FixedStorageProvider::new().with_backend("storage0", "releases", Arc::new(backend));
        let registry = ProviderRegistry::with_defaults().with_storage_provider("memory", provider);
        registry.open(&Repository::new("storage0", "releases", "/unused").with_implementation("memory")).unwrap()
    }

    fn engine(concurrency: usize) -> ChecksumEngine {
        ChecksumEngine::new(&ChecksumSettings {
            concurrency,
            ..ChecksumSettings::default()
        })
        .unwrap()
    }

    async fn read_string(handle: &RepositoryHandle, path: &str) -> String {
        String::from_utf8(handle.backend().read(Path::new(path)).await.unwrap()).unwrap()
    }

    #[test]
    fn test_unknown_algorithm_is_fatal_up_front() {
        let settings = ChecksumSettings {
            algorithms: vec!["sha256".into(), "whirlpool".into()],
            ..ChecksumSettings::default()
        };
        let err = ChecksumEngine::new(&settings).unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlgorithmUnavailable(name) if name == "whirlpool"));
    }

    #[tokio::test]
    async fn test_regenerate_whole_repository() {
        let handle = open(MockBackend::with_files([
            (JAR, Vec::from(*b"jar")),
            ("org/acme/widget/1.0/widget-1.0.pom", Vec::from(*b"pom")),
            ("org/acme/widget/maven-metadata.json", Vec::from(*b"{}")),
            ("org/acme/widget/1.0/README.txt", Vec::from(*b"foreign")),
        ]));
        let summary = engine(16).regenerate(&handle, None, false).await.unwrap();
        assert_eq!(summary.files_processed, 3);
        assert_eq!(summary.files_rewritten, 3);
        assert!(summary.is_clean());

        let expected = digest_bytes(b"jar", &[DigestAlgorithm::Sha256]);
        assert_eq!(read_string(&handle, &format!("{JAR}.sha256")).await, expected[&DigestAlgorithm::Sha256]);
        assert!(handle.backend().exists(Path::new("org/acme/widget/maven-metadata.json.sha512")).await.unwrap());
        assert!(!handle.backend().exists(Path::new("org/acme/widget/1.0/README.txt.sha256")).await.unwrap());
        // Sidecars are never checksummed themselves
        assert!(!handle.backend().exists(Path::new(&format!("{JAR}.sha256.sha256"))).await.unwrap());

        let again = engine(16).regenerate(&handle, None, false).await.unwrap();
        assert_eq!(again.files_processed, 3);
        assert_eq!(again.files_rewritten, 0);
    }

    #[rstest]
    #[case::keep_stale(false, "stale")]
    #[case::overwrite(true, "fresh")]
    #[tokio::test]
    async fn test_force_regeneration(#[case] force: bool, #[case] expect: &str) {
        let handle = open(MockBackend::with_files([
            (JAR.to_string(), Vec::from(*b"new contents")),
            (format!("{JAR}.sha256"), Vec::from(*b"stale")),
        ]));
        let summary = engine(4).regenerate(&handle, None, force).await.unwrap();
        assert_eq!(summary.files_rewritten, 1);

        let stored = read_string(&handle, &format!("{JAR}.sha256")).await;
        let fresh = digest_bytes(b"new contents", &[DigestAlgorithm::Sha256]).remove(&DigestAlgorithm::Sha256).unwrap();
        match expect {
            "stale" => assert_eq!(stored, "stale"),
            _ => assert_eq!(stored, fresh),
        }
        // The missing sha512 sidecar is written either way
        assert!(handle.backend().exists(Path::new(&format!("{JAR}.sha512"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_unreadable_file_among_many() {
        let files: Vec<(String, Vec<u8>)> = (0..100)
            .map(|i| (format!("org/acme/lib{i}/1.0/lib{i}-1.0.jar"), format!("contents {i}").into_bytes()))
            .collect();
        let handle = open(MockBackend::with_files(files).with_unreadable("org/acme/lib42/1.0/lib42-1.0.jar"));

        let summary = engine(8).regenerate(&handle, None, true).await.unwrap();
        assert_eq!(summary.files_processed, 100);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_rewritten, 99);
        assert_eq!(summary.failures[0].path, Path::new("org/acme/lib42/1.0/lib42-1.0.jar"));
        assert!(handle.backend().exists(Path::new("org/acme/lib99/1.0/lib99-1.0.jar.sha256")).await.unwrap());
        assert!(!handle.backend().exists(Path::new("org/acme/lib42/1.0/lib42-1.0.jar.sha256")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unwritable_sidecar_is_recorded() {
        let handle = open(
            MockBackend::with_files([(JAR, Vec::from(*b"jar")), ("org/acme/widget/1.1/widget-1.1.jar", Vec::from(*b"b"))])
                .with_unwritable(format!("{JAR}.sha512")),
        );
        let summary = engine(1).regenerate(&handle, None, false).await.unwrap();
        assert_eq!((summary.files_processed, summary.files_failed, summary.files_rewritten), (2, 1, 1));
    }

    #[rstest]
    #[case::single_file(Some("org/acme/widget/1.0/widget-1.0.pom"), 1)]
    #[case::version_directory(Some("org/acme/widget/1.0"), 2)]
    #[case::sidecar(Some("org/acme/widget/1.0/widget-1.0.jar.md5"), 0)]
    #[case::missing(Some("org/acme/gadget"), 0)]
    #[case::everything(None, 3)]
    #[tokio::test]
    async fn test_base_path_scoping(#[case] base_path: Option<&str>, #[case] expected: u64) {
        let handle = open(MockBackend::with_files([
            (JAR, Vec::from(*b"jar")),
            ("org/acme/widget/1.0/widget-1.0.jar.md5", Vec::from(*b"md5")),
            ("org/acme/widget/1.0/widget-1.0.pom", Vec::from(*b"pom")),
            ("org/acme/widget/1.1/widget-1.1.jar", Vec::from(*b"jar")),
        ]));
        let summary = engine(16).regenerate(&handle, base_path.map(Path::new), false).await.unwrap();
        assert_eq!(summary.files_processed, expected);
    }

    #[tokio::test]
    async fn test_validate() {
        let handle = open(MockBackend::with_files([(JAR, Vec::from(*b"jar"))]));
        let engine = engine(16);
        let backend = handle.backend().as_ref();
        engine.write_sidecars(backend, Path::new(JAR), b"jar").await.unwrap();
        backend.write(Path::new(&format!("{JAR}.sha512")), b"0000").await.unwrap();

        let report = engine.validate(&handle, Path::new(JAR)).await.unwrap();
        assert_eq!(report[0], (DigestAlgorithm::Sha256, ChecksumStatus::Match));
        assert!(matches!(&report[1], (DigestAlgorithm::Sha512, ChecksumStatus::Mismatch { expected, .. }) if expected == "0000"));

        engine.remove_sidecars(backend, Path::new(JAR)).await.unwrap();
        let report = engine.validate(&handle, Path::new(JAR)).await.unwrap();
        assert!(report.iter().all(|(_, status)| *status == ChecksumStatus::Missing));
        assert!(engine.validate(&handle, Path::new("org/acme/absent.jar")).await.is_err());
    }
}
