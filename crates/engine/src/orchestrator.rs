//! Regeneration jobs over many repositories.
//!
//! A [`JobScope`] names what to regenerate; the [`Orchestrator`] expands it
//! into one [`Target`] per repository and runs them with bounded
//! concurrency. Failures are collected per target and never stop the other
//! targets, and [`run_job`](Orchestrator::run_job) tells its
//! [`JobListener`] about completion exactly once whatever happens.

use crate::depot::Depot;
use crate::error::ErrorKind;
use depot_checksum::ChecksumSummary;
use depot_config::JobConfig;
use depot_metadata::RebuildSummary;
use futures::FutureExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// What a regeneration job covers.
///
/// No storage means every storage; a storage without a repository means
/// every repository in it. A base path narrows a single repository to one
/// subtree and also rebuilds the metadata below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobScope {
    pub storage_id: Option<String>,
    pub repository_id: Option<String>,
    pub base_path: Option<PathBuf>,
    pub force_regeneration: bool,
}

impl JobScope {
    /// Read the scheduler's string properties: `storageId`, `repositoryId`,
    /// `basePath` and `forceRegeneration`. Blank values count as absent, and
    /// only `true` (in any case) forces regeneration.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let get = |key: &str| properties.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        Self {
            storage_id: get("storageId").map(str::to_string),
            repository_id: get("repositoryId").map(str::to_string),
            base_path: get("basePath").map(PathBuf::from),
            force_regeneration: get("forceRegeneration").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
        .normalized()
    }

    /// Drop keys that narrow an absent outer key: a repository without a
    /// storage, or a base path without a repository.
    pub fn normalized(mut self) -> Self {
        if self.storage_id.is_none()
            && let Some(repository_id) = self.repository_id.take()
        {
            warn!(%repository_id, "ignoring repository without storage");
        }
        if self.repository_id.is_none()
            && let Some(base_path) = self.base_path.take()
        {
            warn!(base_path = %base_path.display(), "ignoring base path without repository");
        }
        self
    }
}

impl From<&JobConfig> for JobScope {
    fn from(job: &JobConfig) -> Self {
        Self {
            storage_id: job.storage_id.clone(),
            repository_id: job.repository_id.clone(),
            base_path: job.base_path.clone(),
            force_regeneration: job.force_regeneration,
        }
        .normalized()
    }
}

/// One repository (or subtree of one) to regenerate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Target {
    pub storage_id: String,
    pub repository_id: String,
    pub base_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: Target,
    pub checksums: Option<ChecksumSummary>,
    pub metadata: Option<RebuildSummary>,
    /// Why the target as a whole failed, if it did.
    pub error: Option<String>,
}

impl TargetReport {
    /// No target-level error and no failed file.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.checksums.as_ref().is_none_or(ChecksumSummary::is_clean)
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub scope: JobScope,
    /// Sorted by target.
    pub targets: Vec<TargetReport>,
    /// Problems that stopped a storage or repository from becoming a target,
    /// or the job from running at all.
    pub errors: Vec<String>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.targets.iter().all(TargetReport::is_success)
    }

    pub fn files_processed(&self) -> u64 {
        self.checksums().map(|s| s.files_processed).sum()
    }

    pub fn files_failed(&self) -> u64 {
        self.checksums().map(|s| s.files_failed).sum()
    }

    pub fn files_rewritten(&self) -> u64 {
        self.checksums().map(|s| s.files_rewritten).sum()
    }

    fn checksums(&self) -> impl Iterator<Item = &ChecksumSummary> {
        self.targets.iter().filter_map(|t| t.checksums.as_ref())
    }

    fn failed(scope: JobScope, error: String) -> Self {
        Self {
            scope,
            targets: Vec::new(),
            errors: vec![error],
        }
    }
}

/// Told when a job finishes.
pub trait JobListener: Send + Sync {
    fn job_completed(&self, job: &str, report: &JobReport);
}

impl<F> JobListener for F
where
    F: Fn(&str, &JobReport) + Send + Sync,
{
    fn job_completed(&self, job: &str, report: &JobReport) {
        self(job, report)
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    depot: Depot,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(depot: Depot) -> Self {
        let concurrency = depot.configuration().orchestrator().concurrency.max(1);
        Self { depot, concurrency }
    }

    /// Expand `scope` into targets. Storages or repositories that do not
    /// exist are returned as errors next to the targets that do.
    pub fn resolve_targets(&self, scope: &JobScope) -> (Vec<Target>, Vec<String>) {
        let scope = scope.clone().normalized();
        let configuration = self.depot.configuration();
        let mut targets = Vec::new();
        let mut errors = Vec::new();
        let storages: Vec<_> = match &scope.storage_id {
            Some(storage_id) => match configuration.storage(storage_id) {
                Some(storage) => vec![storage],
                None => {
                    errors.push(ErrorKind::NoSuchStorage(storage_id.clone()).to_string());
                    Vec::new()
                },
            },
            None => configuration.storages().values().collect(),
        };
        for storage in storages {
            let repositories: Vec<_> = match &scope.repository_id {
                Some(repository_id) => match storage.repository(repository_id) {
                    Some(repository) => vec![repository],
                    None => {
                        let key = format!("{}/{repository_id}", storage.id);
                        errors.push(ErrorKind::NoSuchRepository(key).to_string());
                        Vec::new()
                    },
                },
                None => storage.repositories().values().collect(),
            };
            targets.extend(repositories.into_iter().map(|repository| Target {
                storage_id: storage.id.clone(),
                repository_id: repository.id.clone(),
                base_path: scope.base_path.clone(),
            }));
        }
        (targets, errors)
    }

    /// Run every target of `scope`. Never fails; see the report.
    #[instrument(skip(self))]
    pub async fn run(&self, scope: &JobScope) -> JobReport {
        let (targets, errors) = self.resolve_targets(scope);
        for error in &errors {
            warn!(%error, "skipping missing job target");
        }

        let mut pending = targets.into_iter();
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.by_ref().take(self.concurrency).map(|t| self.run_target(t, scope.force_regeneration)));
        let mut reports = Vec::new();
        while let Some(report) = processing.next().await {
            reports.push(report);
            // Pop-n-push to keep the bound.
            if let Some(target) = pending.next() {
                processing.push(self.run_target(target, scope.force_regeneration));
            }
        }
        reports.sort_by(|a, b| a.target.cmp(&b.target));

        let report = JobReport {
            scope: scope.clone(),
            targets: reports,
            errors,
        };
        info!(
            targets = report.targets.len(),
            processed = report.files_processed(),
            failed = report.files_failed(),
            rewritten = report.files_rewritten(),
            success = report.is_success(),
            "job complete"
        );
        report
    }

    async fn run_target(&self, target: Target, force_regeneration: bool) -> TargetReport {
        let base_path = target.base_path.as_deref();
        let mut report = TargetReport {
            checksums: None,
            metadata: None,
            error: None,
            target: target.clone(),
        };
        // Metadata first so its documents get their sidecars in the same pass.
        if base_path.is_some() {
            match self.depot.rebuild_metadata(&target.storage_id, &target.repository_id, base_path).await {
                Ok(summary) => report.metadata = Some(summary),
                Err(e) => {
                    error!(storage = %target.storage_id, repository = %target.repository_id, error = ?e, "metadata rebuild failed");
                    report.error = Some(e.to_string());
                },
            }
        }
        match self
            .depot
            .regenerate_checksum(&target.storage_id, &target.repository_id, base_path, force_regeneration)
            .await
        {
            Ok(summary) => report.checksums = Some(summary),
            Err(e) => {
                error!(storage = %target.storage_id, repository = %target.repository_id, error = ?e, "checksum regeneration failed");
                report.error.get_or_insert_with(|| e.to_string());
            },
        }
        report
    }

    /// Run `scope` as the job `name` and tell `listener` exactly once, even
    /// if the run panics.
    pub async fn run_job(&self, name: &str, scope: &JobScope, listener: &dyn JobListener) -> JobReport {
        let report = match AssertUnwindSafe(self.run(scope)).catch_unwind().await {
            Ok(report) => report,
            Err(_) => {
                error!(job = name, "job aborted unexpectedly");
                JobReport::failed(scope.clone(), "job aborted unexpectedly".to_string())
            },
        };
        listener.job_completed(name, &report);
        report
    }

    /// Run the job configured as `name`.
    pub async fn run_configured(&self, name: &str, listener: &dyn JobListener) -> JobReport {
        match self.depot.configuration().job(name) {
            Some(job) => self.run_job(name, &JobScope::from(job), listener).await,
            None => {
                error!(job = name, "no such job");
                let report = JobReport::failed(JobScope::default(), format!("no such job: {name}"));
                listener.job_completed(name, &report);
                report
            },
        }
    }

    /// Run a job described by scheduler properties.
    pub async fn run_properties(
        &self,
        name: &str,
        properties: &HashMap<String, String>,
        listener: &dyn JobListener,
    ) -> JobReport {
        self.run_job(name, &JobScope::from_properties(properties), listener).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_config::{Configuration, OrchestratorSettings, Repository, RepositoryPolicy, Storage};
    use depot_provider::{FixedStorageProvider, ProviderRegistry};
    use depot_storage::backend::MockBackend;
    use rstest::rstest;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn files(prefix: &str) -> MockBackend {
        MockBackend::with_files([
            (format!("org/acme/{prefix}/1.0/{prefix}-1.0.jar"), b"a".to_vec()),
            (format!("org/acme/{prefix}/1.1/{prefix}-1.1.jar"), b"b".to_vec()),
        ])
    }

    fn orchestrator() -> Orchestrator {
        let mut provider = FixedStorageProvider::new();
        let mut storages = Vec::new();
        for storage_id in ["storage0", "storage1"] {
            let mut storage = Storage::new(storage_id, "/unused");
            for repository_id in ["releases", "snapshots"] {
                let backend = match (storage_id, repository_id) {
                    ("storage1", "snapshots") => files("broken").with_unreadable("org/acme/broken/1.0/broken-1.0.jar"),
                    _ => files(repository_id),
                };
                provider = provider.with_backend(storage_id, repository_id, Arc::new(backend));
                let repository = Repository::new(storage_id, repository_id, "/unused")
                    .with_implementation("memory")
                    .with_policy(RepositoryPolicy::default());
                storage = storage.with_repository(repository);
            }
            storages.push(storage);
        }
        // A repository whose provider does not exist
        storages.push(
            Storage::new("storage2", "/unused")
                .with_repository(Repository::new("storage2", "p2", "/unused").with_layout("p2").with_implementation("memory")),
        );
        let configuration = Configuration::new(storages).with_orchestrator(OrchestratorSettings { concurrency: 2 });
        let registry = ProviderRegistry::with_defaults().with_storage_provider("memory", provider);
        Orchestrator::new(Depot::new(configuration, registry).unwrap())
    }

    fn scope(storage_id: Option<&str>, repository_id: Option<&str>, base_path: Option<&str>) -> JobScope {
        JobScope {
            storage_id: storage_id.map(str::to_string),
            repository_id: repository_id.map(str::to_string),
            base_path: base_path.map(PathBuf::from),
            force_regeneration: false,
        }
    }

    #[rstest]
    #[case::everything(scope(None, None, None), 5, 0)]
    #[case::one_storage(scope(Some("storage0"), None, None), 2, 0)]
    #[case::one_repository(scope(Some("storage0"), Some("releases"), None), 1, 0)]
    #[case::subtree(scope(Some("storage0"), Some("releases"), Some("org/acme")), 1, 0)]
    #[case::missing_storage(scope(Some("storage9"), None, None), 0, 1)]
    #[case::missing_repository(scope(Some("storage1"), Some("nope"), None), 0, 1)]
    #[case::repository_without_storage(scope(None, Some("releases"), None), 5, 0)]
    #[case::path_without_repository(scope(Some("storage0"), None, Some("org/acme")), 2, 0)]
    #[case::path_alone(scope(None, None, Some("org/acme")), 5, 0)]
    #[case::repository_and_path_without_storage(scope(None, Some("releases"), Some("org/acme")), 5, 0)]
    fn test_resolve_targets(#[case] scope: JobScope, #[case] targets: usize, #[case] errors: usize) {
        let (resolved, failed) = orchestrator().resolve_targets(&scope);
        assert_eq!(resolved.len(), targets);
        assert_eq!(failed.len(), errors);
        let base_path = scope.normalized().base_path;
        assert!(resolved.iter().all(|t| t.base_path == base_path));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_targets() {
        let report = orchestrator().run(&scope(None, None, None)).await;
        assert_eq!(report.targets.len(), 5);
        assert!(!report.is_success());

        let failed: Vec<_> = report.targets.iter().filter(|t| !t.is_success()).map(|t| t.target.clone()).collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].storage_id, "storage1");
        assert_eq!(failed[0].repository_id, "snapshots");
        assert_eq!(failed[1].storage_id, "storage2");
        // Four repositories with two files each, one of which could not be read
        assert_eq!(report.files_processed(), 8);
        assert_eq!(report.files_failed(), 1);
        assert_eq!(report.files_rewritten(), 7);
    }

    #[tokio::test]
    async fn test_base_path_rebuilds_metadata() {
        let orchestrator = orchestrator();
        let report = orchestrator.run(&scope(Some("storage0"), Some("releases"), Some("org/acme/releases"))).await;
        assert!(report.is_success());
        let target = &report.targets[0];
        assert_eq!(target.metadata.map(|m| m.documents_written), Some(1));
        // Two jars plus the fresh metadata document
        assert_eq!(target.checksums.as_ref().map(|c| c.files_processed), Some(3));

        let handle = orchestrator.depot.open("storage0", "releases").unwrap();
        let doc = orchestrator.depot.metadata().get(&handle, "org.acme", "releases").await.unwrap().unwrap();
        assert_eq!(doc.latest.as_deref(), Some("1.1"));
        assert!(handle.backend().exists(Path::new("org/acme/releases/maven-metadata.json.sha256")).await.unwrap());
    }

    #[rstest]
    #[case::configured_scope(scope(Some("storage0"), None, None), true)]
    #[case::missing_storage(scope(Some("storage9"), None, None), false)]
    #[tokio::test]
    async fn test_listener_called_once(#[case] scope: JobScope, #[case] success: bool) {
        let calls = Mutex::new(Vec::new());
        let listener = |job: &str, report: &JobReport| calls.lock().unwrap().push((job.to_string(), report.is_success()));
        orchestrator().run_job("nightly", &scope, &listener).await;
        assert_eq!(calls.into_inner().unwrap(), vec![("nightly".to_string(), success)]);
    }

    #[tokio::test]
    async fn test_unknown_job_still_completes() {
        let calls = Mutex::new(0);
        let listener = |_: &str, report: &JobReport| {
            assert!(!report.is_success());
            *calls.lock().unwrap() += 1;
        };
        let report = orchestrator().run_configured("missing", &listener).await;
        assert_eq!(report.errors, vec!["no such job: missing"]);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[rstest]
    #[case::empty(&[], scope(None, None, None))]
    #[case::full(
        &[("storageId", "storage0"), ("repositoryId", "releases"), ("basePath", "org/acme"), ("forceRegeneration", "TRUE")],
        JobScope { force_regeneration: true, ..scope(Some("storage0"), Some("releases"), Some("org/acme")) }
    )]
    #[case::blank_values(&[("storageId", " "), ("forceRegeneration", "")], scope(None, None, None))]
    #[case::unrecognised_flag(&[("storageId", "storage0"), ("forceRegeneration", "yes")], scope(Some("storage0"), None, None))]
    #[case::repository_without_storage(&[("repositoryId", "releases")], scope(None, None, None))]
    #[case::path_without_repository(
        &[("storageId", "storage0"), ("basePath", "org/acme")],
        scope(Some("storage0"), None, None)
    )]
    #[case::path_without_storage(&[("repositoryId", "releases"), ("basePath", "org/acme")], scope(None, None, None))]
    fn test_from_properties(#[case] properties: &[(&str, &str)], #[case] expected: JobScope) {
        let properties: HashMap<String, String> =
            properties.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert_eq!(JobScope::from_properties(&properties), expected);
    }

    #[test]
    fn test_configured_scope_follows_the_same_rule() {
        let job = JobConfig {
            repository_id: Some("releases".to_string()),
            base_path: Some(PathBuf::from("org/acme")),
            force_regeneration: true,
            ..JobConfig::default()
        };
        assert_eq!(JobScope::from(&job), JobScope { force_regeneration: true, ..scope(None, None, None) });
    }

    #[tokio::test]
    async fn test_run_properties_with_unrecognised_flag() {
        let calls = Mutex::new(0);
        let listener = |_: &str, _: &JobReport| *calls.lock().unwrap() += 1;
        let properties = HashMap::from([
            ("storageId".to_string(), "storage0".to_string()),
            ("repositoryId".to_string(), "releases".to_string()),
            ("forceRegeneration".to_string(), "maybe".to_string()),
        ]);
        let report = orchestrator().run_properties("adhoc", &properties, &listener).await;
        assert!(!report.scope.force_regeneration);
        assert!(report.is_success());
        assert_eq!(report.targets.len(), 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
