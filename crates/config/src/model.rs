use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_IMPLEMENTATION: &str = "file-system";
pub const DEFAULT_LAYOUT: &str = "maven2";

/// What a repository lets callers do to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryPolicy {
    pub allows_deployment: bool,
    /// Overwriting an artifact that already exists.
    pub allows_redeployment: bool,
    pub allows_deletion: bool,
}

impl Default for RepositoryPolicy {
    fn default() -> Self {
        Self {
            allows_deployment: true,
            allows_redeployment: false,
            allows_deletion: true,
        }
    }
}

impl RepositoryPolicy {
    /// Nothing may be written or removed.
    pub fn read_only() -> Self {
        Self {
            allows_deployment: false,
            allows_redeployment: false,
            allows_deletion: false,
        }
    }
}

/// A repository, owned by exactly one [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: String,
    pub storage_id: String,
    /// Tag selecting the storage provider.
    pub implementation: String,
    /// Tag selecting the layout provider.
    pub layout: String,
    pub basedir: PathBuf,
    pub policy: RepositoryPolicy,
}

impl Repository {
    pub fn new(storage_id: impl Into<String>, id: impl Into<String>, basedir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            storage_id: storage_id.into(),
            implementation: DEFAULT_IMPLEMENTATION.to_string(),
            layout: DEFAULT_LAYOUT.to_string(),
            basedir: basedir.into(),
            policy: RepositoryPolicy::default(),
        }
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = implementation.into();
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    pub fn with_policy(mut self, policy: RepositoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `storage/repository`, for logs and error messages.
    pub fn key(&self) -> String {
        format!("{}/{}", self.storage_id, self.id)
    }
}

/// A named group of repositories sharing a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    pub id: String,
    pub basedir: PathBuf,
    repositories: BTreeMap<String, Repository>,
}

impl Storage {
    pub fn new(id: impl Into<String>, basedir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            basedir: basedir.into(),
            repositories: BTreeMap::new(),
        }
    }

    /// Add (or replace) a repository. Its `storage_id` is set to this storage.
    pub fn with_repository(mut self, mut repository: Repository) -> Self {
        repository.storage_id = self.id.clone();
        self.repositories.insert(repository.id.clone(), repository);
        self
    }

    /// Add a repository stored in `<basedir>/<id>` with default settings.
    pub fn with_default_repository(self, id: impl Into<String>, policy: RepositoryPolicy) -> Self {
        let id = id.into();
        let basedir = self.basedir.join(&id);
        let repository = Repository::new(&self.id, id, basedir).with_policy(policy);
        self.with_repository(repository)
    }

    pub fn repositories(&self) -> &BTreeMap<String, Repository> {
        &self.repositories
    }

    pub fn repository(&self, id: &str) -> Option<&Repository> {
        self.repositories.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumSettings {
    /// Digest algorithms to maintain sidecars for, by name.
    pub algorithms: Vec<String>,
    /// Files digested at the same time during a traversal.
    pub concurrency: usize,
}

impl Default for ChecksumSettings {
    fn default() -> Self {
        Self {
            algorithms: vec!["sha256".to_string(), "sha512".to_string()],
            concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Repositories processed at the same time by one job.
    pub concurrency: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// A named regeneration job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub storage_id: Option<String>,
    pub repository_id: Option<String>,
    pub base_path: Option<PathBuf>,
    pub force_regeneration: bool,
}

/// Everything the engine needs to know about storages, repositories and its
/// own tuning. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    storages: BTreeMap<String, Storage>,
    checksum: ChecksumSettings,
    orchestrator: OrchestratorSettings,
    jobs: BTreeMap<String, JobConfig>,
}

impl Configuration {
    pub fn new(storages: impl IntoIterator<Item = Storage>) -> Self {
        Self {
            storages: storages.into_iter().map(|storage| (storage.id.clone(), storage)).collect(),
            ..Self::default()
        }
    }

    pub fn with_checksum(mut self, checksum: ChecksumSettings) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorSettings) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_job(mut self, name: impl Into<String>, job: JobConfig) -> Self {
        self.jobs.insert(name.into(), job);
        self
    }

    pub fn storages(&self) -> &BTreeMap<String, Storage> {
        &self.storages
    }

    pub fn storage(&self, storage_id: &str) -> Option<&Storage> {
        self.storages.get(storage_id)
    }

    pub fn repositories(&self, storage_id: &str) -> Option<&BTreeMap<String, Repository>> {
        self.storage(storage_id).map(Storage::repositories)
    }

    pub fn repository(&self, storage_id: &str, repository_id: &str) -> Option<&Repository> {
        self.storage(storage_id)?.repository(repository_id)
    }

    pub fn checksum(&self) -> &ChecksumSettings {
        &self.checksum
    }

    pub fn orchestrator(&self) -> &OrchestratorSettings {
        &self.orchestrator
    }

    pub fn jobs(&self) -> &BTreeMap<String, JobConfig> {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.get(name)
    }
}

// Shapes as they appear in configuration sources, before ids are attached
// and base directories resolved.

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct RawConfiguration {
    pub storages: BTreeMap<String, RawStorage>,
    pub checksum: ChecksumSettings,
    pub orchestrator: OrchestratorSettings,
    pub jobs: BTreeMap<String, JobConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawStorage {
    pub basedir: PathBuf,
    #[serde(default)]
    pub repositories: BTreeMap<String, RawRepository>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawRepository {
    #[serde(default = "default_implementation")]
    pub implementation: String,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default)]
    pub basedir: Option<PathBuf>,
    #[serde(flatten)]
    pub policy: RepositoryPolicy,
}

fn default_implementation() -> String {
    DEFAULT_IMPLEMENTATION.to_string()
}

fn default_layout() -> String {
    DEFAULT_LAYOUT.to_string()
}

impl RawRepository {
    pub(crate) fn resolve(self, storage_id: &str, id: &str, storage_basedir: &Path) -> Repository {
        Repository {
            id: id.to_string(),
            storage_id: storage_id.to_string(),
            implementation: self.implementation,
            layout: self.layout,
            basedir: match self.basedir {
                Some(basedir) if basedir.is_absolute() => basedir,
                Some(basedir) => storage_basedir.join(basedir),
                None => storage_basedir.join(id),
            },
            policy: self.policy,
        }
    }
}
