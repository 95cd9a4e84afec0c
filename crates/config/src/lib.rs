//! Configuration for depot.
//!
//! Sources are merged lowest to highest precedence:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, picked by extension),
//! 3. `DEPOT_`-prefixed environment variables, `__` separating nested keys
//!    (`DEPOT_CHECKSUM__CONCURRENCY=32`).
//!
//! ```toml
//! [storages.storage0]
//! basedir = "/srv/depot/storage0"
//!
//! [storages.storage0.repositories.releases]
//! allows_redeployment = false
//!
//! [storages.storage0.repositories.snapshots]
//! layout = "maven2-snapshot"
//! allows_redeployment = true
//!
//! [jobs.nightly-checksums]
//! storage_id = "storage0"
//! force_regeneration = true
//! ```

pub mod error;
mod model;

pub use crate::model::{
    ChecksumSettings, Configuration, DEFAULT_IMPLEMENTATION, DEFAULT_LAYOUT, JobConfig, OrchestratorSettings,
    Repository, RepositoryPolicy, Storage,
};
use crate::error::{ErrorKind, Result};
use crate::model::RawConfiguration;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_PREFIX: &str = "DEPOT_";
const DEFAULT_FILE_NAME: &str = "depot.toml";

/// Platform configuration file location, e.g. `~/.config/depot/depot.toml`.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "depot").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}

/// Build the layered [`Figment`] without extracting it.
///
/// An explicit `path` must exist. Without one, the [`default_path`] is used
/// when present and silently skipped otherwise.
pub fn figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(RawConfiguration::default()));
    match path {
        Some(path) => {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = merge_file(figment, path)?;
        },
        None => {
            if let Some(path) = default_path()
                && path.is_file()
            {
                figment = merge_file(figment, &path)?;
            }
        },
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    debug!(path = %path.display(), "reading configuration file");
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

/// Load and validate the configuration. See [`figment`] for sources.
pub fn load(path: Option<&Path>) -> Result<Configuration> {
    from_figment(&figment(path)?)
}

/// Extract and validate a configuration from any figment.
pub fn from_figment(figment: &Figment) -> Result<Configuration> {
    let raw: RawConfiguration = figment.extract().or_raise(|| ErrorKind::Parse)?;
    let configuration = resolve(raw)?;
    debug!(
        storages = configuration.storages().len(),
        jobs = configuration.jobs().len(),
        "configuration loaded"
    );
    Ok(configuration)
}

fn resolve(raw: RawConfiguration) -> Result<Configuration> {
    if raw.checksum.algorithms.is_empty() {
        exn::bail!(ErrorKind::Invalid("checksum.algorithms must not be empty".to_string()));
    }
    if raw.checksum.concurrency == 0 || raw.orchestrator.concurrency == 0 {
        exn::bail!(ErrorKind::Invalid("concurrency must be at least 1".to_string()));
    }

    let mut storages = Vec::with_capacity(raw.storages.len());
    for (storage_id, raw_storage) in raw.storages {
        check_identifier("storage", &storage_id)?;
        let basedir = std::path::absolute(&raw_storage.basedir)
            .or_raise(|| ErrorKind::Invalid(format!("storage {storage_id}: bad basedir")))?;
        let mut storage = Storage::new(&storage_id, &basedir);
        for (repository_id, raw_repository) in raw_storage.repositories {
            check_identifier("repository", &repository_id)?;
            storage = storage.with_repository(raw_repository.resolve(&storage_id, &repository_id, &basedir));
        }
        storages.push(storage);
    }

    let mut configuration = Configuration::new(storages)
        .with_checksum(raw.checksum)
        .with_orchestrator(raw.orchestrator);
    for (name, job) in raw.jobs {
        configuration = configuration.with_job(name, job);
    }
    Ok(configuration)
}

fn check_identifier(what: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains(['/', '\\', '\0']) || id == "." || id == ".." {
        exn::bail!(ErrorKind::Invalid(format!("{what} identifier {id:?}")));
    }
    Ok(())
}
