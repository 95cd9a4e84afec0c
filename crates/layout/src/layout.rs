//! Mapping between coordinates and repository-relative paths.

use crate::consts::{AUXILIARY_SUFFIXES, METADATA_FILE_NAME, TIMESTAMP_PREFIX_REGEX};
use crate::coordinate::Coordinate;
use crate::error::{Error, ErrorKind};
use crate::version::{Version, VersionKind};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::trace;

/// What a repository file is, as far as the layout can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Artifact(Coordinate),
    Metadata,
}

/// Directory layout of a repository.
///
/// Only the Maven 2 layout exists today:
///
/// ```text
/// org/acme/widget/                          <- group path + artifact id
/// ├── maven-metadata.json                   <- metadata document
/// ├── 1.0/widget-1.0.jar                    <- release
/// └── 2.0-SNAPSHOT/widget-2.0-20240101.000000-1.jar   <- timestamped snapshot
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    #[default]
    Maven2,
}

impl Layout {
    /// Directory holding every version of `group:artifact`.
    pub fn ga_path(&self, group_id: &str, artifact_id: &str) -> PathBuf {
        match self {
            Self::Maven2 => group_id.split('.').chain([artifact_id]).collect(),
        }
    }

    /// Directory holding the files of one version. Timestamped snapshots live
    /// in the directory of their nominal `-SNAPSHOT` version.
    pub fn version_path(&self, coordinate: &Coordinate) -> PathBuf {
        self.ga_path(&coordinate.group_id, &coordinate.artifact_id)
            .join(coordinate.version.base_version().as_str())
    }

    /// Location of the metadata document for `group:artifact`.
    pub fn metadata_path(&self, group_id: &str, artifact_id: &str) -> PathBuf {
        self.ga_path(group_id, artifact_id).join(METADATA_FILE_NAME)
    }

    pub fn to_path(&self, coordinate: &Coordinate) -> PathBuf {
        let mut file_name = format!("{}-{}", coordinate.artifact_id, coordinate.version);
        if let Some(classifier) = &coordinate.classifier {
            file_name.push('-');
            file_name.push_str(classifier);
        }
        file_name.push('.');
        file_name.push_str(&coordinate.extension);
        self.version_path(coordinate).join(file_name)
    }

    /// Parse a repository-relative path back into a coordinate.
    ///
    /// Returns `None` for anything that is not an artifact: metadata
    /// documents, checksum and signature sidecars, hidden or temporary files,
    /// and files whose name does not match the directory they sit in.
    pub fn to_coordinate(&self, path: &Path) -> Option<Coordinate> {
        let coordinate = match self {
            Self::Maven2 => maven2_coordinate(path),
        };
        if coordinate.is_none() {
            trace!(path = %path.display(), "not an artifact path");
        }
        coordinate
    }

    pub fn classify(&self, path: &Path) -> Option<FileKind> {
        if path.file_name().is_some_and(|name| name == METADATA_FILE_NAME) {
            return Some(FileKind::Metadata);
        }
        self.to_coordinate(path).map(FileKind::Artifact)
    }
}

fn maven2_coordinate(path: &Path) -> Option<Coordinate> {
    let components = path
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<&str>>>()?;
    let [groups @ .., artifact_id, version_dir, file_name] = components.as_slice() else {
        return None;
    };
    if groups.is_empty() || is_auxiliary(file_name) {
        return None;
    }

    let directory_version = Version::parse(*version_dir).ok()?;
    let rest = file_name.strip_prefix(artifact_id)?.strip_prefix('-')?;
    let (version, tail) = match directory_version.kind() {
        VersionKind::Snapshot => {
            let base = directory_version.release_part();
            let rest = rest.strip_prefix(base)?.strip_prefix('-')?;
            if let Some(tail) = rest.strip_prefix("SNAPSHOT") {
                (directory_version.clone(), tail)
            } else {
                let stamp = TIMESTAMP_PREFIX_REGEX.find(rest)?;
                let version = Version::parse(format!("{base}-{}", stamp.as_str())).ok()?;
                (version, &rest[stamp.end()..])
            }
        },
        // Timestamps are never directory names
        VersionKind::Timestamped { .. } => return None,
        VersionKind::Release => (directory_version.clone(), rest.strip_prefix(*version_dir)?),
    };

    let (classifier, extension) = if let Some(tail) = tail.strip_prefix('-') {
        let (classifier, extension) = tail.split_once('.')?;
        (Some(classifier.to_string()), extension)
    } else {
        (None, tail.strip_prefix('.')?)
    };
    // `widget-1.0.1.jar` in `1.0/` names a longer version, not extension `1.jar`
    if extension.is_empty() || extension.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Coordinate::new(groups.join("."), *artifact_id, version, classifier, extension).ok()
}

fn is_auxiliary(file_name: &str) -> bool {
    file_name.starts_with('.')
        || file_name.starts_with("maven-metadata")
        || file_name
            .rsplit_once('.')
            .is_some_and(|(_, suffix)| AUXILIARY_SUFFIXES.contains(&suffix))
}

impl FromStr for Layout {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maven2" | "maven-2" => Ok(Self::Maven2),
            _ => exn::bail!(ErrorKind::UnknownLayout(s.to_string())),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maven2 => f.write_str("maven2"),
        }
    }
}
