use depot_layout::{Version, VersionKind};
use depot_provider::VersionDirectory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{OffsetDateTime, PrimitiveDateTime};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const LAST_UPDATED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");
const SNAPSHOT_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day].[hour][minute][second]");

/// `yyyyMMddHHmmss`, UTC.
pub fn format_last_updated(at: OffsetDateTime) -> String {
    format_utc(at, LAST_UPDATED_FORMAT)
}

/// Whether `stamp` reads as a `yyyyMMddHHmmss` date.
pub(crate) fn is_last_updated(stamp: &str) -> bool {
    PrimitiveDateTime::parse(stamp, LAST_UPDATED_FORMAT).is_ok()
}

/// Whether `stamp` reads as a `yyyyMMdd.HHmmss` snapshot timestamp.
pub(crate) fn is_snapshot_timestamp(stamp: &str) -> bool {
    PrimitiveDateTime::parse(stamp, SNAPSHOT_TIMESTAMP_FORMAT).is_ok()
}

fn format_utc(at: OffsetDateTime, format: &[BorrowedFormatItem<'static>]) -> String {
    // Every UTC date in range formats; the fallback is unreachable in practice.
    at.to_offset(time::UtcOffset::UTC).format(format).unwrap_or_default()
}

/// Timestamp and build number of the newest deployment of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    /// `yyyyMMdd.HHmmss`
    pub timestamp: String,
    pub build_number: u32,
}

/// Aggregate version information for one `group:artifact`.
///
/// Invariants kept by every constructor and by [`normalize`](Self::normalize):
/// `versions` is sorted by the version comparator without duplicates,
/// `release` (if any) is a non-snapshot member of `versions`, and `latest`
/// (if any) is a member of `versions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    /// Keyed by nominal snapshot version (`2.0-SNAPSHOT`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub snapshots: BTreeMap<String, SnapshotBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl MetadataDocument {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            versions: Vec::new(),
            release: None,
            latest: None,
            snapshots: BTreeMap::new(),
            last_updated: None,
        }
    }

    pub fn with_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions.extend(versions.into_iter().map(Into::into));
        self.normalize();
        self
    }

    pub fn with_latest(mut self, latest: impl Into<String>) -> Self {
        self.latest = Some(latest.into());
        self.normalize();
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self.normalize();
        self
    }

    pub fn with_snapshot(mut self, base_version: impl Into<String>, timestamp: impl Into<String>, build: u32) -> Self {
        self.snapshots.insert(
            base_version.into(),
            SnapshotBlock {
                timestamp: timestamp.into(),
                build_number: build,
            },
        );
        self
    }

    pub fn with_last_updated(mut self, last_updated: impl Into<String>) -> Self {
        self.last_updated = Some(last_updated.into());
        self
    }

    /// Restore the invariants: pointers join the version set, a snapshot
    /// release is dropped, and versions are sorted and deduplicated.
    /// Unparseable version strings are removed.
    pub fn normalize(&mut self) {
        if let Some(release) = &self.release
            && Version::parse(release.as_str()).is_ok_and(|v| v.is_snapshot())
        {
            self.release = None;
        }
        self.versions.extend(self.release.iter().cloned());
        self.versions.extend(self.latest.iter().cloned());

        let mut parsed: Vec<Version> = self.versions.drain(..).filter_map(|v| Version::parse(v).ok()).collect();
        parsed.sort();
        parsed.dedup();
        self.versions = parsed.into_iter().map(|v| v.to_string()).collect();

        if self.release.as_ref().is_some_and(|r| !self.versions.contains(r)) {
            self.release = None;
        }
        if self.latest.as_ref().is_some_and(|l| !self.versions.contains(l)) {
            self.latest = None;
        }
    }

    /// Derive a document from the version directories found on disk.
    ///
    /// `previous` is the document being replaced, if it could be read. Its
    /// snapshot blocks carry build numbers forward: a block only changes when
    /// a timestamped artifact newer than the one it records shows up, and its
    /// build number then moves past the previous one. Without a previous
    /// block, the newest timestamped artifact's own build number is used, or
    /// `1` when there is no timestamped artifact at all.
    ///
    /// The result depends only on its inputs, so an unchanged tree derives
    /// an identical document.
    pub fn derive(
        group_id: &str,
        artifact_id: &str,
        directories: &[VersionDirectory],
        previous: Option<&MetadataDocument>,
    ) -> Self {
        let mut document = Self::new(group_id, artifact_id);
        let mut versions: Vec<&Version> = Vec::with_capacity(directories.len());
        let mut newest_file: Option<OffsetDateTime> = None;

        for directory in directories {
            versions.push(&directory.version);
            let directory_modified = directory.artifacts.iter().map(|a| a.file.modified).max();
            newest_file = newest_file.max(directory_modified);
            if !directory.version.is_snapshot() {
                continue;
            }
            let observed = directory
                .artifacts
                .iter()
                .filter_map(|artifact| match artifact.coordinate.version.kind() {
                    VersionKind::Timestamped { timestamp, build_number } => Some((timestamp.as_str(), *build_number)),
                    _ => None,
                })
                .max();
            let previous_block = previous.and_then(|doc| doc.snapshots.get(directory.version.as_str()));
            let block = match (previous_block, observed) {
                (None, Some((timestamp, build_number))) => SnapshotBlock {
                    timestamp: timestamp.to_string(),
                    build_number,
                },
                (None, None) => SnapshotBlock {
                    timestamp: directory_modified
                        .map(|at| format_utc(at, SNAPSHOT_TIMESTAMP_FORMAT))
                        .unwrap_or_default(),
                    build_number: 1,
                },
                (Some(block), Some((timestamp, build_number)))
                    if (timestamp, build_number) > (block.timestamp.as_str(), block.build_number) =>
                {
                    SnapshotBlock {
                        timestamp: timestamp.to_string(),
                        build_number: build_number.max(block.build_number.saturating_add(1)),
                    }
                },
                (Some(block), _) => block.clone(),
            };
            document.snapshots.insert(directory.version.to_string(), block);
        }

        versions.sort();
        document.release = versions.iter().rev().find(|v| !v.is_snapshot()).map(|v| v.to_string());
        document.latest = versions.last().map(|v| v.to_string());
        document.versions = versions.iter().map(|v| v.to_string()).collect();
        document.last_updated = newest_file.map(format_last_updated);
        document
    }

    /// Combine `fragment` into `self`.
    ///
    /// Versions are unioned. The fragment's snapshot blocks replace existing
    /// ones for the same base version. Its `latest` and `release` pointers
    /// win when the fragment is at least as recent as `self` by
    /// `last_updated`; a fragment without `last_updated` counts as written
    /// at `now`, and a stored stamp that is not a date counts as the oldest.
    pub fn merge(&mut self, fragment: &MetadataDocument, now: OffsetDateTime) {
        let incoming_stamp = fragment.last_updated.clone().unwrap_or_else(|| format_last_updated(now));
        // A stamp that does not read as a date cannot order anything.
        let current_stamp = self.last_updated.take().filter(|stamp| is_last_updated(stamp));
        let incoming_wins = current_stamp.as_ref().is_none_or(|current| incoming_stamp >= *current);

        self.versions.extend(fragment.versions.iter().cloned());
        self.versions.extend(fragment.latest.iter().cloned());
        self.versions.extend(fragment.release.iter().cloned());
        if incoming_wins {
            if let Some(latest) = &fragment.latest {
                self.latest = Some(latest.clone());
            }
            if let Some(release) = &fragment.release
                && Version::parse(release.as_str()).is_ok_and(|v| !v.is_snapshot())
            {
                self.release = Some(release.clone());
            }
        }
        for (base_version, block) in &fragment.snapshots {
            self.snapshots.insert(base_version.clone(), block.clone());
        }
        self.last_updated = current_stamp.max(Some(incoming_stamp));
        self.normalize();
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_layout::Coordinate;
    use depot_provider::Artifact;
    use depot_storage::FileInfo;
    use std::path::PathBuf;
    use time::macros::datetime;

    fn directory(version: &str, files: &[&str]) -> VersionDirectory {
        let artifacts = files
            .iter()
            .enumerate()
            .map(|(i, file_version)| Artifact {
                coordinate: format!("org.carlspring.strongbox:strongbox-metadata:{file_version}").parse::<Coordinate>().unwrap(),
                file: FileInfo::new(
                    PathBuf::from(version).join(file_version),
                    1,
                    datetime!(2024-01-01 00:00 UTC) + time::Duration::minutes(i as i64),
                ),
            })
            .collect();
        VersionDirectory {
            path: PathBuf::from(version),
            version: Version::parse(version).unwrap(),
            artifacts,
        }
    }

    #[test]
    fn test_derive_timestamped_snapshots() {
        let dirs = [directory(
            "2.0-SNAPSHOT",
            &["2.0-20240101.000000-1", "2.0-20240101.000100-2", "2.0-20240101.000200-3"],
        )];
        let doc = MetadataDocument::derive("org.carlspring.strongbox", "strongbox-metadata", &dirs, None);
        assert_eq!(doc.versions, vec!["2.0-SNAPSHOT"]);
        assert_eq!(doc.latest.as_deref(), Some("2.0-SNAPSHOT"));
        assert_eq!(doc.release, None);
        let block = &doc.snapshots["2.0-SNAPSHOT"];
        assert_eq!((block.timestamp.as_str(), block.build_number), ("20240101.000200", 3));
        assert_eq!(doc.last_updated.as_deref(), Some("20240101000200"));
    }

    #[test]
    fn test_derive_release_and_latest() {
        let dirs = [
            directory("1.0", &["1.0"]),
            directory("1.10", &["1.10"]),
            directory("1.9", &["1.9"]),
            directory("2.0-SNAPSHOT", &["2.0-SNAPSHOT"]),
        ];
        let doc = MetadataDocument::derive("org.acme", "widget", &dirs, None);
        assert_eq!(doc.versions, vec!["1.0", "1.9", "1.10", "2.0-SNAPSHOT"]);
        assert_eq!(doc.release.as_deref(), Some("1.10"));
        assert_eq!(doc.latest.as_deref(), Some("2.0-SNAPSHOT"));
        // Only the nominal file: build 1, stamped from the file time
        let block = &doc.snapshots["2.0-SNAPSHOT"];
        assert_eq!((block.timestamp.as_str(), block.build_number), ("20240101.000000", 1));
    }

    #[test]
    fn test_build_number_only_moves_for_new_artifacts() {
        let before = [directory("2.0-SNAPSHOT", &["2.0-20240101.000000-1"])];
        let first = MetadataDocument::derive("g", "a", &before, None);
        let again = MetadataDocument::derive("g", "a", &before, Some(&first));
        assert_eq!(first, again);

        // A client restarted its numbering; the build number must not go back.
        let previous = first.clone().with_snapshot("2.0-SNAPSHOT", "20240101.000000", 7);
        let after = [directory("2.0-SNAPSHOT", &["2.0-20240101.000000-1", "2.0-20240102.000000-1"])];
        let doc = MetadataDocument::derive("g", "a", &after, Some(&previous));
        let block = &doc.snapshots["2.0-SNAPSHOT"];
        assert_eq!((block.timestamp.as_str(), block.build_number), ("20240102.000000", 8));
    }

    #[test]
    fn test_merge_example() {
        let mut current = MetadataDocument::new("org.carlspring.strongbox", "strongbox-metadata-merge")
            .with_versions(["2.0-20240101.000000-1"])
            .with_latest("2.0-20240101.000000-1")
            .with_last_updated("20240101000000");
        let fragment = MetadataDocument::new("org.carlspring.strongbox", "strongbox-metadata-merge")
            .with_versions(["1.0-SNAPSHOT", "1.3-SNAPSHOT"])
            .with_latest("1.3-SNAPSHOT");
        current.merge(&fragment, datetime!(2024-06-01 12:00 UTC));
        assert_eq!(current.versions.len(), 3);
        assert_eq!(current.latest.as_deref(), Some("1.3-SNAPSHOT"));
        assert_eq!(current.last_updated.as_deref(), Some("20240601120000"));
    }

    #[test]
    fn test_merge_older_fragment_keeps_pointers() {
        let mut current = MetadataDocument::new("g", "a")
            .with_versions(["1.0", "1.1"])
            .with_release("1.1")
            .with_latest("1.1")
            .with_last_updated("20240601000000");
        let fragment = MetadataDocument::new("g", "a")
            .with_versions(["0.9"])
            .with_release("0.9")
            .with_latest("0.9")
            .with_snapshot("0.9-SNAPSHOT", "20230101.000000", 4)
            .with_last_updated("20230101000000");
        current.merge(&fragment, datetime!(2024-06-02 00:00 UTC));
        assert_eq!(current.versions, vec!["0.9", "1.0", "1.1"]);
        assert_eq!(current.latest.as_deref(), Some("1.1"));
        assert_eq!(current.release.as_deref(), Some("1.1"));
        // Snapshot blocks are replaced regardless of age
        assert_eq!(current.snapshots["0.9-SNAPSHOT"].build_number, 4);
        assert_eq!(current.last_updated.as_deref(), Some("20240601000000"));
    }

    #[test]
    fn test_merge_version_union_is_commutative() {
        let base = MetadataDocument::new("g", "a").with_versions(["1.0"]);
        let a = MetadataDocument::new("g", "a").with_versions(["1.1", "2.0-SNAPSHOT"]).with_latest("2.0-SNAPSHOT");
        let b = MetadataDocument::new("g", "a").with_versions(["1.1", "1.2"]).with_latest("1.2");
        let now = datetime!(2024-06-02 00:00 UTC);

        let mut ab = base.clone();
        ab.merge(&a, now);
        ab.merge(&b, now);
        let mut ba = base.clone();
        ba.merge(&b, now);
        ba.merge(&a, now);
        assert_eq!(ab.versions, ba.versions);
        assert_eq!(ab.versions, vec!["1.0", "1.1", "1.2", "2.0-SNAPSHOT"]);
        // Last writer wins for the pointer
        assert_eq!(ab.latest.as_deref(), Some("1.2"));
        assert_eq!(ba.latest.as_deref(), Some("2.0-SNAPSHOT"));
    }

    #[test]
    fn test_merge_over_garbled_stored_stamp() {
        let mut current = MetadataDocument::new("g", "a").with_versions(["1.5"]).with_latest("1.5").with_last_updated("9");
        let fragment = MetadataDocument::new("g", "a")
            .with_versions(["2.0"])
            .with_latest("2.0")
            .with_last_updated("20250101000000");
        current.merge(&fragment, datetime!(2025-06-01 00:00 UTC));
        assert_eq!(current.latest.as_deref(), Some("2.0"));
        assert_eq!(current.last_updated.as_deref(), Some("20250101000000"));
    }

    #[rstest::rstest]
    #[case("20240101000000", true)]
    #[case("20240229235959", true)]
    #[case("9", false)]
    #[case("20241301000000", false)]
    #[case("20240101.000000", false)]
    fn test_is_last_updated(#[case] stamp: &str, #[case] valid: bool) {
        assert_eq!(is_last_updated(stamp), valid);
    }

    #[rstest::rstest]
    #[case("20240101.000000", true)]
    #[case("20240101000000", false)]
    #[case("2024", false)]
    fn test_is_snapshot_timestamp(#[case] stamp: &str, #[case] valid: bool) {
        assert_eq!(is_snapshot_timestamp(stamp), valid);
    }

    #[test]
    fn test_merge_rejects_snapshot_release() {
        let mut current = MetadataDocument::new("g", "a").with_versions(["1.0"]).with_release("1.0");
        let fragment = MetadataDocument::new("g", "a").with_versions(["1.1-SNAPSHOT"]).with_release("1.1-SNAPSHOT");
        current.merge(&fragment, datetime!(2024-06-02 00:00 UTC));
        assert_eq!(current.release.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_json_round_trip_is_stable() {
        let doc = MetadataDocument::new("org.acme", "widget")
            .with_versions(["1.0", "2.0-SNAPSHOT"])
            .with_release("1.0")
            .with_latest("2.0-SNAPSHOT")
            .with_snapshot("2.0-SNAPSHOT", "20240101.000000", 2)
            .with_last_updated("20240101000000");
        let bytes = doc.to_json().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"build_number\": 2"));
        let parsed = MetadataDocument::from_json(&bytes).unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.to_json().unwrap(), bytes);
        assert!(MetadataDocument::from_json(b"{\"versions\": [").is_err());
    }
}
