use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Marker appended to the base version of a mutable snapshot.
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";
/// Name of the per-GA metadata document.
pub const METADATA_FILE_NAME: &str = "maven-metadata.json";
/// Sidecar suffixes that never denote an artifact of their own.
pub const AUXILIARY_SUFFIXES: &[&str] = &["md5", "sha1", "sha256", "sha512", "blake3", "asc"];

// `<base>-<yyyyMMdd.HHmmss>-<buildNumber>` as a complete version string.
regex!(TIMESTAMPED_VERSION_REGEX, r"^(.+)-(\d{8}\.\d{6})-(\d+)$");
// The same, anchored at the start of a filename remainder (after `<artifactId>-<base>-`).
regex!(TIMESTAMP_PREFIX_REGEX, r"^(\d{8}\.\d{6})-(\d+)");
