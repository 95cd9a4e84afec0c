//! Version parsing and ordering.
//!
//! Release versions are immutable. Snapshot versions come in two spellings:
//! the nominal `<base>-SNAPSHOT` used for directories and metadata, and the
//! timestamped `<base>-<yyyyMMdd.HHmmss>-<buildNumber>` that each deployed
//! snapshot file actually carries.

use crate::consts::{SNAPSHOT_SUFFIX, TIMESTAMPED_VERSION_REGEX};
use crate::error::{Error, ErrorKind};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// What kind of version a [`Version`] string denotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionKind {
    Release,
    /// `<base>-SNAPSHOT`
    Snapshot,
    /// `<base>-<timestamp>-<buildNumber>`
    Timestamped { timestamp: String, build_number: u32 },
}

/// A parsed version string.
///
/// Equality is textual. Ordering follows the version comparator (see the
/// [`Ord`] implementation) and falls back to the text to stay total.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    raw: String,
    kind: VersionKind,
}

impl Version {
    /// Parse a version string. Any non-empty string without path separators
    /// is a version; the snapshot spellings are recognized by their shape.
    pub fn parse(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if raw.trim().is_empty() || raw.contains(['/', '\\', ':']) {
            exn::bail!(ErrorKind::InvalidVersion(raw));
        }
        let kind = if raw.ends_with(SNAPSHOT_SUFFIX) && raw.len() > SNAPSHOT_SUFFIX.len() {
            VersionKind::Snapshot
        } else if let Some(captures) = TIMESTAMPED_VERSION_REGEX.captures(&raw)
            && let Ok(build_number) = captures[3].parse::<u32>()
        {
            VersionKind::Timestamped {
                timestamp: captures[2].to_string(),
                build_number,
            }
        } else {
            VersionKind::Release
        };
        Ok(Self { raw, kind })
    }

    /// Build the timestamped spelling of a snapshot of `base` (without the
    /// `-SNAPSHOT` marker).
    pub fn timestamped(base: &str, timestamp: &str, build_number: u32) -> Self {
        Self {
            raw: format!("{base}-{timestamp}-{build_number}"),
            kind: VersionKind::Timestamped {
                timestamp: timestamp.to_string(),
                build_number,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &VersionKind {
        &self.kind
    }

    pub fn is_snapshot(&self) -> bool {
        !matches!(self.kind, VersionKind::Release)
    }

    /// Version without any snapshot marker or timestamp: `2.0` for both
    /// `2.0-SNAPSHOT` and `2.0-20240101.000000-1`.
    pub fn release_part(&self) -> &str {
        match &self.kind {
            VersionKind::Release => &self.raw,
            VersionKind::Snapshot => &self.raw[..self.raw.len() - SNAPSHOT_SUFFIX.len()],
            // <base>-<timestamp>-<buildNumber>, and the base may contain '-'
            VersionKind::Timestamped { .. } => self.raw.rsplitn(3, '-').nth(2).unwrap_or(&self.raw),
        }
    }

    /// The version a snapshot is filed under: `2.0-SNAPSHOT` for
    /// `2.0-20240101.000000-1`. Releases and nominal snapshots return
    /// themselves.
    pub fn base_version(&self) -> Version {
        match &self.kind {
            VersionKind::Timestamped { .. } => Self {
                raw: format!("{}{SNAPSHOT_SUFFIX}", self.release_part()),
                kind: VersionKind::Snapshot,
            },
            _ => self.clone(),
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match &self.kind {
            VersionKind::Timestamped { timestamp, .. } => Some(timestamp),
            _ => None,
        }
    }

    pub fn build_number(&self) -> Option<u32> {
        match &self.kind {
            VersionKind::Timestamped { build_number, .. } => Some(*build_number),
            _ => None,
        }
    }

    fn recency_rank(&self) -> (u8, &str, u32) {
        match &self.kind {
            VersionKind::Snapshot => (0, "", 0),
            VersionKind::Timestamped { timestamp, build_number } => (1, timestamp, *build_number),
            VersionKind::Release => (2, "", 0),
        }
    }
}

impl FromStr for Version {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Ord for Version {
    /// Snapshots compare by their base version first, then sit below the
    /// release of that base. Snapshots of the same base compare by recency:
    /// the nominal `-SNAPSHOT` spelling first, then timestamp, then build
    /// number.
    fn cmp(&self, other: &Self) -> Ordering {
        compare_tokens(self.release_part(), other.release_part())
            .then_with(|| self.recency_rank().cmp(&other.recency_rank()))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}
impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Digits with leading zeros stripped, compared by length then text so
    /// that arbitrarily long segments never overflow.
    Number(String),
    Qualifier(String),
}

impl Token {
    fn number(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Self::Number(trimmed.to_string())
    }

    fn qualifier(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        let canonical = match lower.as_str() {
            "a" => "alpha",
            "b" => "beta",
            "m" => "milestone",
            "cr" => "rc",
            "ga" | "final" | "release" => "",
            other => other,
        };
        Self::Qualifier(canonical.to_string())
    }

    fn is_null(&self) -> bool {
        match self {
            Self::Number(n) => n.is_empty(),
            Self::Qualifier(q) => q.is_empty(),
        }
    }
}

/// Rank of well-known qualifiers; unknown qualifiers sort after all of them.
fn qualifier_rank(qualifier: &str) -> usize {
    const KNOWN: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];
    KNOWN.iter().position(|known| *known == qualifier).unwrap_or(KNOWN.len())
}

fn tokenize(version: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for segment in version.split(['.', '-', '_']) {
        let mut start = 0;
        let bytes = segment.as_bytes();
        for i in 1..=bytes.len() {
            let boundary = i == bytes.len() || bytes[i].is_ascii_digit() != bytes[i - 1].is_ascii_digit();
            if boundary {
                let part = &segment[start..i];
                tokens.push(match part.as_bytes()[0].is_ascii_digit() {
                    true => Token::number(part),
                    false => Token::qualifier(part),
                });
                start = i;
            }
        }
        if segment.is_empty() {
            tokens.push(Token::Qualifier(String::new()));
        }
    }
    // "1.0.0" == "1.0" == "1", "1.0-final" == "1.0"
    while tokens.last().is_some_and(Token::is_null) {
        tokens.pop();
    }
    tokens
}

fn compare_token(a: &Token, b: &Token) -> Ordering {
    match (a, b) {
        (Token::Number(x), Token::Number(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        (Token::Qualifier(x), Token::Qualifier(y)) => {
            qualifier_rank(x).cmp(&qualifier_rank(y)).then_with(|| x.cmp(y))
        },
        // 1.0.1 > 1.0-rc: numbers outrank qualifiers
        (Token::Number(_), Token::Qualifier(_)) => Ordering::Greater,
        (Token::Qualifier(_), Token::Number(_)) => Ordering::Less,
    }
}

/// Maven-style comparison of two plain version strings.
pub(crate) fn compare_tokens(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);
    for i in 0..left.len().max(right.len()) {
        let ordering = match (left.get(i), right.get(i)) {
            (Some(x), Some(y)) => compare_token(x, y),
            // Missing tokens act like "0" against numbers and like a plain
            // release against qualifiers.
            (Some(x), None) => compare_token(x, &padding_for(x)),
            (None, Some(y)) => compare_token(&padding_for(y), y),
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn padding_for(token: &Token) -> Token {
    match token {
        Token::Number(_) => Token::Number(String::new()),
        Token::Qualifier(_) => Token::Qualifier(String::new()),
    }
}
