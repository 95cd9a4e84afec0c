use crate::error::{Error, ErrorKind, Result};
use crate::version::Version;
use exn::ResultExt;
use std::fmt;
use std::str::FromStr;

const DEFAULT_EXTENSION: &str = "jar";

/// Identifies one stored artifact file.
///
/// Written as `group:artifact:version[:classifier]:extension`. The short
/// `group:artifact:version` form means a `jar` without classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Version,
    pub classifier: Option<String>,
    pub extension: String,
}

impl Coordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: Version,
        classifier: Option<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let coordinate = Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version,
            classifier: classifier.filter(|c| !c.is_empty()),
            extension: extension.into(),
        };
        coordinate.check()?;
        Ok(coordinate)
    }

    /// Same group, artifact and version as `self`, with a different file type.
    pub fn sibling(&self, classifier: Option<&str>, extension: &str) -> Self {
        Self {
            classifier: classifier.map(str::to_string),
            extension: extension.to_string(),
            ..self.clone()
        }
    }

    /// `group:artifact`, the key metadata documents are filed under.
    pub fn ga(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    fn check(&self) -> Result<()> {
        let group_ok = !self.group_id.is_empty() && self.group_id.split('.').all(is_segment);
        let fields_ok = [self.artifact_id.as_str(), self.extension.as_str()].into_iter().all(is_segment)
            && self.classifier.as_deref().is_none_or(is_segment);
        if !group_ok || !fields_ok {
            exn::bail!(ErrorKind::InvalidCoordinate(self.to_string()));
        }
        Ok(())
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', ':', '\0'])
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        write!(f, ":{}", self.extension)
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (group, artifact, version, classifier, extension) = match parts.as_slice() {
            [g, a, v] => (*g, *a, *v, None, DEFAULT_EXTENSION),
            [g, a, v, e] => (*g, *a, *v, None, *e),
            [g, a, v, c, e] => (*g, *a, *v, Some(c.to_string()), *e),
            _ => exn::bail!(ErrorKind::InvalidCoordinate(s.to_string())),
        };
        let version = Version::parse(version).or_raise(|| ErrorKind::InvalidCoordinate(s.to_string()))?;
        Self::new(group, artifact, version, classifier, extension)
    }
}
