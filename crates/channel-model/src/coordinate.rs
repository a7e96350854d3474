//! Maven coordinates

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Wildcard accepted in place of a groupId or artifactId.
pub const WILDCARD: &str = "*";

/// A `groupId:artifactId[:version]` reference to a published document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MavenCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MavenCoordinate {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: None,
        }
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Parse `groupId:artifactId` or `groupId:artifactId:version`.
    pub fn parse(value: &str) -> ModelResult<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        let invalid = |reason: &str| ModelError::InvalidCoordinate {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("empty segment"));
        }
        match parts.as_slice() {
            [g, a] => Ok(Self::new(*g, *a)),
            [g, a, v] => Ok(Self::new(*g, *a).with_version(*v)),
            _ => Err(invalid("expected groupId:artifactId[:version]")),
        }
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}:{}", self.group_id, self.artifact_id, v),
            None => write!(f, "{}:{}", self.group_id, self.artifact_id),
        }
    }
}

/// A fully specified artifact: group, artifact, extension, classifier and version.
///
/// An empty classifier means "no classifier".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub extension: String,
    pub classifier: String,
    pub version: String,
}

impl ArtifactCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        extension: impl Into<String>,
        classifier: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            extension: extension.into(),
            classifier: classifier.into(),
            version: version.into(),
        }
    }

    /// Coordinate of the detached signature published next to this artifact.
    pub fn signature(&self) -> Self {
        Self {
            extension: format!("{}.asc", self.extension),
            ..self.clone()
        }
    }

    /// Parse `groupId:artifactId[:extension[:classifier]]:version`.
    pub fn parse(value: &str) -> ModelResult<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        let (g, a, ext, cls, v) = match parts.as_slice() {
            [g, a, v] => (*g, *a, "jar", "", *v),
            [g, a, e, v] => (*g, *a, *e, "", *v),
            [g, a, e, c, v] => (*g, *a, *e, *c, *v),
            _ => {
                return Err(ModelError::InvalidCoordinate {
                    value: value.to_string(),
                    reason: "expected groupId:artifactId[:extension[:classifier]]:version"
                        .to_string(),
                })
            }
        };
        if g.is_empty() || a.is_empty() || v.is_empty() {
            return Err(ModelError::InvalidCoordinate {
                value: value.to_string(),
                reason: "groupId, artifactId and version are required".to_string(),
            });
        }
        Ok(Self::new(g, a, ext, cls, v))
    }

    /// Relative path of this artifact in a Maven repository layout.
    pub fn repository_path(&self) -> String {
        let mut file_name = format!("{}-{}", self.artifact_id, self.version);
        if !self.classifier.is_empty() {
            file_name.push('-');
            file_name.push_str(&self.classifier);
        }
        file_name.push('.');
        file_name.push_str(&self.extension);

        format!(
            "{}/{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            file_name
        )
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.extension)?;
        if !self.classifier.is_empty() {
            write!(f, ":{}", self.classifier)?;
        }
        write!(f, ":{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_maven_coordinate() {
        let c = MavenCoordinate::parse("org.example:core").unwrap();
        assert_eq!(c.group_id, "org.example");
        assert_eq!(c.artifact_id, "core");
        assert!(c.version.is_none());

        let c = MavenCoordinate::parse("org.example:core:1.0.0").unwrap();
        assert_eq!(c.version.as_deref(), Some("1.0.0"));
        assert_eq!(c.to_string(), "org.example:core:1.0.0");

        assert!(MavenCoordinate::parse("org.example").is_err());
        assert!(MavenCoordinate::parse("org.example::1.0").is_err());
    }

    #[test]
    fn test_parse_artifact_coordinate() {
        let c = ArtifactCoordinate::parse("org.example:lib:1.0").unwrap();
        assert_eq!(c.extension, "jar");
        assert_eq!(c.classifier, "");

        let c = ArtifactCoordinate::parse("org.example:lib:yaml:manifest:1.0").unwrap();
        assert_eq!(c.extension, "yaml");
        assert_eq!(c.classifier, "manifest");
        assert_eq!(c.to_string(), "org.example:lib:yaml:manifest:1.0");

        assert!(ArtifactCoordinate::parse("org.example:lib").is_err());
    }

    #[test]
    fn test_repository_path() {
        let c = ArtifactCoordinate::new("org.example.core", "lib", "jar", "", "1.2.5");
        assert_eq!(c.repository_path(), "org/example/core/lib/1.2.5/lib-1.2.5.jar");

        let c = ArtifactCoordinate::new("org.example", "channel", "yaml", "manifest", "2");
        assert_eq!(
            c.repository_path(),
            "org/example/channel/2/channel-2-manifest.yaml"
        );
    }

    #[test]
    fn test_signature_coordinate() {
        let c = ArtifactCoordinate::new("org.example", "lib", "jar", "", "1.0");
        let sig = c.signature();
        assert_eq!(sig.extension, "jar.asc");
        assert_eq!(sig.repository_path(), "org/example/lib/1.0/lib-1.0.jar.asc");
    }
}
