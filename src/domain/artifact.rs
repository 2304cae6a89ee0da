//! Artifacts tracked in the causal graph.
//!
//! An artifact is a unit of engineering work (chunk, subsystem, narrative,
//! investigation). Artifacts reference their causal predecessors through
//! `created_after`, which is what the index turns into a DAG.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::status::ArtifactStatus;

/// A tracked unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Identifier, unique within its kind and repository
    pub id: String,

    /// Which family of artifact this is
    pub kind: ArtifactKind,

    /// Kind-specific lifecycle status
    pub status: ArtifactStatus,

    /// Causal predecessors (ids of artifacts this one was created after)
    #[serde(default)]
    pub created_after: Vec<String>,

    /// Subsystems this artifact belongs to
    #[serde(default)]
    pub subsystems: Vec<String>,

    /// Where the authoritative record lives
    #[serde(default)]
    pub source: Source,
}

impl Artifact {
    /// Create a local artifact with no predecessors
    pub fn new(id: impl Into<String>, kind: ArtifactKind, status: ArtifactStatus) -> Self {
        Self {
            id: id.into(),
            kind,
            status,
            created_after: Vec::new(),
            subsystems: Vec::new(),
            source: Source::Local,
        }
    }

    /// Set the causal predecessors
    pub fn with_created_after<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.created_after = parents.into_iter().map(Into::into).collect();
        self
    }

    /// Set the subsystems this artifact belongs to
    pub fn with_subsystems<I, S>(mut self, subsystems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subsystems = subsystems.into_iter().map(Into::into).collect();
        self
    }

    /// Mark this artifact as owned by another repository
    pub fn into_external(mut self, locator: RemoteLocator) -> Self {
        self.source = Source::External(locator);
        self
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, Source::External(_))
    }

    pub fn remote_locator(&self) -> Option<&RemoteLocator> {
        match &self.source {
            Source::Local => None,
            Source::External(locator) => Some(locator),
        }
    }
}

/// Where an artifact's authoritative record lives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "origin")]
pub enum Source {
    /// Owned by the home repository
    #[default]
    Local,

    /// Owned by another repository
    External(RemoteLocator),
}

/// Coordinates for resolving an artifact in its owning repository.
///
/// Carries just enough to look up status and causal edges remotely.
/// Content is never fetched through a locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLocator {
    /// Owning repository (e.g. "acme/payments")
    pub repo: String,

    /// Branch or ref to follow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,

    /// Fixed revision, if pinned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<String>,
}

impl RemoteLocator {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            track: None,
            pinned: None,
        }
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repo)?;
        if let Some(ref track) = self.track {
            write!(f, "@{}", track)?;
        }
        if let Some(ref pinned) = self.pinned {
            write!(f, "#{}", pinned)?;
        }
        Ok(())
    }
}

/// Families of artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Chunk,
    Subsystem,
    Narrative,
    Investigation,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Chunk,
        ArtifactKind::Subsystem,
        ArtifactKind::Narrative,
        ArtifactKind::Investigation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Subsystem => "subsystem",
            Self::Narrative => "narrative",
            Self::Investigation => "investigation",
        }
    }

    /// Directory name used by file-backed stores
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Chunk => "chunks",
            Self::Subsystem => "subsystems",
            Self::Narrative => "narratives",
            Self::Investigation => "investigations",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower || k.plural() == lower)
            .ok_or_else(|| format!("unknown artifact kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::ChunkStatus;

    #[test]
    fn test_artifact_builder() {
        let artifact = Artifact::new("b", ArtifactKind::Chunk, ChunkStatus::Future.into())
            .with_created_after(["a"])
            .with_subsystems(["payments"]);

        assert_eq!(artifact.created_after, vec!["a".to_string()]);
        assert_eq!(artifact.subsystems, vec!["payments".to_string()]);
        assert!(!artifact.is_external());
        assert!(artifact.remote_locator().is_none());
    }

    #[test]
    fn test_external_marker() {
        let artifact = Artifact::new("x", ArtifactKind::Chunk, ChunkStatus::Active.into())
            .into_external(RemoteLocator::new("acme/payments"));

        assert!(artifact.is_external());
        assert_eq!(artifact.remote_locator().unwrap().repo, "acme/payments");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("chunk".parse::<ArtifactKind>().unwrap(), ArtifactKind::Chunk);
        assert_eq!("Narratives".parse::<ArtifactKind>().unwrap(), ArtifactKind::Narrative);
        assert!("epic".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_locator_display() {
        let mut locator = RemoteLocator::new("acme/payments");
        assert_eq!(locator.to_string(), "acme/payments");

        locator.track = Some("main".to_string());
        locator.pinned = Some("abc123".to_string());
        assert_eq!(locator.to_string(), "acme/payments@main#abc123");
    }
}
