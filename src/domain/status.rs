//! Kind-specific artifact statuses.
//!
//! Each artifact kind has its own lifecycle. Validation only cares about two
//! questions per status: does it demand a substantive plan, and is it terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::artifact::ArtifactKind;

/// Status string did not match any status of the artifact's kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} status: {value}")]
pub struct InvalidStatus {
    pub kind: ArtifactKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    /// Not yet planned; an empty plan is allowed
    Future,
    Implementing,
    Active,
    Superseded,
    Historical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NarrativeStatus {
    Drafting,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationStatus {
    Ongoing,
    Solved,
    Noted,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubsystemStatus {
    Discovering,
    Documented,
    Refactoring,
    Stable,
    Deprecated,
}

/// Status of an artifact, tagged by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Chunk(ChunkStatus),
    Narrative(NarrativeStatus),
    Investigation(InvestigationStatus),
    Subsystem(SubsystemStatus),
}

impl ArtifactStatus {
    /// Parse a wire status (e.g. "ACTIVE") for the given kind
    pub fn parse(kind: ArtifactKind, value: &str) -> Result<Self, InvalidStatus> {
        let normalized = value.trim().to_ascii_uppercase();
        let invalid = || InvalidStatus {
            kind,
            value: value.to_string(),
        };

        let status = match kind {
            ArtifactKind::Chunk => Self::Chunk(match normalized.as_str() {
                "FUTURE" => ChunkStatus::Future,
                "IMPLEMENTING" => ChunkStatus::Implementing,
                "ACTIVE" => ChunkStatus::Active,
                "SUPERSEDED" => ChunkStatus::Superseded,
                "HISTORICAL" => ChunkStatus::Historical,
                _ => return Err(invalid()),
            }),
            ArtifactKind::Narrative => Self::Narrative(match normalized.as_str() {
                "DRAFTING" => NarrativeStatus::Drafting,
                "ACTIVE" => NarrativeStatus::Active,
                "COMPLETED" => NarrativeStatus::Completed,
                _ => return Err(invalid()),
            }),
            ArtifactKind::Investigation => Self::Investigation(match normalized.as_str() {
                "ONGOING" => InvestigationStatus::Ongoing,
                "SOLVED" => InvestigationStatus::Solved,
                "NOTED" => InvestigationStatus::Noted,
                "DEFERRED" => InvestigationStatus::Deferred,
                _ => return Err(invalid()),
            }),
            ArtifactKind::Subsystem => Self::Subsystem(match normalized.as_str() {
                "DISCOVERING" => SubsystemStatus::Discovering,
                "DOCUMENTED" => SubsystemStatus::Documented,
                "REFACTORING" => SubsystemStatus::Refactoring,
                "STABLE" => SubsystemStatus::Stable,
                "DEPRECATED" => SubsystemStatus::Deprecated,
                _ => return Err(invalid()),
            }),
        };

        Ok(status)
    }

    /// The kind this status belongs to
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Chunk(_) => ArtifactKind::Chunk,
            Self::Narrative(_) => ArtifactKind::Narrative,
            Self::Investigation(_) => ArtifactKind::Investigation,
            Self::Subsystem(_) => ArtifactKind::Subsystem,
        }
    }

    /// Wire representation (upper-case)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunk(s) => match s {
                ChunkStatus::Future => "FUTURE",
                ChunkStatus::Implementing => "IMPLEMENTING",
                ChunkStatus::Active => "ACTIVE",
                ChunkStatus::Superseded => "SUPERSEDED",
                ChunkStatus::Historical => "HISTORICAL",
            },
            Self::Narrative(s) => match s {
                NarrativeStatus::Drafting => "DRAFTING",
                NarrativeStatus::Active => "ACTIVE",
                NarrativeStatus::Completed => "COMPLETED",
            },
            Self::Investigation(s) => match s {
                InvestigationStatus::Ongoing => "ONGOING",
                InvestigationStatus::Solved => "SOLVED",
                InvestigationStatus::Noted => "NOTED",
                InvestigationStatus::Deferred => "DEFERRED",
            },
            Self::Subsystem(s) => match s {
                SubsystemStatus::Discovering => "DISCOVERING",
                SubsystemStatus::Documented => "DOCUMENTED",
                SubsystemStatus::Refactoring => "REFACTORING",
                SubsystemStatus::Stable => "STABLE",
                SubsystemStatus::Deprecated => "DEPRECATED",
            },
        }
    }

    /// Work in this status must be backed by a substantive plan
    pub fn requires_plan(&self) -> bool {
        matches!(
            self,
            Self::Chunk(ChunkStatus::Implementing | ChunkStatus::Active)
                | Self::Narrative(NarrativeStatus::Active)
                | Self::Investigation(InvestigationStatus::Ongoing)
                | Self::Subsystem(SubsystemStatus::Refactoring)
        )
    }

    /// No further work can be injected for this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Chunk(ChunkStatus::Superseded | ChunkStatus::Historical)
                | Self::Narrative(NarrativeStatus::Completed)
                | Self::Investigation(
                    InvestigationStatus::Solved
                        | InvestigationStatus::Noted
                        | InvestigationStatus::Deferred
                )
                | Self::Subsystem(SubsystemStatus::Deprecated)
        )
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ChunkStatus> for ArtifactStatus {
    fn from(s: ChunkStatus) -> Self {
        Self::Chunk(s)
    }
}

impl From<NarrativeStatus> for ArtifactStatus {
    fn from(s: NarrativeStatus) -> Self {
        Self::Narrative(s)
    }
}

impl From<InvestigationStatus> for ArtifactStatus {
    fn from(s: InvestigationStatus) -> Self {
        Self::Investigation(s)
    }
}

impl From<SubsystemStatus> for ArtifactStatus {
    fn from(s: SubsystemStatus) -> Self {
        Self::Subsystem(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_wire_names() {
        for kind in ArtifactKind::ALL {
            for name in [
                "FUTURE", "IMPLEMENTING", "ACTIVE", "SUPERSEDED", "HISTORICAL", "DRAFTING",
                "COMPLETED", "ONGOING", "SOLVED", "NOTED", "DEFERRED", "DISCOVERING",
                "DOCUMENTED", "REFACTORING", "STABLE", "DEPRECATED",
            ] {
                if let Ok(status) = ArtifactStatus::parse(kind, name) {
                    assert_eq!(status.as_str(), name);
                    assert_eq!(status.kind(), kind);
                }
            }
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let status = ArtifactStatus::parse(ArtifactKind::Chunk, " active ").unwrap();
        assert_eq!(status, ArtifactStatus::Chunk(ChunkStatus::Active));
    }

    #[test]
    fn test_parse_rejects_other_kinds_status() {
        let err = ArtifactStatus::parse(ArtifactKind::Chunk, "SOLVED").unwrap_err();
        assert_eq!(err.kind, ArtifactKind::Chunk);
        assert_eq!(err.to_string(), "invalid chunk status: SOLVED");
    }

    #[test]
    fn test_chunk_status_classes() {
        let future: ArtifactStatus = ChunkStatus::Future.into();
        let active: ArtifactStatus = ChunkStatus::Active.into();
        let historical: ArtifactStatus = ChunkStatus::Historical.into();

        assert!(!future.requires_plan() && !future.is_terminal());
        assert!(active.requires_plan() && !active.is_terminal());
        assert!(!historical.requires_plan() && historical.is_terminal());
    }
}
