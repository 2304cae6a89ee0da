//! Error taxonomy for the core.
//!
//! Nothing here is retried inside the core. Callers decide which kinds are
//! worth retrying (usually only `StoreUnavailable`).

use thiserror::Error;
use uuid::Uuid;

use crate::domain::{ArtifactKind, InvalidTransition};
use crate::pool::PoolError;
use crate::store::StoreError;

use super::validator::ValidationIssue;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} '{id}' not found in any consulted scope")]
    NotFound { kind: ArtifactKind, id: String },

    #[error("'{child}' was created after '{missing_parent}', which does not resolve")]
    DanglingReference {
        child: String,
        missing_parent: String,
    },

    #[error("Causal cycle detected: {}", nodes.join(" -> "))]
    CycleDetected { nodes: Vec<String> },

    #[error("'{id}' is not injectable ({} issue(s))", issues.len())]
    ValidationRejected {
        id: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("'{artifact_id}' already has live work unit {unit_id}")]
    AlreadyInjected { artifact_id: String, unit_id: Uuid },

    #[error("Could not resolve '{id}' in any remote repository: {reason}")]
    UnresolvedReference { id: String, reason: String },

    #[error("Artifact store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Bad data in one record; retrying cannot help
    #[error("Malformed {kind} record '{id}': {reason}")]
    MalformedRecord {
        kind: ArtifactKind,
        id: String,
        reason: String,
    },

    #[error("No {kind} artifacts match the query")]
    EmptySet { kind: ArtifactKind },

    #[error("Invalid subsystem pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("Work unit {0} not found")]
    UnknownWorkUnit(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Work pool error: {0}")]
    Pool(#[source] PoolError),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Malformed { kind, id, reason, .. } => {
                Self::MalformedRecord { kind, id, reason }
            }
            other => Self::StoreUnavailable(other),
        }
    }
}

impl From<PoolError> for CoreError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Conflict {
                artifact_id,
                existing,
            } => Self::AlreadyInjected {
                artifact_id,
                unit_id: existing,
            },
            PoolError::UnknownUnit(id) => Self::UnknownWorkUnit(id),
            PoolError::InvalidTransition(t) => Self::InvalidTransition(t),
            other => Self::Pool(other),
        }
    }
}
