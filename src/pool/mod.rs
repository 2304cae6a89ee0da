//! Work pool interface.
//!
//! The pool owns work units once they are enqueued. Enqueue is a conditional
//! insert keyed by artifact: it fails closed while a live unit exists.

pub mod journal;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{ArtifactKind, InvalidTransition, Transition, WorkUnit};

pub use journal::JournalPool;

/// Errors that can occur in the work pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Artifact '{artifact_id}' already has live work unit {existing}")]
    Conflict { artifact_id: String, existing: Uuid },

    #[error("Work unit not found: {0}")]
    UnknownUnit(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pool worker failed: {0}")]
    Worker(String),
}

/// Storage and state machine for work units
#[async_trait]
pub trait WorkPool: Send + Sync {
    /// Insert a Queued unit unless its artifact already has a live one
    async fn enqueue(&self, unit: WorkUnit) -> Result<Uuid, PoolError>;

    /// Move a unit along its state machine
    async fn transition(&self, id: Uuid, transition: Transition) -> Result<WorkUnit, PoolError>;

    async fn get(&self, id: Uuid) -> Result<Option<WorkUnit>, PoolError>;

    /// Every unit ever created for an artifact, oldest first
    async fn history(&self, kind: ArtifactKind, artifact_id: &str)
        -> Result<Vec<WorkUnit>, PoolError>;

    /// All units, oldest first
    async fn list(&self) -> Result<Vec<WorkUnit>, PoolError>;

    /// The live (Queued/Dispatched) unit for an artifact, if any
    async fn live_for(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Option<WorkUnit>, PoolError> {
        Ok(self
            .history(kind, artifact_id)
            .await?
            .into_iter()
            .find(|u| u.state.is_live()))
    }
}
