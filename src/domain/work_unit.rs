//! Work units and their lifecycle.
//!
//! A work unit is the dispatchable record for one injection of one artifact.
//! Units move `Queued -> Dispatched -> {Completed | Failed}` and are never
//! revived: retrying a failed artifact means injecting a new unit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::artifact::{Artifact, ArtifactKind};

/// A dispatchable unit of work for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Unique identifier for this unit
    pub id: Uuid,

    /// The artifact this unit executes
    pub artifact_id: String,

    /// Kind of the artifact
    pub kind: ArtifactKind,

    /// Whether the artifact is owned by another repository
    #[serde(default)]
    pub external: bool,

    /// Current lifecycle state
    pub state: WorkUnitState,

    /// Agent the unit was dispatched to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,

    /// 1 for the first unit of an artifact, incremented per retry.
    /// Assigned by the pool on enqueue.
    pub attempt: u32,

    pub queued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,

    /// When the unit reached Completed or Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Failure reason (only for Failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkUnit {
    /// Create a fresh Queued unit for an artifact
    pub fn queued(artifact: &Artifact) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_id: artifact.id.clone(),
            kind: artifact.kind,
            external: artifact.is_external(),
            state: WorkUnitState::Queued,
            assigned_agent: None,
            attempt: 1,
            queued_at: Utc::now(),
            dispatched_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Check whether this unit belongs to the given artifact
    pub fn is_for(&self, kind: ArtifactKind, artifact_id: &str) -> bool {
        self.kind == kind && self.artifact_id == artifact_id
    }

    /// Apply a transition at the given time
    pub fn apply(
        &mut self,
        transition: &Transition,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let to = transition.target_state();
        if !self.state.can_transition_to(to) {
            return Err(InvalidTransition {
                unit_id: self.id,
                from: self.state,
                to,
            });
        }

        match transition {
            Transition::Dispatch { agent } => {
                self.dispatched_at = Some(at);
                if agent.is_some() {
                    self.assigned_agent = agent.clone();
                }
            }
            Transition::Complete => {
                self.finished_at = Some(at);
            }
            Transition::Fail { reason } => {
                self.finished_at = Some(at);
                self.error = Some(reason.clone());
            }
        }
        self.state = to;

        Ok(())
    }
}

/// Lifecycle state of a work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitState {
    Queued,
    Dispatched,
    Completed,
    Failed,
}

impl WorkUnitState {
    /// Queued or Dispatched: the artifact is still in flight
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Queued | Self::Dispatched)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    pub fn can_transition_to(&self, next: WorkUnitState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Dispatched)
                | (Self::Dispatched, Self::Completed)
                | (Self::Dispatched, Self::Failed)
        )
    }
}

impl fmt::Display for WorkUnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A requested state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "to")]
pub enum Transition {
    Dispatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
    },
    Complete,
    Fail { reason: String },
}

impl Transition {
    pub fn target_state(&self) -> WorkUnitState {
        match self {
            Self::Dispatch { .. } => WorkUnitState::Dispatched,
            Self::Complete => WorkUnitState::Completed,
            Self::Fail { .. } => WorkUnitState::Failed,
        }
    }
}

/// Transition not allowed by the unit state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for work unit {unit_id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub unit_id: Uuid,
    pub from: WorkUnitState,
    pub to: WorkUnitState,
}
