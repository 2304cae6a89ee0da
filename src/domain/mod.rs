//! Domain types for the causeway orchestrator.
//!
//! This module contains the core data structures:
//! - Artifact: Tracked units of work and their causal edges
//! - Status: Kind-specific lifecycles
//! - WorkUnit: Dispatchable records created by injection
//! - Events: Work pool journal entries

pub mod artifact;
pub mod events;
pub mod status;
pub mod work_unit;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactKind, RemoteLocator, Source};
pub use events::{PoolChange, PoolEvent};
pub use status::{
    ArtifactStatus, ChunkStatus, InvalidStatus, InvestigationStatus, NarrativeStatus,
    SubsystemStatus,
};
pub use work_unit::{InvalidTransition, Transition, WorkUnit, WorkUnitState};
