//! causeway - Causal artifact graph and work injection
//!
//! Tracks units of engineering work ("artifacts") as nodes in a causal DAG
//! and hands validated artifacts to a work pool for execution by agents.
//!
//! # Architecture
//!
//! - Artifacts name their causal predecessors in `created_after`
//! - Ordering is a deterministic topological sort, listed newest first
//! - Artifacts owned by other repositories are resolved on demand and
//!   marked external
//! - Injection validates an artifact and creates a work unit; the pool
//!   journal is append-only and guarded by a file lock
//!
//! # Modules
//!
//! - `domain`: Data structures (Artifact, statuses, WorkUnit, pool events)
//! - `store`: Artifact store traits plus file and in-memory stores
//! - `core`: Graph, index, resolver, validator and orchestrator
//! - `pool`: Work pool trait and JSONL journal
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Inject a chunk
//! causeway inject auth_tokens
//!
//! # List chunks newest first
//! causeway list chunks
//!
//! # Drive the work unit
//! causeway dispatch <unit-id> --agent agent-1
//! causeway complete <unit-id>
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod pool;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{ArtifactIndex, CoreError, CrossRepoResolver, Orchestrator, RemoteRepo};
pub use domain::{Artifact, ArtifactKind, ArtifactStatus, RemoteLocator, WorkUnit, WorkUnitState};
pub use pool::{JournalPool, WorkPool};
pub use store::{ArtifactStore, ContentSource, FileStore, MemoryStore};
