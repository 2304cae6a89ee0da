//! Core causal-graph and injection logic.
//!
//! This module contains:
//! - Graph: Causal DAG construction, ordering and tips
//! - Index: Snapshot loading and graph queries per kind
//! - Resolver: Cross-repository lookup of external artifacts
//! - Validator: Injectability rules
//! - Orchestrator: Injection flow and work unit lifecycle

pub mod error;
pub mod graph;
pub mod index;
pub mod orchestrator;
pub mod resolver;
pub mod validator;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::{dangling_edges, tips_of, CausalGraph, CausalNode, DanglingEdge};
pub use index::{ArtifactIndex, Listing, ListingEntry, LoadedSet, Unresolved};
pub use orchestrator::Orchestrator;
pub use resolver::{CrossRepoResolver, RemoteRepo};
pub use validator::{validate_injectable, IssueCode, ValidationIssue};
