//! Artifact store interfaces.
//!
//! Stores persist artifact records wherever they live. The core only ever
//! talks to these traits; a store load is treated as a snapshot.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Artifact, ArtifactKind, RemoteLocator};

pub use file::FileStore;
pub use memory::MemoryStore;

/// A local stand-in for an artifact owned by another repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    pub id: String,
    pub kind: ArtifactKind,
    pub locator: RemoteLocator,

    /// Edges the home repository declares for this artifact
    #[serde(default)]
    pub created_after: Vec<String>,
}

/// One record as returned by a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEntry {
    /// Full record owned by this store
    Local(Artifact),

    /// Pointer to a record owned elsewhere
    External(ExternalRef),

    /// A record that exists but could not be parsed. Only returned by
    /// `list`, so one bad record does not hide the rest of the kind.
    Malformed { id: String, reason: String },
}

impl StoreEntry {
    pub fn id(&self) -> &str {
        match self {
            Self::Local(a) => &a.id,
            Self::External(r) => &r.id,
            Self::Malformed { id, .. } => id,
        }
    }
}

/// Summary of rendered content, supplied by the content layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentSummary {
    pub has_substantive_plan: bool,
}

impl ContentSummary {
    pub fn with_plan(has_substantive_plan: bool) -> Self {
        Self {
            has_substantive_plan,
        }
    }
}

/// Errors raised by artifact stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store '{store}' unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    #[error("Malformed record {kind}/{id} in '{store}': {reason}")]
    Malformed {
        store: String,
        kind: ArtifactKind,
        id: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read access to artifact records
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Human-readable store name (usually the repository)
    fn name(&self) -> &str;

    /// All records of a kind; unparseable records come back as `Malformed`
    async fn list(&self, kind: ArtifactKind) -> Result<Vec<StoreEntry>, StoreError>;

    /// One record, if present. Ids that are not a single plain name are
    /// never present.
    async fn get(&self, kind: ArtifactKind, id: &str) -> Result<Option<StoreEntry>, StoreError>;
}

/// Supplies content summaries for validation
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn summarize(&self, artifact: &Artifact) -> Result<ContentSummary, StoreError>;
}
