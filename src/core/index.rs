//! Artifact index.
//!
//! Loads one kind from the home store, pulls external artifacts through the
//! resolver, and answers graph queries (causal order, tips, latest) over that
//! single snapshot. Nothing is cached between calls.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use glob::Pattern;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Artifact, ArtifactKind, RemoteLocator};
use crate::store::{ArtifactStore, StoreEntry};

use super::error::CoreError;
use super::graph::{self, CausalGraph, CausalNode, DanglingEdge};
use super::resolver::CrossRepoResolver;

/// An external artifact that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    pub id: String,
    pub kind: ArtifactKind,

    /// Where it was expected to live, when the home store said so
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<RemoteLocator>,

    /// Edges the home store declares for it
    pub created_after: Vec<String>,

    pub reason: String,
}

impl CausalNode for Unresolved {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn predecessors(&self) -> &[String] {
        &self.created_after
    }
}

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "entry")]
pub enum ListingEntry {
    Artifact(Artifact),
    Unresolvable(Unresolved),
}

impl ListingEntry {
    pub fn id(&self) -> &str {
        self.node_id()
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            Self::Unresolvable(_) => None,
        }
    }
}

impl CausalNode for ListingEntry {
    fn node_id(&self) -> &str {
        match self {
            Self::Artifact(a) => &a.id,
            Self::Unresolvable(u) => &u.id,
        }
    }

    fn predecessors(&self) -> &[String] {
        match self {
            Self::Artifact(a) => &a.created_after,
            Self::Unresolvable(u) => &u.created_after,
        }
    }
}

/// Snapshot of one kind, sorted by id
#[derive(Debug, Clone)]
pub struct LoadedSet {
    pub kind: ArtifactKind,
    pub entries: Vec<ListingEntry>,
}

impl LoadedSet {
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter().filter_map(ListingEntry::as_artifact)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Unresolved> {
        self.entries.iter().filter_map(|e| match e {
            ListingEntry::Unresolvable(u) => Some(u),
            ListingEntry::Artifact(_) => None,
        })
    }

    pub fn get(&self, id: &str) -> Option<&ListingEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Newest-first listing of one kind
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub kind: ArtifactKind,
    pub entries: Vec<ListingEntry>,
}

/// Graph queries over the home store plus whatever the resolver can reach
pub struct ArtifactIndex {
    home: Arc<dyn ArtifactStore>,
    resolver: Arc<CrossRepoResolver>,
}

impl ArtifactIndex {
    pub fn new(home: Arc<dyn ArtifactStore>, resolver: Arc<CrossRepoResolver>) -> Self {
        Self { home, resolver }
    }

    /// Load every record of a kind.
    ///
    /// External refs are resolved against their pinned repository. Parents
    /// named by loaded records but missing from the home store are looked up
    /// in the remotes once; pulled-in artifacts keep only the edges that land
    /// inside the snapshot. Anything a remote could not answer for becomes an
    /// `Unresolvable` entry, as does a home record that cannot be parsed. Ids
    /// no remote claims are left dangling.
    #[instrument(skip(self), fields(home = self.home.name()))]
    pub async fn load(&self, kind: ArtifactKind) -> Result<LoadedSet, CoreError> {
        let records = self.home.list(kind).await?;

        let mut entries = Vec::with_capacity(records.len());
        let mut refs = Vec::new();
        for record in records {
            match record {
                StoreEntry::Local(artifact) => entries.push(ListingEntry::Artifact(artifact)),
                StoreEntry::External(external) => refs.push(external),
                StoreEntry::Malformed { id, reason } => {
                    entries.push(ListingEntry::Unresolvable(Unresolved {
                        id,
                        kind,
                        locator: None,
                        created_after: Vec::new(),
                        reason: format!("malformed record: {}", reason),
                    }))
                }
            }
        }

        for (external, result) in self.resolver.resolve_refs(refs).await {
            match result {
                Ok(artifact) => entries.push(ListingEntry::Artifact(artifact)),
                Err(e) => {
                    warn!(id = %external.id, error = %e, "External artifact unresolvable");
                    entries.push(ListingEntry::Unresolvable(Unresolved {
                        id: external.id,
                        kind,
                        locator: Some(external.locator),
                        created_after: external.created_after,
                        reason: e.to_string(),
                    }));
                }
            }
        }

        let missing: Vec<String> = graph::dangling_edges(&entries)
            .into_iter()
            .map(|edge| edge.missing_parent)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !missing.is_empty() && self.resolver.has_remotes() {
            debug!(count = missing.len(), "Looking up parents outside the home store");

            let mut pulled = Vec::new();
            for (id, result) in self.resolver.resolve_ids(kind, missing).await {
                match result {
                    Ok(artifact) => pulled.push(artifact),
                    Err(CoreError::NotFound { .. }) => {}
                    Err(e) => {
                        warn!(%id, error = %e, "Parent unresolvable");
                        entries.push(ListingEntry::Unresolvable(Unresolved {
                            id,
                            kind,
                            locator: None,
                            created_after: Vec::new(),
                            reason: e.to_string(),
                        }));
                    }
                }
            }

            let known: HashSet<String> = entries
                .iter()
                .map(|e| e.id().to_string())
                .chain(pulled.iter().map(|a| a.id.clone()))
                .collect();
            for mut artifact in pulled {
                artifact.created_after.retain(|p| known.contains(p));
                entries.push(ListingEntry::Artifact(artifact));
            }
        }

        entries.sort_by(|a, b| a.id().cmp(b.id()));
        debug!(count = entries.len(), "Loaded snapshot");

        Ok(LoadedSet { kind, entries })
    }

    /// Newest-first listing; unresolvable externals appear as their own rows
    pub async fn listing(&self, kind: ArtifactKind) -> Result<Listing, CoreError> {
        let loaded = self.load(kind).await?;
        let graph = CausalGraph::build(&loaded.entries)?;

        let entries: Vec<ListingEntry> = graph.causal_order().into_iter().cloned().collect();
        info!(%kind, count = entries.len(), "Listed artifacts");

        Ok(Listing { kind, entries })
    }

    /// Newest-first order of the resolved artifacts of a kind
    pub async fn causal_order(&self, kind: ArtifactKind) -> Result<Vec<Artifact>, CoreError> {
        let listing = self.listing(kind).await?;
        Ok(listing
            .entries
            .into_iter()
            .filter_map(|e| match e {
                ListingEntry::Artifact(a) => Some(a),
                ListingEntry::Unresolvable(_) => None,
            })
            .collect())
    }

    /// Resolved artifacts that nothing in the snapshot names as a parent
    pub async fn tips(&self, kind: ArtifactKind) -> Result<Vec<Artifact>, CoreError> {
        let loaded = self.load(kind).await?;
        let graph = CausalGraph::build(&loaded.entries)?;

        Ok(graph
            .tips()
            .into_iter()
            .filter_map(ListingEntry::as_artifact)
            .cloned()
            .collect())
    }

    /// Tips among artifacts with a subsystem matching `pattern`
    pub async fn tips_for(
        &self,
        kind: ArtifactKind,
        pattern: &str,
    ) -> Result<Vec<Artifact>, CoreError> {
        let pattern = Pattern::new(pattern)?;
        let loaded = self.load(kind).await?;
        CausalGraph::build(&loaded.entries)?;

        let matching: Vec<&Artifact> = loaded
            .artifacts()
            .filter(|a| a.subsystems.iter().any(|s| pattern.matches(s)))
            .collect();

        Ok(graph::tips_of(&matching).into_iter().map(|a| (*a).clone()).collect())
    }

    /// First artifact in causal order
    pub async fn latest(&self, kind: ArtifactKind) -> Result<Artifact, CoreError> {
        self.causal_order(kind)
            .await?
            .into_iter()
            .next()
            .ok_or(CoreError::EmptySet { kind })
    }

    /// Every dangling edge in the snapshot, without failing
    pub async fn dangling_references(
        &self,
        kind: ArtifactKind,
    ) -> Result<Vec<DanglingEdge>, CoreError> {
        let loaded = self.load(kind).await?;
        Ok(graph::dangling_edges(&loaded.entries))
    }
}
