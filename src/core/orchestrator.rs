//! Injection orchestrator.
//!
//! Turns a validated artifact into a Queued work unit, and drives the unit's
//! lifecycle through the work pool afterwards.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{Artifact, ArtifactKind, Transition, WorkUnit};
use crate::pool::WorkPool;
use crate::store::{ArtifactStore, ContentSource, ContentSummary};

use super::error::CoreError;
use super::graph::{CausalGraph, DanglingEdge};
use super::index::{ArtifactIndex, ListingEntry, LoadedSet};
use super::resolver::{CrossRepoResolver, RemoteRepo};
use super::validator::{validate_injectable, ValidationIssue};

/// Main injection orchestrator
pub struct Orchestrator {
    home: Arc<dyn ArtifactStore>,
    content: Arc<dyn ContentSource>,
    pool: Arc<dyn WorkPool>,
    remotes: Vec<RemoteRepo>,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// Create an orchestrator with no remotes configured
    pub fn new(
        home: Arc<dyn ArtifactStore>,
        content: Arc<dyn ContentSource>,
        pool: Arc<dyn WorkPool>,
    ) -> Self {
        Self {
            home,
            content,
            pool,
            remotes: Vec::new(),
            deadline: None,
        }
    }

    pub fn with_remotes(mut self, remotes: Vec<RemoteRepo>) -> Self {
        self.remotes = remotes;
        self
    }

    /// Deadline applied to each remote lookup
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Fresh resolver; its cache lives for one request
    fn resolver(&self) -> Arc<CrossRepoResolver> {
        Arc::new(CrossRepoResolver::new(self.remotes.clone()).with_deadline(self.deadline))
    }

    /// Index bound to a fresh resolver
    pub fn index(&self) -> ArtifactIndex {
        ArtifactIndex::new(Arc::clone(&self.home), self.resolver())
    }

    /// Validate and enqueue an artifact, returning the new work unit id
    #[instrument(skip(self), fields(home = self.home.name()))]
    pub async fn inject(&self, kind: ArtifactKind, artifact_id: &str) -> Result<Uuid, CoreError> {
        let (artifact, issues) = self.examine(kind, artifact_id).await?;

        if !issues.is_empty() {
            info!(issues = issues.len(), "Injection rejected");
            return Err(CoreError::ValidationRejected {
                id: artifact.id,
                issues,
            });
        }

        let unit_id = self.pool.enqueue(WorkUnit::queued(&artifact)).await?;
        info!(%unit_id, external = artifact.is_external(), "Artifact injected");

        Ok(unit_id)
    }

    /// Run every injection check without enqueueing
    pub async fn validate(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Vec<ValidationIssue>, CoreError> {
        Ok(self.examine(kind, artifact_id).await?.1)
    }

    /// Resolve the artifact, check the snapshot and collect validation issues
    async fn examine(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<(Artifact, Vec<ValidationIssue>), CoreError> {
        let resolver = self.resolver();
        let artifact = resolver
            .resolve(self.home.as_ref(), kind, artifact_id)
            .await?;

        let index = ArtifactIndex::new(Arc::clone(&self.home), Arc::clone(&resolver));
        let mut snapshot = index.load(kind).await?;
        if snapshot.get(&artifact.id).is_none() {
            snapshot.entries.push(ListingEntry::Artifact(artifact.clone()));
        }
        CausalGraph::build_partial(&snapshot.entries)?;

        let dangling = broken_parents(&resolver, &artifact, &snapshot).await?;

        // Content of an external artifact is never fetched; its owner checks it
        let summary = if artifact.is_external() {
            ContentSummary::with_plan(true)
        } else {
            self.content.summarize(&artifact).await?
        };

        let issues = validate_injectable(&artifact, &summary, &dangling);
        debug!(issues = issues.len(), "Validated artifact");

        Ok((artifact, issues))
    }

    /// Queued -> Dispatched
    pub async fn dispatch(
        &self,
        unit_id: Uuid,
        agent: Option<String>,
    ) -> Result<WorkUnit, CoreError> {
        Ok(self
            .pool
            .transition(unit_id, Transition::Dispatch { agent })
            .await?)
    }

    /// Dispatched -> Completed
    pub async fn complete(&self, unit_id: Uuid) -> Result<WorkUnit, CoreError> {
        Ok(self.pool.transition(unit_id, Transition::Complete).await?)
    }

    /// Dispatched -> Failed
    pub async fn fail(
        &self,
        unit_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<WorkUnit, CoreError> {
        Ok(self
            .pool
            .transition(
                unit_id,
                Transition::Fail {
                    reason: reason.into(),
                },
            )
            .await?)
    }

    pub async fn unit(&self, unit_id: Uuid) -> Result<WorkUnit, CoreError> {
        self.pool
            .get(unit_id)
            .await?
            .ok_or(CoreError::UnknownWorkUnit(unit_id))
    }

    /// All work units, oldest first
    pub async fn units(&self) -> Result<Vec<WorkUnit>, CoreError> {
        Ok(self.pool.list().await?)
    }

    /// Every unit injected for one artifact, oldest first
    pub async fn history(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Vec<WorkUnit>, CoreError> {
        Ok(self.pool.history(kind, artifact_id).await?)
    }
}

/// Parents of `artifact` that resolve neither in the snapshot nor remotely
async fn broken_parents(
    resolver: &Arc<CrossRepoResolver>,
    artifact: &Artifact,
    snapshot: &LoadedSet,
) -> Result<Vec<DanglingEdge>, CoreError> {
    let mut parents: Vec<&String> = artifact.created_after.iter().collect();
    parents.sort();
    parents.dedup();

    let mut broken = Vec::new();
    let mut lookups = Vec::new();
    for parent in parents {
        match snapshot.get(parent) {
            Some(ListingEntry::Artifact(_)) => {}
            Some(ListingEntry::Unresolvable(_)) => broken.push(parent.clone()),
            None => lookups.push(parent.clone()),
        }
    }

    for (parent, result) in resolver.resolve_ids(artifact.kind, lookups).await {
        match result {
            Ok(_) => {}
            Err(CoreError::NotFound { .. }) | Err(CoreError::UnresolvedReference { .. }) => {
                broken.push(parent)
            }
            Err(e) => return Err(e),
        }
    }

    broken.sort();
    Ok(broken
        .into_iter()
        .map(|missing_parent| DanglingEdge {
            child: artifact.id.clone(),
            missing_parent,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::IssueCode;
    use crate::domain::{ChunkStatus, RemoteLocator, WorkUnitState};
    use crate::pool::JournalPool;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn chunk(id: &str, status: ChunkStatus, after: &[&str]) -> Artifact {
        Artifact::new(id, ArtifactKind::Chunk, status.into())
            .with_created_after(after.iter().copied())
    }

    fn orchestrator(home: Arc<MemoryStore>) -> (Orchestrator, TempDir) {
        let temp = TempDir::new().unwrap();
        let pool = JournalPool::new(temp.path().join("work_pool.jsonl"));
        let orch = Orchestrator::new(home.clone(), home, Arc::new(pool));
        (orch, temp)
    }

    #[tokio::test]
    async fn test_inject_future_chunk_without_plan() {
        let home = Arc::new(MemoryStore::new("home"));
        home.insert(chunk("a", ChunkStatus::Future, &[]));
        let (orch, _temp) = orchestrator(home);

        let unit_id = orch.inject(ArtifactKind::Chunk, "a").await.unwrap();
        let unit = orch.unit(unit_id).await.unwrap();
        assert_eq!(unit.state, WorkUnitState::Queued);
        assert_eq!(unit.artifact_id, "a");
    }

    #[tokio::test]
    async fn test_active_without_plan_is_rejected() {
        let home = Arc::new(MemoryStore::new("home"));
        home.insert(chunk("a", ChunkStatus::Active, &[]));
        let (orch, _temp) = orchestrator(home.clone());

        let err = orch.inject(ArtifactKind::Chunk, "a").await.unwrap_err();
        match err {
            CoreError::ValidationRejected { issues, .. } => {
                assert_eq!(issues[0].code, IssueCode::EmptyPlanForActiveStatus)
            }
            other => panic!("expected ValidationRejected, got {:?}", other),
        }
        assert!(orch.units().await.unwrap().is_empty());

        home.set_plan(ArtifactKind::Chunk, "a", true);
        orch.inject(ArtifactKind::Chunk, "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let (orch, _temp) = orchestrator(Arc::new(MemoryStore::new("home")));
        let err = orch.inject(ArtifactKind::Chunk, "ghost").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_broken_parent_reported() {
        let home = Arc::new(MemoryStore::new("home"));
        home.insert(chunk("b", ChunkStatus::Future, &["z_missing", "a_missing"]));
        let (orch, _temp) = orchestrator(home);

        let issues = orch.validate(ArtifactKind::Chunk, "b").await.unwrap();
        let parents: Vec<&str> = issues
            .iter()
            .filter(|i| i.code == IssueCode::BrokenCausalLink)
            .map(|i| i.message.as_str())
            .collect();
        assert_eq!(parents.len(), 2);
        assert!(parents[0].contains("a_missing"));
        assert!(parents[1].contains("z_missing"));
    }

    #[tokio::test]
    async fn test_cycle_blocks_injection() {
        let home = Arc::new(MemoryStore::new("home"));
        home.insert(chunk("a", ChunkStatus::Future, &["b"]))
            .insert(chunk("b", ChunkStatus::Future, &["a"]))
            .insert(chunk("c", ChunkStatus::Future, &[]));
        let (orch, _temp) = orchestrator(home);

        let err = orch.inject(ArtifactKind::Chunk, "c").await.unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_passthroughs() {
        let home = Arc::new(MemoryStore::new("home"));
        home.insert(chunk("a", ChunkStatus::Future, &[]));
        let (orch, _temp) = orchestrator(home);

        let first = orch.inject(ArtifactKind::Chunk, "a").await.unwrap();
        let err = orch.inject(ArtifactKind::Chunk, "a").await.unwrap_err();
        assert!(
            matches!(err, CoreError::AlreadyInjected { unit_id, .. } if unit_id == first)
        );

        orch.dispatch(first, Some("agent-1".to_string())).await.unwrap();
        let failed = orch.fail(first, "tests red").await.unwrap();
        assert_eq!(failed.state, WorkUnitState::Failed);

        let err = orch.complete(first).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));

        let retry = orch.inject(ArtifactKind::Chunk, "a").await.unwrap();
        assert_ne!(retry, first);
        let history = orch.history(ArtifactKind::Chunk, "a").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_inject_remote_only_artifact() {
        let home = Arc::new(MemoryStore::new("home"));
        let payments = Arc::new(MemoryStore::new("payments"));
        payments.insert(chunk("billing", ChunkStatus::Active, &[]));
        let (orch, _temp) = orchestrator(home);
        let orch = orch.with_remotes(vec![RemoteRepo::new(
            RemoteLocator::new("acme/payments"),
            payments,
        )]);

        let unit_id = orch.inject(ArtifactKind::Chunk, "billing").await.unwrap();
        let unit = orch.unit(unit_id).await.unwrap();
        assert!(unit.external);
    }
}
