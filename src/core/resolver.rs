//! Cross-repository resolution.
//!
//! Finds artifacts that the home store does not own. A resolver lives for one
//! request: it caches every outcome it produces (hits, misses and failures)
//! so repeated lookups inside that request agree with each other, and it is
//! dropped afterwards so the next request sees fresh remote state.
//!
//! Only metadata is fetched. The returned artifact carries status and edges,
//! never content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::domain::{Artifact, ArtifactKind, RemoteLocator};
use crate::store::{ArtifactStore, ExternalRef, StoreEntry};

use super::error::CoreError;

/// A configured remote repository
#[derive(Clone)]
pub struct RemoteRepo {
    pub locator: RemoteLocator,
    pub store: Arc<dyn ArtifactStore>,
}

impl RemoteRepo {
    pub fn new(locator: RemoteLocator, store: Arc<dyn ArtifactStore>) -> Self {
        Self { locator, store }
    }
}

impl std::fmt::Debug for RemoteRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRepo")
            .field("locator", &self.locator)
            .field("store", &self.store.name())
            .finish()
    }
}

/// What the remotes said about one id
#[derive(Debug, Clone)]
enum Outcome {
    Found(Artifact),

    /// Every remote answered and none owns the id
    NotClaimed,

    /// At least one remote failed or timed out, and none owns the id
    Unreachable(String),
}

/// (kind, id, pinned repository). Pinned and unpinned lookups of one id ask
/// different remotes, so they never share an outcome.
type CacheKey = (ArtifactKind, String, Option<String>);

/// Per-request resolver over the configured remotes
pub struct CrossRepoResolver {
    remotes: Vec<RemoteRepo>,
    deadline: Option<Duration>,
    cache: Mutex<HashMap<CacheKey, Arc<OnceCell<Outcome>>>>,
}

impl CrossRepoResolver {
    /// Remotes are consulted in the order given
    pub fn new(remotes: Vec<RemoteRepo>) -> Self {
        Self {
            remotes,
            deadline: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Bound each remote call; a call that overruns counts as unreachable.
    ///
    /// The bound is per remote, not per resolution: an unpinned lookup that
    /// walks N slow remotes can take up to N times the deadline.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn has_remotes(&self) -> bool {
        !self.remotes.is_empty()
    }

    /// Resolve an id, preferring the home store.
    ///
    /// A local record is returned as-is. An external ref in the home store
    /// pins the repository to ask; otherwise every remote is tried in order.
    #[instrument(skip(self, home), fields(home = home.name()))]
    pub async fn resolve(
        &self,
        home: &dyn ArtifactStore,
        kind: ArtifactKind,
        id: &str,
    ) -> Result<Artifact, CoreError> {
        match home.get(kind, id).await? {
            Some(StoreEntry::Local(artifact)) => Ok(artifact),
            Some(StoreEntry::External(external)) => self.resolve_ref(&external).await,
            Some(StoreEntry::Malformed { id, reason }) => {
                Err(CoreError::MalformedRecord { kind, id, reason })
            }
            None => self.resolve_remote(kind, id).await,
        }
    }

    /// Resolve a home-declared external ref against its pinned repository.
    ///
    /// The returned artifact keeps the edges declared by the home store, since
    /// the owner's edges name artifacts the home graph does not contain.
    pub async fn resolve_ref(&self, external: &ExternalRef) -> Result<Artifact, CoreError> {
        let outcome = self
            .lookup(external.kind, &external.id, Some(&external.locator))
            .await;

        match outcome {
            Outcome::Found(artifact) => {
                Ok(artifact.with_created_after(external.created_after.iter().cloned()))
            }
            Outcome::NotClaimed => Err(CoreError::UnresolvedReference {
                id: external.id.clone(),
                reason: format!("not found in {}", external.locator),
            }),
            Outcome::Unreachable(reason) => Err(CoreError::UnresolvedReference {
                id: external.id.clone(),
                reason,
            }),
        }
    }

    /// Resolve an id the home store does not know about
    pub async fn resolve_remote(&self, kind: ArtifactKind, id: &str) -> Result<Artifact, CoreError> {
        match self.lookup(kind, id, None).await {
            Outcome::Found(artifact) => Ok(artifact),
            Outcome::NotClaimed => Err(CoreError::NotFound {
                kind,
                id: id.to_string(),
            }),
            Outcome::Unreachable(reason) => Err(CoreError::UnresolvedReference {
                id: id.to_string(),
                reason,
            }),
        }
    }

    /// Resolve many external refs in parallel. Results keep input order.
    pub async fn resolve_refs(
        self: &Arc<Self>,
        refs: Vec<ExternalRef>,
    ) -> Vec<(ExternalRef, Result<Artifact, CoreError>)> {
        let results = Self::join_all(refs.iter().cloned().map(|external| {
            let resolver = Arc::clone(self);
            async move { resolver.resolve_ref(&external).await }
        }))
        .await;

        refs.into_iter().zip(results).collect()
    }

    /// Resolve many unknown ids in parallel. Results keep input order.
    pub async fn resolve_ids(
        self: &Arc<Self>,
        kind: ArtifactKind,
        ids: Vec<String>,
    ) -> Vec<(String, Result<Artifact, CoreError>)> {
        let results = Self::join_all(ids.iter().cloned().map(|id| {
            let resolver = Arc::clone(self);
            async move { resolver.resolve_remote(kind, &id).await }
        }))
        .await;

        ids.into_iter().zip(results).collect()
    }

    async fn join_all<I, F>(tasks: I) -> Vec<Result<Artifact, CoreError>>
    where
        I: IntoIterator<Item = F>,
        F: std::future::Future<Output = Result<Artifact, CoreError>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        let mut count = 0;
        for (index, task) in tasks.into_iter().enumerate() {
            set.spawn(async move { (index, task.await) });
            count += 1;
        }

        let mut slots: Vec<Option<Result<Artifact, CoreError>>> =
            (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Resolution task failed"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(CoreError::UnresolvedReference {
                        id: String::new(),
                        reason: "resolution task failed".to_string(),
                    })
                })
            })
            .collect()
    }

    /// Single-flight lookup: concurrent callers for one id share one query
    async fn lookup(
        &self,
        kind: ArtifactKind,
        id: &str,
        pinned: Option<&RemoteLocator>,
    ) -> Outcome {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let key = (kind, id.to_string(), pinned.map(|l| l.repo.clone()));
            Arc::clone(cache.entry(key).or_default())
        };

        cell.get_or_init(|| self.query_remotes(kind, id, pinned))
            .await
            .clone()
    }

    async fn query_remotes(
        &self,
        kind: ArtifactKind,
        id: &str,
        pinned: Option<&RemoteLocator>,
    ) -> Outcome {
        let candidates: Vec<&RemoteRepo> = match pinned {
            Some(locator) => self
                .remotes
                .iter()
                .filter(|r| r.locator.repo == locator.repo)
                .collect(),
            None => self.remotes.iter().collect(),
        };

        if candidates.is_empty() {
            let reason = match pinned {
                Some(locator) => format!("no remote configured for {}", locator.repo),
                None => "no remotes configured".to_string(),
            };
            return match pinned {
                Some(_) => Outcome::Unreachable(reason),
                None => Outcome::NotClaimed,
            };
        }

        let mut failures = Vec::new();
        for remote in candidates {
            let call = remote.store.get(kind, id);
            let result = match self.deadline {
                Some(deadline) => match timeout(deadline, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(repo = %remote.locator.repo, %id, ?deadline, "Remote lookup timed out");
                        failures.push(format!(
                            "{}: timed out after {:?}",
                            remote.locator.repo, deadline
                        ));
                        continue;
                    }
                },
                None => call.await,
            };

            match result {
                Ok(Some(StoreEntry::Local(artifact))) => {
                    let locator = pinned.cloned().unwrap_or_else(|| remote.locator.clone());
                    debug!(repo = %locator.repo, %id, "Resolved external artifact");
                    return Outcome::Found(artifact.into_external(locator));
                }
                // A remote's own external refs are not claims of ownership
                Ok(Some(StoreEntry::External(_))) | Ok(None) => {}
                Ok(Some(StoreEntry::Malformed { reason, .. })) => {
                    warn!(repo = %remote.locator.repo, %id, %reason, "Remote record malformed");
                    failures.push(format!("{}: malformed record: {}", remote.locator.repo, reason));
                }
                Err(e) => {
                    warn!(repo = %remote.locator.repo, %id, error = %e, "Remote lookup failed");
                    failures.push(format!("{}: {}", remote.locator.repo, e));
                }
            }
        }

        if failures.is_empty() {
            Outcome::NotClaimed
        } else {
            Outcome::Unreachable(failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkStatus;
    use crate::store::MemoryStore;

    fn chunk(id: &str) -> Artifact {
        Artifact::new(id, ArtifactKind::Chunk, ChunkStatus::Active.into())
    }

    fn remote(repo: &str, store: Arc<MemoryStore>) -> RemoteRepo {
        RemoteRepo::new(RemoteLocator::new(repo), store)
    }

    #[tokio::test]
    async fn test_local_record_wins() {
        let home = MemoryStore::new("home");
        home.insert(chunk("a"));
        let other = Arc::new(MemoryStore::new("other"));
        other.insert(chunk("a"));

        let resolver = CrossRepoResolver::new(vec![remote("acme/other", other.clone())]);
        let artifact = resolver.resolve(&home, ArtifactKind::Chunk, "a").await.unwrap();

        assert!(!artifact.is_external());
        assert_eq!(other.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_record_marked_external() {
        let home = MemoryStore::new("home");
        let first = Arc::new(MemoryStore::new("first"));
        let second = Arc::new(MemoryStore::new("second"));
        second.insert(chunk("billing"));

        let resolver = CrossRepoResolver::new(vec![
            remote("acme/first", first.clone()),
            remote("acme/second", second.clone()),
        ]);
        let artifact = resolver
            .resolve(&home, ArtifactKind::Chunk, "billing")
            .await
            .unwrap();

        assert!(artifact.is_external());
        assert_eq!(artifact.remote_locator().unwrap().repo, "acme/second");
        assert_eq!(first.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_vs_unresolved() {
        let home = MemoryStore::new("home");
        let quiet = Arc::new(MemoryStore::new("quiet"));

        let resolver = CrossRepoResolver::new(vec![remote("acme/quiet", quiet.clone())]);
        let err = resolver
            .resolve(&home, ArtifactKind::Chunk, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));

        let down = Arc::new(MemoryStore::new("down"));
        down.set_offline(true);
        let resolver = CrossRepoResolver::new(vec![
            remote("acme/quiet", quiet),
            remote("acme/down", down),
        ]);
        let err = resolver
            .resolve(&home, ArtifactKind::Chunk, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedReference { .. }));
    }

    #[tokio::test]
    async fn test_pinned_ref_only_asks_its_repo() {
        let home = MemoryStore::new("home");
        home.insert_external(ExternalRef {
            id: "billing".to_string(),
            kind: ArtifactKind::Chunk,
            locator: RemoteLocator::new("acme/payments"),
            created_after: vec!["a".to_string()],
        });
        let decoy = Arc::new(MemoryStore::new("decoy"));
        decoy.insert(chunk("billing"));
        let payments = Arc::new(MemoryStore::new("payments"));
        payments.insert(chunk("billing").with_created_after(["remote_parent"]));

        let resolver = CrossRepoResolver::new(vec![
            remote("acme/decoy", decoy.clone()),
            remote("acme/payments", payments),
        ]);
        let artifact = resolver
            .resolve(&home, ArtifactKind::Chunk, "billing")
            .await
            .unwrap();

        assert_eq!(decoy.get_calls(), 0);
        assert_eq!(artifact.remote_locator().unwrap().repo, "acme/payments");
        assert_eq!(artifact.created_after, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_deadline_counts_as_unresolved() {
        let home = MemoryStore::new("home");
        let slow = Arc::new(MemoryStore::new("slow"));
        slow.insert(chunk("billing"));
        slow.set_latency(Some(Duration::from_millis(500)));

        let resolver = CrossRepoResolver::new(vec![remote("acme/slow", slow)])
            .with_deadline(Some(Duration::from_millis(20)));
        let err = resolver
            .resolve(&home, ArtifactKind::Chunk, "billing")
            .await
            .unwrap_err();

        match err {
            CoreError::UnresolvedReference { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_flight_per_id() {
        let remote_store = Arc::new(MemoryStore::new("payments"));
        remote_store.insert(chunk("billing"));
        remote_store.set_latency(Some(Duration::from_millis(30)));

        let resolver = Arc::new(CrossRepoResolver::new(vec![remote(
            "acme/payments",
            remote_store.clone(),
        )]));
        let ids = vec!["billing".to_string(); 8];
        let results = resolver.resolve_ids(ArtifactKind::Chunk, ids).await;

        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(remote_store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_pinned_miss_does_not_shadow_unpinned_lookup() {
        let payments = Arc::new(MemoryStore::new("payments"));
        let ledger = Arc::new(MemoryStore::new("ledger"));
        ledger.insert(chunk("billing"));

        let resolver = CrossRepoResolver::new(vec![
            remote("acme/payments", payments),
            remote("acme/ledger", ledger),
        ]);

        let pinned = ExternalRef {
            id: "billing".to_string(),
            kind: ArtifactKind::Chunk,
            locator: RemoteLocator::new("acme/payments"),
            created_after: Vec::new(),
        };
        assert!(matches!(
            resolver.resolve_ref(&pinned).await,
            Err(CoreError::UnresolvedReference { .. })
        ));

        // Same request, same id, no pin: every remote is asked
        let artifact = resolver
            .resolve_remote(ArtifactKind::Chunk, "billing")
            .await
            .unwrap();
        assert_eq!(artifact.remote_locator().unwrap().repo, "acme/ledger");
    }

    #[tokio::test]
    async fn test_deadline_applies_to_each_remote() {
        let first = Arc::new(MemoryStore::new("first"));
        let second = Arc::new(MemoryStore::new("second"));
        for store in [&first, &second] {
            store.set_latency(Some(Duration::from_millis(500)));
        }

        let resolver = CrossRepoResolver::new(vec![
            remote("acme/first", first),
            remote("acme/second", second),
        ])
        .with_deadline(Some(Duration::from_millis(20)));

        match resolver.resolve_remote(ArtifactKind::Chunk, "billing").await {
            Err(CoreError::UnresolvedReference { reason, .. }) => {
                assert!(reason.contains("acme/first: timed out"));
                assert!(reason.contains("acme/second: timed out"));
            }
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }
}
