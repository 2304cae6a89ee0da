//! In-memory artifact store.
//!
//! Used to embed causeway in other programs and throughout the tests.
//! Supports simulated outages and latency so remote behaviour can be
//! exercised without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Artifact, ArtifactKind};

use super::{ArtifactStore, ContentSource, ContentSummary, ExternalRef, StoreEntry, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<ArtifactKind, BTreeMap<String, StoreEntry>>>,
    plans: RwLock<HashMap<(ArtifactKind, String), bool>>,
    offline: AtomicBool,
    latency: RwLock<Option<Duration>>,
    get_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Insert or replace a local artifact
    pub fn insert(&self, artifact: Artifact) -> &Self {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(artifact.kind)
            .or_default()
            .insert(artifact.id.clone(), StoreEntry::Local(artifact));
        self
    }

    /// Insert or replace an external reference
    pub fn insert_external(&self, external: ExternalRef) -> &Self {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(external.kind)
            .or_default()
            .insert(external.id.clone(), StoreEntry::External(external));
        self
    }

    /// Record whether an artifact has a substantive plan
    pub fn set_plan(&self, kind: ArtifactKind, id: &str, substantive: bool) -> &Self {
        let mut plans = self.plans.write().unwrap_or_else(|e| e.into_inner());
        plans.insert((kind, id.to_string()), substantive);
        self
    }

    /// Make every read fail as unavailable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every read
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Number of `get` calls served so far
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), StoreError> {
        let latency = *self.latency.read().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                store: self.name.clone(),
                reason: "store is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, kind: ArtifactKind) -> Result<Vec<StoreEntry>, StoreError> {
        self.simulate().await?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, kind: ArtifactKind, id: &str) -> Result<Option<StoreEntry>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&kind).and_then(|m| m.get(id)).cloned())
    }
}

#[async_trait]
impl ContentSource for MemoryStore {
    async fn summarize(&self, artifact: &Artifact) -> Result<ContentSummary, StoreError> {
        let plans = self.plans.read().unwrap_or_else(|e| e.into_inner());
        let substantive = plans
            .get(&(artifact.kind, artifact.id.clone()))
            .copied()
            .unwrap_or(false);
        Ok(ContentSummary::with_plan(substantive))
    }
}
