//! JSONL-backed work pool.
//!
//! Follows the append-only pattern: every enqueue and transition is one JSON
//! line, and unit state is derived by replay. Check-then-append runs under an
//! exclusive `flock` on a sibling lock file, so the "one live unit per
//! artifact" rule holds across processes sharing the journal.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::events::{self, PoolEvent};
use crate::domain::{ArtifactKind, Transition, WorkUnit};

use super::{PoolError, WorkPool};

/// File-based work pool using JSONL format
#[derive(Debug, Clone)]
pub struct JournalPool {
    /// Path to the journal file
    journal_path: PathBuf,

    /// Path to the lock file guarding the journal
    lock_path: PathBuf,
}

impl JournalPool {
    /// Create a pool backed by the given journal file
    pub fn new(journal_path: PathBuf) -> Self {
        let mut lock_name = journal_path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_name),
            journal_path,
        }
    }

    /// Open the pool in the configured state directory
    pub async fn open_default() -> Result<Self> {
        let path = crate::config::pool_path()?;

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(Self::new(path))
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Run `f` on a blocking thread while holding the journal lock
    async fn locked<F, R>(&self, exclusive: bool, f: F) -> Result<R, PoolError>
    where
        F: FnOnce(&Path) -> Result<R, PoolError> + Send + 'static,
        R: Send + 'static,
    {
        let journal = self.journal_path.clone();
        let lock = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = lock.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let lock_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&lock)?;

            if exclusive {
                lock_file.lock_exclusive()?;
            } else {
                lock_file.lock_shared()?;
            }

            // Lock is released when lock_file is dropped
            f(&journal)
        })
        .await
        .map_err(|e| PoolError::Worker(e.to_string()))?
    }
}

/// Read every event in the journal
fn read_events(path: &Path) -> Result<Vec<PoolEvent>, PoolError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }

    Ok(events)
}

/// Append one event to the journal
fn append_event(path: &Path, event: &PoolEvent) -> Result<(), PoolError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json = serde_json::to_string(event)?;
    file.write_all(format!("{}\n", json).as_bytes())?;
    file.flush()?;

    Ok(())
}

fn load_units(path: &Path) -> Result<HashMap<Uuid, WorkUnit>, PoolError> {
    Ok(events::replay(&read_events(path)?))
}

/// Units sorted oldest first (queued_at, then id)
fn ordered(units: impl IntoIterator<Item = WorkUnit>) -> Vec<WorkUnit> {
    let mut units: Vec<WorkUnit> = units.into_iter().collect();
    units.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then(a.id.cmp(&b.id)));
    units
}

#[async_trait]
impl WorkPool for JournalPool {
    /// Conditional insert; also assigns the unit's attempt number
    #[instrument(skip(self, unit), fields(artifact = %unit.artifact_id))]
    async fn enqueue(&self, mut unit: WorkUnit) -> Result<Uuid, PoolError> {
        let id = self
            .locked(true, move |path| {
                let units = load_units(path)?;
                let previous: Vec<&WorkUnit> = units
                    .values()
                    .filter(|u| u.is_for(unit.kind, &unit.artifact_id))
                    .collect();

                if let Some(live) = previous.iter().find(|u| u.state.is_live()) {
                    return Err(PoolError::Conflict {
                        artifact_id: unit.artifact_id.clone(),
                        existing: live.id,
                    });
                }

                unit.attempt = previous.len() as u32 + 1;
                let id = unit.id;
                append_event(path, &PoolEvent::enqueued(unit))?;
                Ok(id)
            })
            .await?;

        info!(unit_id = %id, "Work unit queued");
        Ok(id)
    }

    #[instrument(skip(self, transition), fields(to = %transition.target_state()))]
    async fn transition(&self, id: Uuid, transition: Transition) -> Result<WorkUnit, PoolError> {
        let unit = self
            .locked(true, move |path| {
                let units = load_units(path)?;
                let mut unit = units.get(&id).cloned().ok_or(PoolError::UnknownUnit(id))?;

                let event = PoolEvent::transitioned(id, transition.clone());
                unit.apply(&transition, event.timestamp)?;
                append_event(path, &event)?;
                Ok(unit)
            })
            .await?;

        info!(unit_id = %id, state = %unit.state, "Work unit transitioned");
        Ok(unit)
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkUnit>, PoolError> {
        self.locked(false, move |path| Ok(load_units(path)?.remove(&id)))
            .await
    }

    async fn history(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Vec<WorkUnit>, PoolError> {
        let artifact_id = artifact_id.to_string();
        let units = self
            .locked(false, move |path| {
                Ok(ordered(
                    load_units(path)?
                        .into_values()
                        .filter(|u| u.is_for(kind, &artifact_id)),
                ))
            })
            .await?;

        debug!(count = units.len(), "Loaded unit history");
        Ok(units)
    }

    async fn list(&self) -> Result<Vec<WorkUnit>, PoolError> {
        self.locked(false, |path| Ok(ordered(load_units(path)?.into_values())))
            .await
    }
}
