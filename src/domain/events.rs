//! Work pool journal events.
//!
//! The pool is an append-only log. Every enqueue and every transition is one
//! event; current unit state is derived by replaying them in order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::work_unit::{Transition, WorkUnit};

/// A single entry in the pool journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEvent {
    /// When this event was recorded
    pub timestamp: DateTime<Utc>,

    /// The unit this event belongs to
    pub unit_id: Uuid,

    /// What happened
    pub change: PoolChange,
}

/// Types of pool events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PoolChange {
    /// A new unit entered the pool
    Enqueued { unit: WorkUnit },

    /// An existing unit changed state
    Transitioned { transition: Transition },
}

impl PoolEvent {
    pub fn enqueued(unit: WorkUnit) -> Self {
        Self {
            timestamp: unit.queued_at,
            unit_id: unit.id,
            change: PoolChange::Enqueued { unit },
        }
    }

    pub fn transitioned(unit_id: Uuid, transition: Transition) -> Self {
        Self {
            timestamp: Utc::now(),
            unit_id,
            change: PoolChange::Transitioned { transition },
        }
    }
}

/// Rebuild unit state from a sequence of events
pub fn replay<'a, I>(events: I) -> HashMap<Uuid, WorkUnit>
where
    I: IntoIterator<Item = &'a PoolEvent>,
{
    let mut units = HashMap::new();
    for event in events {
        apply_event(&mut units, event);
    }
    units
}

/// Apply a single event to the derived state
pub fn apply_event(units: &mut HashMap<Uuid, WorkUnit>, event: &PoolEvent) {
    match &event.change {
        PoolChange::Enqueued { unit } => {
            units.insert(event.unit_id, unit.clone());
        }
        PoolChange::Transitioned { transition } => match units.get_mut(&event.unit_id) {
            Some(unit) => {
                if let Err(e) = unit.apply(transition, event.timestamp) {
                    warn!(error = %e, "Skipping inconsistent journal entry");
                }
            }
            None => {
                warn!(unit_id = %event.unit_id, "Transition for unknown unit in journal");
            }
        },
    }
}
