use crate::entity::{EntityId, EntityState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// One tracked entity with a one-deep history
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedEntityRecord {
    pub id: EntityId,

    /// Most recent snapshot
    pub latest: EntityState,

    /// The record's own prior `latest`, shifted on every update
    pub previous: Option<EntityState>,
}

/// State store owns the tracked entities and their display order.
///
/// Display order is first-seen order: a full reset replaces it wholesale,
/// incremental updates only ever append unseen ids to the tail.
#[derive(Debug, Default)]
pub struct StateStore {
    records: HashMap<EntityId, TrackedEntityRecord>,
    order: Vec<EntityId>,
    server_started_at: Option<DateTime<Utc>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole store with a full-state snapshot sequence.
    ///
    /// A repeated id keeps its first position and its last snapshot.
    pub fn reset_all(
        &mut self,
        snapshots: Vec<EntityState>,
        server_started_at: Option<DateTime<Utc>>,
    ) {
        self.records.clear();
        self.order.clear();

        for state in snapshots {
            let id = state.id.clone();
            match self.records.get_mut(&id) {
                Some(record) => {
                    debug!(entity_id = %id, "Duplicate id in full state, keeping last snapshot");
                    record.latest = state;
                }
                None => {
                    self.order.push(id.clone());
                    self.records.insert(
                        id.clone(),
                        TrackedEntityRecord {
                            id,
                            latest: state,
                            previous: None,
                        },
                    );
                }
            }
        }

        if server_started_at.is_some() {
            self.server_started_at = server_started_at;
        }

        info!(entities = self.order.len(), "Loaded full state");
    }

    /// Insert or update one entity.
    ///
    /// Returns the snapshot that was `latest` before this update, or `None`
    /// when the entity was seen for the first time.
    pub fn upsert(&mut self, state: EntityState) -> Option<EntityState> {
        match self.records.get_mut(&state.id) {
            Some(record) => {
                let previous = std::mem::replace(&mut record.latest, state);
                record.previous = Some(previous.clone());
                Some(previous)
            }
            None => {
                let id = state.id.clone();
                info!(entity_id = %id, label = %state.label, "Tracking new entity");
                self.order.push(id.clone());
                self.records.insert(
                    id.clone(),
                    TrackedEntityRecord {
                        id,
                        latest: state,
                        previous: None,
                    },
                );
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&TrackedEntityRecord> {
        self.records.get(id)
    }

    /// Ids in first-seen order
    pub fn display_order(&self) -> &[EntityId] {
        &self.order
    }

    /// Records in display order
    pub fn records(&self) -> impl Iterator<Item = &TrackedEntityRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Server start time carried by the last full state, if any
    pub fn server_started_at(&self) -> Option<DateTime<Utc>> {
        self.server_started_at
    }
}
