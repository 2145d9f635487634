//! Construction-side entity index.

use crate::cons::logline::NO_PREV_LOGLINE;
use crate::types::EntityId;
use std::collections::HashMap;

/// Per-entity state held during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
    /// External identifier.
    pub id: EntityId,
    /// Arena index of the most recent logline, or `NO_PREV_LOGLINE`.
    pub head: u64,
    /// Number of events appended so far.
    pub num_events: u64,
}

impl EntityState {
    /// Creates state for an entity that has no events yet.
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            head: NO_PREV_LOGLINE,
            num_events: 0,
        }
    }
}

/// Maps external ids to ordinals, assigned in first-seen order.
#[derive(Debug, Default)]
pub struct EntityIndex {
    ordinals: HashMap<EntityId, u64>,
    entities: Vec<EntityState>,
}

impl EntityIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordinal of `id`, allocating the next one on first sight.
    pub fn resolve_or_create(&mut self, id: &EntityId) -> u64 {
        if let Some(&ordinal) = self.ordinals.get(id) {
            return ordinal;
        }
        let ordinal = self.entities.len() as u64;
        self.ordinals.insert(*id, ordinal);
        self.entities.push(EntityState::new(*id));
        ordinal
    }

    /// Returns the ordinal of `id` without allocating.
    pub fn lookup(&self, id: &EntityId) -> Option<u64> {
        self.ordinals.get(id).copied()
    }

    /// Returns the state of an ordinal.
    pub fn get(&self, ordinal: u64) -> Option<&EntityState> {
        self.entities.get(ordinal as usize)
    }

    /// Returns the mutable state of an ordinal.
    pub fn get_mut(&mut self, ordinal: u64) -> Option<&mut EntityState> {
        self.entities.get_mut(ordinal as usize)
    }

    /// Iterates entities in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &EntityState)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(ordinal, state)| (ordinal as u64, state))
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity was seen.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
