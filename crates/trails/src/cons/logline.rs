//! Logline arena: append-only event records chained per entity.
//!
//! Each logline points back at the previous logline of the same entity, so
//! every entity's events form a stack inside one flat arena. Nothing per
//! entity has to grow during ingestion; the finalizer walks and reverses each
//! chain once.

use crate::cons::entity::EntityState;
use crate::error::{Result, TrailError};
use crate::types::{Item, Timestamp, MAX_NUM_FIELDS};

/// Back-pointer value meaning "no previous logline".
pub const NO_PREV_LOGLINE: u64 = u64::MAX;

/// One ingested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logline {
    /// Start of this event's items in the shared values buffer.
    pub values_offset: u64,
    /// Number of items.
    pub num_values: u32,
    /// Event timestamp as given, valid or not.
    pub timestamp: Timestamp,
    /// Arena index of the previous logline of the same entity.
    pub prev_logline_idx: u64,
}

impl Logline {
    /// Returns true if this logline starts its entity's chain.
    pub fn is_first(&self) -> bool {
        self.prev_logline_idx == NO_PREV_LOGLINE
    }
}

/// Arena of loglines plus the values buffer they index into.
#[derive(Debug)]
pub struct LoglineArena {
    loglines: Vec<Logline>,
    values: Vec<Item>,
    max_inputs: u64,
}

impl LoglineArena {
    /// Creates an arena that accepts at most `max_inputs` loglines.
    pub fn new(max_inputs: u64) -> Self {
        Self {
            loglines: Vec::new(),
            values: Vec::new(),
            max_inputs,
        }
    }

    /// Returns the maximum number of loglines.
    pub fn max_inputs(&self) -> u64 {
        self.max_inputs
    }

    /// Returns true if another logline can be appended.
    pub fn has_capacity(&self) -> bool {
        (self.loglines.len() as u64) < self.max_inputs
    }

    /// Appends an event for `entity` and makes it the entity's chain head.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` once `max_inputs` loglines exist, or when
    /// more than `MAX_NUM_FIELDS` items are passed.
    pub fn append(
        &mut self,
        entity: &mut EntityState,
        timestamp: Timestamp,
        items: &[Item],
    ) -> Result<u64> {
        if items.len() > MAX_NUM_FIELDS {
            return Err(TrailError::CapacityExceeded {
                what: "values per event",
                limit: MAX_NUM_FIELDS as u64,
            });
        }
        if !self.has_capacity() {
            return Err(TrailError::CapacityExceeded {
                what: "input events",
                limit: self.max_inputs,
            });
        }

        let idx = self.loglines.len() as u64;
        let values_offset = self.values.len() as u64;
        self.values.extend_from_slice(items);
        self.loglines.push(Logline {
            values_offset,
            num_values: items.len() as u32,
            timestamp,
            prev_logline_idx: entity.head,
        });

        entity.head = idx;
        entity.num_events += 1;
        Ok(idx)
    }

    /// Returns the logline at `idx`.
    pub fn get(&self, idx: u64) -> Option<&Logline> {
        self.loglines.get(idx as usize)
    }

    /// Returns the items of a logline.
    pub fn items(&self, logline: &Logline) -> &[Item] {
        let start = logline.values_offset as usize;
        &self.values[start..start + logline.num_values as usize]
    }

    /// Walks a chain from `head` back to its first logline.
    pub fn chain(&self, head: u64) -> ChainIter<'_> {
        ChainIter { arena: self, next: head }
    }

    /// Returns the number of loglines.
    pub fn len(&self) -> usize {
        self.loglines.len()
    }

    /// Returns true if no logline was appended.
    pub fn is_empty(&self) -> bool {
        self.loglines.is_empty()
    }

    /// Returns the total number of items stored.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Iterator over one entity's loglines, most recent first.
pub struct ChainIter<'a> {
    arena: &'a LoglineArena,
    next: u64,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = (u64, &'a Logline);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NO_PREV_LOGLINE {
            return None;
        }
        let idx = self.next;
        let logline = self.arena.get(idx)?;
        debug_assert!(logline.is_first() || logline.prev_logline_idx < idx);
        self.next = logline.prev_logline_idx;
        Some((idx, logline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;

    fn entity(byte: u8) -> EntityState {
        EntityState::new(EntityId::new([byte; 16]))
    }

    #[test]
    fn test_append_links_chain() {
        let mut arena = LoglineArena::new(100);
        let mut a = entity(1);
        let mut b = entity(2);

        let a0 = arena.append(&mut a, 10, &[Item::new(0, 1)]).unwrap();
        let b0 = arena.append(&mut b, 11, &[Item::new(0, 2)]).unwrap();
        let a1 = arena.append(&mut a, 12, &[Item::new(0, 3)]).unwrap();

        assert_eq!((a0, b0, a1), (0, 1, 2));
        assert_eq!(a.head, 2);
        assert_eq!(a.num_events, 2);
        assert_eq!(b.head, 1);

        assert!(arena.get(a0).unwrap().is_first());
        assert_eq!(arena.get(a1).unwrap().prev_logline_idx, a0);
    }

    #[test]
    fn test_chain_walks_most_recent_first() {
        let mut arena = LoglineArena::new(100);
        let mut a = entity(1);
        let mut b = entity(2);
        for ts in 0..5u64 {
            arena.append(&mut a, ts, &[Item::new(0, ts as u32 + 1)]).unwrap();
            arena.append(&mut b, 100 + ts, &[]).unwrap();
        }

        let stamps: Vec<_> = arena.chain(a.head).map(|(_, l)| l.timestamp).collect();
        assert_eq!(stamps, vec![4, 3, 2, 1, 0]);

        let (_, last) = arena.chain(a.head).next().unwrap();
        assert_eq!(arena.items(last), &[Item::new(0, 5)]);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut arena = LoglineArena::new(2);
        let mut a = entity(1);
        arena.append(&mut a, 1, &[]).unwrap();
        arena.append(&mut a, 2, &[]).unwrap();

        let result = arena.append(&mut a, 3, &[]);
        assert!(matches!(
            result,
            Err(TrailError::CapacityExceeded { limit: 2, .. })
        ));
        assert_eq!(arena.len(), 2);
        assert_eq!(a.num_events, 2);
    }

    #[test]
    fn test_empty_chain() {
        let arena = LoglineArena::new(1);
        assert_eq!(arena.chain(NO_PREV_LOGLINE).count(), 0);
    }
}
