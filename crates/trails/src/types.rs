//! Core identifiers and limits shared by the construction and read paths.

use crate::error::{Result, TrailError};
use std::fmt;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Zero-based index of a field in the store schema.
pub type FieldId = u8;

/// Dense per-field identifier of an interned value. Value 0 is the empty sentinel.
pub type ValueId = u32;

/// Maximum byte length of a single field value.
pub const MAX_FIELD_SIZE: usize = 1024;

/// Maximum number of fields in a store schema.
pub const MAX_NUM_FIELDS: usize = 255;

/// Default cap on the number of events a single build accepts.
pub const MAX_NUM_INPUTS: u64 = 10_000_000;

/// Maximum number of distinct non-empty values per field (24-bit value ids).
pub const MAX_NUM_VALUES: u32 = (1 << 24) - 1;

/// Maximum byte length of a field name.
pub const MAX_FIELD_NAME_LENGTH: usize = 512;

/// Default fraction of invalid timestamps tolerated by finalize.
pub const INVALID_RATIO: f64 = 0.001;

/// Default lower bound (inclusive) of the plausible timestamp range.
pub const TSTAMP_MIN: Timestamp = 0;

/// Default upper bound (inclusive) of the plausible timestamp range.
pub const TSTAMP_MAX: Timestamp = u32::MAX as Timestamp;

/// Field name reserved for the implicit timestamp column.
pub const RESERVED_FIELD_NAME: &str = "time";

/// Length of an external entity identifier.
pub const ENTITY_ID_LEN: usize = 16;

/// Opaque 16-byte external identifier of an entity, e.g. a UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(pub [u8; ENTITY_ID_LEN]);

impl EntityId {
    /// Creates an identifier from raw bytes.
    pub const fn new(bytes: [u8; ENTITY_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an identifier from a slice that must be exactly 16 bytes long.
    ///
    /// # Errors
    ///
    /// Returns `TrailError::MalformedEntityId` for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; ENTITY_ID_LEN] = bytes
            .try_into()
            .map_err(|_| TrailError::MalformedEntityId(bytes.len()))?;
        Ok(Self(raw))
    }

    /// Parses a 32-character hex string.
    ///
    /// # Errors
    ///
    /// Returns `TrailError::MalformedEntityId` if the string is not valid hex
    /// or does not decode to exactly 16 bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| TrailError::MalformedEntityId(s.len() / 2))?;
        Self::from_slice(&bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ENTITY_ID_LEN] {
        &self.0
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; ENTITY_ID_LEN]> for EntityId {
    fn from(bytes: [u8; ENTITY_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_hex())
    }
}

/// An interned (field, value) pair packed into 32 bits.
///
/// The low 8 bits hold `field + 1`, the upper 24 bits the value id, so a valid
/// item is never zero and zero can terminate flat item buffers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item(u32);

impl Item {
    /// Builds the item for `value` of `field`.
    pub fn new(field: FieldId, value: ValueId) -> Self {
        debug_assert!((field as usize) < MAX_NUM_FIELDS);
        debug_assert!(value <= MAX_NUM_VALUES);
        Self((value << 8) | (field as u32 + 1))
    }

    /// Returns the empty-value sentinel of `field`.
    pub fn empty(field: FieldId) -> Self {
        Self::new(field, 0)
    }

    /// Reinterprets a raw encoded item. Returns `None` for zero.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw & 0xff == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Returns the encoded form.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns the zero-based field index.
    pub fn field(self) -> FieldId {
        ((self.0 & 0xff) - 1) as FieldId
    }

    /// Returns the per-field value id.
    pub fn value(self) -> ValueId {
        self.0 >> 8
    }

    /// Returns true for the empty-value sentinel.
    pub fn is_empty(self) -> bool {
        self.value() == 0
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({}:{})", self.field(), self.value())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field(), self.value())
    }
}

/// One replayed event of a trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Items in field order, or only the changed ones for edge-encoded replay.
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_encoding() {
        let item = Item::new(3, 42);
        assert_eq!(item.field(), 3);
        assert_eq!(item.value(), 42);
        assert!(!item.is_empty());
        assert_ne!(item.raw(), 0);

        let empty = Item::empty(0);
        assert!(empty.is_empty());
        assert_eq!(empty.field(), 0);
        assert_ne!(empty.raw(), 0);

        let top = Item::new((MAX_NUM_FIELDS - 1) as FieldId, MAX_NUM_VALUES);
        assert_eq!(top.field() as usize, MAX_NUM_FIELDS - 1);
        assert_eq!(top.value(), MAX_NUM_VALUES);
    }

    #[test]
    fn test_item_from_raw() {
        assert!(Item::from_raw(0).is_none());
        assert!(Item::from_raw(0x100).is_none());
        assert_eq!(Item::from_raw(Item::new(1, 7).raw()), Some(Item::new(1, 7)));
    }

    #[test]
    fn test_entity_id_hex() {
        let id = EntityId::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(id.as_bytes()[15], 0x0f);
        assert_eq!(id.to_hex(), "000102030405060708090a0b0c0d0e0f");

        assert!(matches!(
            EntityId::from_hex("abcd"),
            Err(TrailError::MalformedEntityId(2))
        ));
        assert!(EntityId::from_hex("zz0102030405060708090a0b0c0d0e0f").is_err());
    }

    #[test]
    fn test_entity_id_from_slice() {
        assert!(EntityId::from_slice(&[1u8; 16]).is_ok());
        assert!(matches!(
            EntityId::from_slice(&[1u8; 15]),
            Err(TrailError::MalformedEntityId(15))
        ));
    }
}
