//! Value interner: maps raw (field, bytes) pairs to dense items.
//!
//! Every field owns an independent dictionary. Value ids are handed out in
//! first-seen order starting at 1; id 0 is the empty sentinel and never has a
//! dictionary entry.

use crate::error::{Result, TrailError};
use crate::types::{FieldId, Item, ValueId, MAX_FIELD_SIZE, MAX_NUM_FIELDS, MAX_NUM_VALUES};
use std::collections::HashMap;

/// Dictionary of a single field.
#[derive(Debug, Default)]
struct FieldDictionary {
    /// Raw value → value id.
    ids: HashMap<Vec<u8>, ValueId>,
    /// Value id - 1 → raw value.
    values: Vec<Vec<u8>>,
    /// Total bytes of all values, for sizing the emitted blob.
    bytes: usize,
}

/// Interner for the values of all fields of one build.
#[derive(Debug)]
pub struct ValueInterner {
    fields: Vec<FieldDictionary>,
}

impl ValueInterner {
    /// Creates an interner for `num_fields` fields.
    ///
    /// # Errors
    ///
    /// Returns `TrailError::TooManyFields` above `MAX_NUM_FIELDS`.
    pub fn new(num_fields: usize) -> Result<Self> {
        if num_fields > MAX_NUM_FIELDS {
            return Err(TrailError::TooManyFields(num_fields));
        }
        let fields = (0..num_fields).map(|_| FieldDictionary::default()).collect();
        Ok(Self { fields })
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Checks that `raw` could be interned into `field` without interning it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldIndex` or `FieldValueTooLarge`.
    pub fn validate(&self, field: usize, raw: &[u8]) -> Result<()> {
        if field >= self.fields.len() {
            return Err(TrailError::InvalidFieldIndex {
                field,
                num_fields: self.fields.len(),
            });
        }
        if raw.len() > MAX_FIELD_SIZE {
            return Err(TrailError::FieldValueTooLarge {
                field,
                len: raw.len(),
                max: MAX_FIELD_SIZE,
            });
        }
        Ok(())
    }

    /// Interns `raw` for `field` and returns its item.
    ///
    /// Zero-length values map to the field's empty sentinel.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldIndex`, `FieldValueTooLarge`, or `CapacityExceeded`
    /// when the field already holds `MAX_NUM_VALUES` distinct values.
    pub fn intern(&mut self, field: usize, raw: &[u8]) -> Result<Item> {
        self.validate(field, raw)?;
        let field_id = field as FieldId;
        if raw.is_empty() {
            return Ok(Item::empty(field_id));
        }

        let dict = &mut self.fields[field];
        if let Some(&value) = dict.ids.get(raw) {
            return Ok(Item::new(field_id, value));
        }

        let next = dict.values.len() as u64 + 1;
        if next > MAX_NUM_VALUES as u64 {
            return Err(TrailError::CapacityExceeded {
                what: "values per field",
                limit: MAX_NUM_VALUES as u64,
            });
        }
        let value = next as ValueId;
        dict.ids.insert(raw.to_vec(), value);
        dict.values.push(raw.to_vec());
        dict.bytes += raw.len();
        Ok(Item::new(field_id, value))
    }

    /// Looks up the item of an already interned value.
    pub fn get(&self, field: usize, raw: &[u8]) -> Option<Item> {
        let dict = self.fields.get(field)?;
        if raw.is_empty() {
            return Some(Item::empty(field as FieldId));
        }
        dict.ids
            .get(raw)
            .map(|&value| Item::new(field as FieldId, value))
    }

    /// Returns the raw bytes of an item, or `None` if it was never interned.
    pub fn value(&self, item: Item) -> Option<&[u8]> {
        let dict = self.fields.get(item.field() as usize)?;
        match item.value() {
            0 => Some(&[]),
            v => dict.values.get(v as usize - 1).map(Vec::as_slice),
        }
    }

    /// Returns the distinct non-empty values of `field` in value-id order.
    pub fn values(&self, field: usize) -> &[Vec<u8>] {
        self.fields
            .get(field)
            .map(|d| d.values.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the total byte size of the values of `field`.
    pub fn value_bytes(&self, field: usize) -> usize {
        self.fields.get(field).map(|d| d.bytes).unwrap_or(0)
    }

    /// Returns the number of dictionary entries across all fields.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|d| d.values.len()).sum()
    }

    /// Returns true if no value has been interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
