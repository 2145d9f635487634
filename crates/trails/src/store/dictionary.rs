//! Item dictionary section.
//!
//! Per field, in schema order:
//!
//! ```text
//! value_count   u32 LE               non-empty values, ids 1..=value_count
//! offsets       u64 LE × (count + 1) byte offsets into the blob
//! blob          concatenated values
//! ```
//!
//! Value `v` spans `blob[offsets[v - 1]..offsets[v]]`. The empty sentinel
//! (value 0) has no entry.

use crate::cons::interner::ValueInterner;
use crate::error::{Result, TrailError};
use crate::store::file::{read_u32, read_u64, slice_at};
use crate::types::{FieldId, Item, ValueId};
use std::collections::HashMap;
use std::io::Write;
use std::sync::OnceLock;
use xxhash_rust::xxh64::xxh64;

/// Writes the dictionary of every field and returns the bytes written.
pub fn write_dictionary<W: Write>(writer: &mut W, interner: &ValueInterner) -> Result<u64> {
    let mut written = 0u64;
    for field in 0..interner.num_fields() {
        let values = interner.values(field);
        writer.write_all(&(values.len() as u32).to_le_bytes())?;

        let mut offset = 0u64;
        writer.write_all(&offset.to_le_bytes())?;
        for value in values {
            offset += value.len() as u64;
            writer.write_all(&offset.to_le_bytes())?;
        }
        for value in values {
            writer.write_all(value)?;
        }

        written += 4 + 8 * (values.len() as u64 + 1) + offset;
    }
    Ok(written)
}

/// Location of one field's dictionary inside the file.
#[derive(Debug)]
struct FieldDictionary {
    count: u32,
    offsets_pos: usize,
    blob_pos: usize,
    blob_len: usize,
    /// xxh64 of a value → candidate value ids, built on first reverse lookup.
    by_hash: OnceLock<HashMap<u64, Vec<ValueId>>>,
}

/// Parsed positions of the dictionary section; values stay in the file bytes.
#[derive(Debug)]
pub struct Dictionary {
    fields: Vec<FieldDictionary>,
}

impl Dictionary {
    /// Parses the section `buf[start..end]` for `num_fields` fields.
    ///
    /// # Errors
    ///
    /// Returns `CorruptedDictionary` if a field's offsets are inconsistent.
    pub fn parse(buf: &[u8], start: usize, end: usize, num_fields: usize) -> Result<Self> {
        let section = slice_at(buf, 0, end)?;
        let mut pos = start;
        let mut fields = Vec::with_capacity(num_fields);

        for field in 0..num_fields {
            let corrupted = |_| TrailError::CorruptedDictionary(field as FieldId);
            let count = read_u32(section, pos).map_err(corrupted)?;
            let offsets_pos = pos + 4;
            let blob_pos = offsets_pos + 8 * (count as usize + 1);
            let blob_len = read_u64(section, blob_pos - 8).map_err(corrupted)? as usize;
            slice_at(section, blob_pos, blob_len).map_err(corrupted)?;

            fields.push(FieldDictionary {
                count,
                offsets_pos,
                blob_pos,
                blob_len,
                by_hash: OnceLock::new(),
            });
            pos = blob_pos + blob_len;
        }

        if pos != end {
            return Err(TrailError::Corrupted(format!(
                "dictionary ends at {pos}, expected {end}"
            )));
        }
        Ok(Self { fields })
    }

    /// Returns the number of non-empty values of `field`.
    pub fn num_values(&self, field: FieldId) -> u32 {
        self.fields
            .get(field as usize)
            .map(|f| f.count)
            .unwrap_or(0)
    }

    /// Resolves an item to its raw bytes within `buf`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownItem` if the field or value id is out of range.
    pub fn value<'a>(&self, buf: &'a [u8], item: Item) -> Result<&'a [u8]> {
        let dict = self
            .fields
            .get(item.field() as usize)
            .ok_or(TrailError::UnknownItem(item))?;
        let value = item.value();
        if value == 0 {
            return Ok(&[]);
        }
        if value > dict.count {
            return Err(TrailError::UnknownItem(item));
        }

        let corrupted = |_| TrailError::CorruptedDictionary(item.field());
        let at = dict.offsets_pos + 8 * (value as usize - 1);
        let start = read_u64(buf, at).map_err(corrupted)? as usize;
        let end = read_u64(buf, at + 8).map_err(corrupted)? as usize;
        if start > end || end > dict.blob_len {
            return Err(TrailError::CorruptedDictionary(item.field()));
        }
        slice_at(buf, dict.blob_pos + start, end - start).map_err(corrupted)
    }

    /// Finds the item of `raw` in `field`, if that value was ever interned.
    pub fn find(&self, buf: &[u8], field: FieldId, raw: &[u8]) -> Option<Item> {
        let dict = self.fields.get(field as usize)?;
        if raw.is_empty() {
            return Some(Item::empty(field));
        }

        let by_hash = dict.by_hash.get_or_init(|| {
            let mut map: HashMap<u64, Vec<ValueId>> = HashMap::with_capacity(dict.count as usize);
            for value in 1..=dict.count {
                if let Ok(bytes) = self.value(buf, Item::new(field, value)) {
                    map.entry(xxh64(bytes, 0)).or_default().push(value);
                }
            }
            map
        });

        by_hash
            .get(&xxh64(raw, 0))?
            .iter()
            .map(|&value| Item::new(field, value))
            .find(|&item| self.value(buf, item).ok() == Some(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> (Vec<u8>, ValueInterner) {
        let mut interner = ValueInterner::new(3).unwrap();
        interner.intern(0, b"alpha").unwrap();
        interner.intern(0, b"beta").unwrap();
        interner.intern(2, &[0u8; 300]).unwrap();

        let mut buf = Vec::new();
        let written = write_dictionary(&mut buf, &interner).unwrap();
        assert_eq!(written as usize, buf.len());
        (buf, interner)
    }

    #[test]
    fn test_dictionary_roundtrip() {
        let (buf, interner) = build();
        let dict = Dictionary::parse(&buf, 0, buf.len(), 3).unwrap();

        assert_eq!(dict.num_values(0), 2);
        assert_eq!(dict.num_values(1), 0);
        assert_eq!(dict.num_values(2), 1);

        for field in 0..3u8 {
            for (i, expected) in interner.values(field as usize).iter().enumerate() {
                let item = Item::new(field, i as u32 + 1);
                assert_eq!(dict.value(&buf, item).unwrap(), expected.as_slice());
            }
        }
    }

    #[test]
    fn test_sentinel_and_unknown() {
        let (buf, _) = build();
        let dict = Dictionary::parse(&buf, 0, buf.len(), 3).unwrap();

        assert_eq!(dict.value(&buf, Item::empty(1)).unwrap(), b"");
        assert!(matches!(
            dict.value(&buf, Item::new(0, 3)),
            Err(TrailError::UnknownItem(_))
        ));
        assert!(matches!(
            dict.value(&buf, Item::new(5, 1)),
            Err(TrailError::UnknownItem(_))
        ));
    }

    #[test]
    fn test_find() {
        let (buf, _) = build();
        let dict = Dictionary::parse(&buf, 0, buf.len(), 3).unwrap();

        assert_eq!(dict.find(&buf, 0, b"beta"), Some(Item::new(0, 2)));
        assert_eq!(dict.find(&buf, 0, b"gamma"), None);
        assert_eq!(dict.find(&buf, 1, b"alpha"), None);
        assert_eq!(dict.find(&buf, 1, b""), Some(Item::empty(1)));
        assert_eq!(dict.find(&buf, 9, b"alpha"), None);
    }

    #[test]
    fn test_truncated_section() {
        let (buf, _) = build();
        assert!(Dictionary::parse(&buf, 0, buf.len() - 1, 3).is_err());
    }
}
