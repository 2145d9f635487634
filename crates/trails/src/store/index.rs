//! Entity index section: entity id → trail block.
//!
//! ```text
//! entity_count  u64 LE
//! ordinal table entity_count × 40 bytes, in ordinal order
//!               id[16] block_offset u64 block_size u64 event_count u64
//! lookup table  entity_count × 24 bytes, sorted by id
//!               id[16] ordinal u64
//! bloom filter  see `BloomFilter::write_to`
//! ```
//!
//! Lookups check the bloom filter, then binary-search the lookup table. Both
//! tables are read in place from the mapped file.

use crate::error::{Result, TrailError};
use crate::store::file::{read_u32, read_u64, slice_at};
use crate::types::{EntityId, ENTITY_ID_LEN};
use std::cmp::Ordering;
use std::io::Write;
use xxhash_rust::xxh64::xxh64;

/// Size of one ordinal table record.
pub const ORDINAL_RECORD_SIZE: usize = ENTITY_ID_LEN + 24;

/// Size of one lookup table record.
pub const LOOKUP_RECORD_SIZE: usize = ENTITY_ID_LEN + 8;

/// Number of hash functions for the bloom filter.
const BLOOM_FILTER_DEFAULT_HASH_COUNT: u8 = 3;

/// Location of one entity's trail block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailIndexEntry {
    /// External identifier.
    pub id: EntityId,
    /// Offset of the trail block from file start.
    pub block_offset: u64,
    /// Size of the trail block in bytes.
    pub block_size: u64,
    /// Number of events in the trail.
    pub event_count: u64,
}

impl TrailIndexEntry {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.id.as_bytes())?;
        writer.write_all(&self.block_offset.to_le_bytes())?;
        writer.write_all(&self.block_size.to_le_bytes())?;
        writer.write_all(&self.event_count.to_le_bytes())?;
        Ok(())
    }

    fn parse(record: &[u8]) -> Result<Self> {
        Ok(Self {
            id: EntityId::from_slice(slice_at(record, 0, ENTITY_ID_LEN)?)?,
            block_offset: read_u64(record, ENTITY_ID_LEN)?,
            block_size: read_u64(record, ENTITY_ID_LEN + 8)?,
            event_count: read_u64(record, ENTITY_ID_LEN + 16)?,
        })
    }
}

/// Bloom filter for fast entity existence checks.
///
/// `h_i(x) = xxhash64(x, seed=i) % size_bits` for `i < hash_count`.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    hash_count: u8,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at roughly 1% false positives.
    pub fn new(expected_items: usize) -> Self {
        let num_bits = (expected_items * 10).max(64);
        Self {
            bits: vec![0u64; num_bits.div_ceil(64)],
            hash_count: BLOOM_FILTER_DEFAULT_HASH_COUNT,
        }
    }

    fn bit_positions<'a>(&'a self, id: &'a EntityId) -> impl Iterator<Item = (usize, u64)> + 'a {
        let num_bits = (self.bits.len() * 64) as u64;
        (0..self.hash_count).map(move |seed| {
            let bit = xxh64(id.as_bytes(), seed as u64) % num_bits;
            ((bit / 64) as usize, 1u64 << (bit % 64))
        })
    }

    /// Adds an entity id.
    pub fn insert(&mut self, id: &EntityId) {
        let positions: Vec<_> = self.bit_positions(id).collect();
        for (word, mask) in positions {
            self.bits[word] |= mask;
        }
    }

    /// Returns false if `id` is definitely absent.
    pub fn maybe_contains(&self, id: &EntityId) -> bool {
        self.bit_positions(id)
            .all(|(word, mask)| self.bits[word] & mask != 0)
    }

    /// Writes the filter and returns the bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        writer.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        writer.write_all(&[self.hash_count, 0, 0, 0])?;
        for word in &self.bits {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(8 + 8 * self.bits.len() as u64)
    }

    /// Parses a filter from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let num_words = read_u32(buf, 0)? as usize;
        let hash_count = slice_at(buf, 4, 1)?[0];
        if num_words == 0 {
            return Err(TrailError::Corrupted("empty bloom filter".into()));
        }
        let bits = (0..num_words)
            .map(|i| read_u64(buf, 8 + i * 8))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { bits, hash_count })
    }
}

/// Accumulates index entries while trail blocks are written.
#[derive(Debug, Default)]
pub struct EntityIndexWriter {
    entries: Vec<TrailIndexEntry>,
}

impl EntityIndexWriter {
    /// Creates an empty index writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the next entity's trail. Entries are pushed in ordinal order.
    pub fn push(&mut self, entry: TrailIndexEntry) {
        self.entries.push(entry);
    }

    /// Writes the section and returns the bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let count = self.entries.len();
        writer.write_all(&(count as u64).to_le_bytes())?;

        let mut bloom = BloomFilter::new(count);
        for entry in &self.entries {
            entry.write_to(writer)?;
            bloom.insert(&entry.id);
        }

        let mut sorted: Vec<(EntityId, u64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(ordinal, e)| (e.id, ordinal as u64))
            .collect();
        sorted.sort_unstable();
        for (id, ordinal) in &sorted {
            writer.write_all(id.as_bytes())?;
            writer.write_all(&ordinal.to_le_bytes())?;
        }

        let bloom_size = bloom.write_to(writer)?;
        Ok(8 + (count * (ORDINAL_RECORD_SIZE + LOOKUP_RECORD_SIZE)) as u64 + bloom_size)
    }
}

/// Read-side view of the entity index section.
#[derive(Debug)]
pub struct EntityIndex {
    count: u64,
    ordinals_pos: usize,
    lookup_pos: usize,
    bloom: BloomFilter,
}

impl EntityIndex {
    /// Parses the section at `buf[start..start + size]`.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the tables do not fit the section.
    pub fn parse(buf: &[u8], start: usize, size: usize) -> Result<Self> {
        let section = slice_at(buf, start, size)?;
        let count = read_u64(section, 0)?;
        let tables = (count as usize)
            .checked_mul(ORDINAL_RECORD_SIZE + LOOKUP_RECORD_SIZE)
            .ok_or_else(|| TrailError::Corrupted("entity count overflow".into()))?;
        slice_at(section, 8, tables)?;

        let ordinals_pos = start + 8;
        let lookup_pos = ordinals_pos + count as usize * ORDINAL_RECORD_SIZE;
        let bloom = BloomFilter::parse(&section[8 + tables..])?;

        Ok(Self {
            count,
            ordinals_pos,
            lookup_pos,
            bloom,
        })
    }

    /// Returns the number of entities.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Returns true if the store has no entities.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the trail location of an ordinal.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` for ordinals past the end.
    pub fn entry(&self, buf: &[u8], ordinal: u64) -> Result<TrailIndexEntry> {
        if ordinal >= self.count {
            return Err(TrailError::UnknownEntity(ordinal));
        }
        let at = self.ordinals_pos + ordinal as usize * ORDINAL_RECORD_SIZE;
        TrailIndexEntry::parse(slice_at(buf, at, ORDINAL_RECORD_SIZE)?)
    }

    /// Finds the ordinal of `id` by exact match.
    pub fn lookup(&self, buf: &[u8], id: &EntityId) -> Option<u64> {
        if !self.bloom.maybe_contains(id) {
            return None;
        }

        let mut lo = 0usize;
        let mut hi = self.count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let at = self.lookup_pos + mid * LOOKUP_RECORD_SIZE;
            let record = slice_at(buf, at, LOOKUP_RECORD_SIZE).ok()?;
            match record[..ENTITY_ID_LEN].cmp(id.as_bytes().as_slice()) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return read_u64(record, ENTITY_ID_LEN).ok(),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> EntityId {
        let mut raw = [0u8; 16];
        raw[0] = n.wrapping_mul(37);
        raw[15] = n;
        EntityId::new(raw)
    }

    fn build(count: u8) -> Vec<u8> {
        let mut writer = EntityIndexWriter::new();
        for n in 0..count {
            writer.push(TrailIndexEntry {
                id: id(n),
                block_offset: 1000 + n as u64 * 10,
                block_size: 10,
                event_count: n as u64,
            });
        }
        let mut buf = Vec::new();
        let written = writer.write_to(&mut buf).unwrap();
        assert_eq!(written as usize, buf.len());
        buf
    }

    #[test]
    fn test_lookup_every_entity() {
        let buf = build(50);
        let index = EntityIndex::parse(&buf, 0, buf.len()).unwrap();
        assert_eq!(index.len(), 50);

        for n in 0..50u8 {
            let ordinal = index.lookup(&buf, &id(n)).unwrap();
            assert_eq!(ordinal, n as u64);
            let entry = index.entry(&buf, ordinal).unwrap();
            assert_eq!(entry.id, id(n));
            assert_eq!(entry.block_offset, 1000 + n as u64 * 10);
            assert_eq!(entry.event_count, n as u64);
        }
    }

    #[test]
    fn test_lookup_missing() {
        let buf = build(10);
        let index = EntityIndex::parse(&buf, 0, buf.len()).unwrap();

        assert_eq!(index.lookup(&buf, &EntityId::new([0xee; 16])), None);
        assert!(matches!(
            index.entry(&buf, 10),
            Err(TrailError::UnknownEntity(10))
        ));
    }

    #[test]
    fn test_empty_index() {
        let buf = build(0);
        let index = EntityIndex::parse(&buf, 0, buf.len()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.lookup(&buf, &id(1)), None);
    }

    #[test]
    fn test_bloom_filter() {
        let mut bloom = BloomFilter::new(100);
        bloom.insert(&id(1));
        bloom.insert(&id(2));

        assert!(bloom.maybe_contains(&id(1)));
        assert!(bloom.maybe_contains(&id(2)));

        let false_positives = (3..100u8).filter(|&n| bloom.maybe_contains(&id(n))).count();
        assert!(false_positives < 50);
    }

    #[test]
    fn test_bloom_filter_roundtrip() {
        let mut bloom = BloomFilter::new(10);
        bloom.insert(&id(7));
        let mut buf = Vec::new();
        bloom.write_to(&mut buf).unwrap();

        let parsed = BloomFilter::parse(&buf).unwrap();
        assert!(parsed.maybe_contains(&id(7)));
    }
}
