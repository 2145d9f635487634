//! Read path: open a finalized store, resolve entities, replay trails.
//!
//! The file is mapped read-only and never copied. A [`TrailDb`] holds no
//! mutable state besides lazily built reverse-lookup tables, so one instance
//! can be shared by any number of threads; every [`Trail::iter`] call owns
//! its own cursor.

use crate::error::{Result, TrailError};
use crate::store::codec::TimestampDecoder;
use crate::store::dictionary::Dictionary;
use crate::store::file::{
    parse_fields, slice_at, StoreFooter, StoreHeader, TimestampEncoding, TrailBlockRef,
    FOOTER_SIZE, HEADER_SIZE,
};
use crate::store::index::EntityIndex;
use crate::types::{EntityId, Event, FieldId, Item, Timestamp};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options for trail replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrailFlags(u8);

impl TrailFlags {
    /// After the first event, emit only items whose value changed.
    pub const EDGE_ENCODED: u8 = 0b001;

    /// Creates flags with nothing set.
    pub fn new() -> Self {
        Self(0)
    }

    /// Creates flags from a raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Returns the raw u8 value.
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns flags with edge encoding set.
    pub fn edge_encoded() -> Self {
        Self(Self::EDGE_ENCODED)
    }

    /// Returns true if edge encoding is set.
    pub fn is_edge_encoded(self) -> bool {
        self.0 & Self::EDGE_ENCODED != 0
    }

    /// Sets edge encoding.
    pub fn set_edge_encoded(&mut self) {
        self.0 |= Self::EDGE_ENCODED;
    }
}

/// An opened, finalized trail store.
#[derive(Debug)]
pub struct TrailDb {
    path: PathBuf,
    mmap: Mmap,
    header: StoreHeader,
    footer: StoreFooter,
    fields: Vec<String>,
    dictionary: Dictionary,
    index: EntityIndex,
}

impl TrailDb {
    /// Opens a store file for reading.
    ///
    /// This method:
    /// 1. Maps the file read-only
    /// 2. Validates the header and footer
    /// 3. Verifies the file CRC
    /// 4. Locates the schema, dictionary, and entity index
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a valid store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: stores are write-once and only ever renamed into place
        // complete, so the mapped bytes do not change while we hold them.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(TrailError::Corrupted("file too small".into()));
        }
        let body_len = mmap.len() - FOOTER_SIZE;

        let header = StoreHeader::parse(&mmap)?;
        let footer = StoreFooter::parse(&mmap[body_len..])?;

        let actual = crc32fast::hash(&mmap[..body_len]);
        if actual != footer.file_crc32 {
            return Err(TrailError::ChecksumMismatch {
                expected: footer.file_crc32,
                actual,
            });
        }

        let sections = [
            footer.fields_offset,
            footer.dictionary_offset,
            footer.events_offset,
            footer.index_offset,
        ];
        if sections.windows(2).any(|w| w[0] > w[1])
            || footer.events_offset.checked_add(footer.events_size) != Some(footer.index_offset)
            || footer.index_offset.checked_add(footer.index_size) != Some(body_len as u64)
        {
            return Err(TrailError::Corrupted("section offsets out of order".into()));
        }

        let num_fields = header.num_fields as usize;
        let fields_len = (footer.dictionary_offset - footer.fields_offset) as usize;
        let fields = parse_fields(
            slice_at(&mmap, footer.fields_offset as usize, fields_len)?,
            num_fields,
        )?;
        let dictionary = Dictionary::parse(
            &mmap,
            footer.dictionary_offset as usize,
            footer.events_offset as usize,
            num_fields,
        )?;
        let index = EntityIndex::parse(
            &mmap,
            footer.index_offset as usize,
            footer.index_size as usize,
        )?;
        if index.len() != header.num_entities {
            return Err(TrailError::Corrupted(format!(
                "header has {} entities, index has {}",
                header.num_entities,
                index.len()
            )));
        }

        debug!(
            path = %path.display(),
            fields = num_fields,
            trails = header.num_entities,
            events = header.num_events,
            "opened trail store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            footer,
            fields,
            dictionary,
            index,
        })
    }

    /// Releases the mapping.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closed trail store");
    }

    /// Returns the path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file header.
    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Returns the file footer.
    pub fn footer(&self) -> &StoreFooter {
        &self.footer
    }

    /// Returns the field names in schema order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the number of trails.
    pub fn num_trails(&self) -> u64 {
        self.header.num_entities
    }

    /// Returns the number of events across all trails.
    pub fn num_events(&self) -> u64 {
        self.header.num_events
    }

    /// Returns the smallest stored timestamp.
    pub fn min_timestamp(&self) -> Timestamp {
        self.header.min_timestamp
    }

    /// Returns the largest stored timestamp.
    pub fn max_timestamp(&self) -> Timestamp {
        self.header.max_timestamp
    }

    /// Returns the index of a field by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the schema has no such field.
    pub fn field(&self, name: &str) -> Result<FieldId> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|i| i as FieldId)
            .ok_or_else(|| TrailError::UnknownField(name.to_string()))
    }

    /// Returns the name of a field.
    pub fn field_name(&self, field: FieldId) -> Option<&str> {
        self.fields.get(field as usize).map(String::as_str)
    }

    /// Returns the number of distinct non-empty values of a field.
    pub fn num_values(&self, field: FieldId) -> u32 {
        self.dictionary.num_values(field)
    }

    /// Resolves an entity id to its ordinal.
    pub fn get_entity_ordinal(&self, id: &EntityId) -> Option<u64> {
        self.index.lookup(&self.mmap, id)
    }

    /// Returns the entity id of an ordinal.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` for ordinals past the end.
    pub fn get_uuid(&self, ordinal: u64) -> Result<EntityId> {
        Ok(self.index.entry(&self.mmap, ordinal)?.id)
    }

    /// Returns the trail of an entity ordinal.
    ///
    /// The block checksum is verified here; iteration does not fail afterwards.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` for ordinals past the end, or a format error if
    /// the trail block is damaged.
    pub fn get_trail(&self, ordinal: u64) -> Result<Trail<'_>> {
        let entry = self.index.entry(&self.mmap, ordinal)?;
        let bytes = slice_at(
            &self.mmap,
            entry.block_offset as usize,
            entry.block_size as usize,
        )?;
        let block = TrailBlockRef::parse(bytes, self.num_fields())?;
        if block.event_count as u64 != entry.event_count {
            return Err(TrailError::Corrupted(format!(
                "trail {ordinal} has {} events, index says {}",
                block.event_count, entry.event_count
            )));
        }
        Ok(Trail {
            ordinal,
            id: entry.id,
            num_fields: self.num_fields(),
            block,
        })
    }

    /// Returns the trail of an entity id.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the id has no trail.
    pub fn get_trail_by_id(&self, id: &EntityId) -> Result<Trail<'_>> {
        let ordinal = self
            .get_entity_ordinal(id)
            .ok_or(TrailError::EntityNotFound(*id))?;
        self.get_trail(ordinal)
    }

    /// Replays a trail into a flat buffer and returns the number of events.
    ///
    /// Each event is written as `[timestamp, item, item, .., 0]`, items as
    /// their raw encoding. `buf` is cleared first.
    ///
    /// # Errors
    ///
    /// Same as [`TrailDb::get_trail`].
    pub fn get_trail_into(
        &self,
        ordinal: u64,
        buf: &mut Vec<u64>,
        flags: TrailFlags,
    ) -> Result<u64> {
        let trail = self.get_trail(ordinal)?;
        buf.clear();
        buf.reserve(trail.len() * (self.num_fields() + 2));

        let mut count = 0;
        for event in trail.iter_with(flags) {
            buf.push(event.timestamp);
            buf.extend(event.items.iter().map(|item| item.raw() as u64));
            buf.push(0);
            count += 1;
        }
        Ok(count)
    }

    /// Iterates every trail in ordinal order.
    pub fn trails(&self) -> impl Iterator<Item = Result<Trail<'_>>> + '_ {
        (0..self.num_trails()).map(move |ordinal| self.get_trail(ordinal))
    }

    /// Returns the raw value of an item.
    ///
    /// # Errors
    ///
    /// Returns `UnknownItem` if the item was never interned in this store.
    pub fn get_item_value(&self, item: Item) -> Result<&[u8]> {
        self.dictionary.value(&self.mmap, item)
    }

    /// Returns the field and raw value of an item.
    ///
    /// # Errors
    ///
    /// Returns `UnknownItem` if the item was never interned in this store.
    pub fn value_of(&self, item: Item) -> Result<(FieldId, &[u8])> {
        Ok((item.field(), self.get_item_value(item)?))
    }

    /// Returns the item of a raw value, if it occurs in the store.
    pub fn get_item(&self, field: FieldId, raw: &[u8]) -> Option<Item> {
        self.dictionary.find(&self.mmap, field, raw)
    }

    /// Recomputes the file CRC and compares it with the footer.
    pub fn verify_file_checksum(&self) -> bool {
        let body_len = self.mmap.len() - FOOTER_SIZE;
        crc32fast::hash(&self.mmap[..body_len]) == self.footer.file_crc32
    }
}

/// A handle to one entity's trail. Cheap to copy; iterate as often as needed.
#[derive(Debug, Clone, Copy)]
pub struct Trail<'a> {
    ordinal: u64,
    id: EntityId,
    num_fields: usize,
    block: TrailBlockRef<'a>,
}

impl<'a> Trail<'a> {
    /// Returns the entity ordinal.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Returns the entity id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the number of events.
    pub fn len(&self) -> usize {
        self.block.event_count as usize
    }

    /// Returns true if the trail has no events.
    pub fn is_empty(&self) -> bool {
        self.block.event_count == 0
    }

    /// Starts a replay from the first event.
    pub fn iter(&self) -> TrailCursor<'a> {
        self.iter_with(TrailFlags::new())
    }

    /// Starts a replay from the first event with the given flags.
    pub fn iter_with(&self, flags: TrailFlags) -> TrailCursor<'a> {
        let timestamps = match self.block.ts_encoding {
            TimestampEncoding::Raw => TimestampSource::Raw(self.block.ts_data),
            TimestampEncoding::DeltaOfDelta => {
                TimestampSource::Delta(TimestampDecoder::new(self.block.ts_data))
            }
        };
        TrailCursor {
            timestamps,
            items: self.block.items,
            num_fields: self.num_fields,
            position: 0,
            count: self.block.event_count as usize,
            previous: flags.is_edge_encoded().then(Vec::new),
        }
    }
}

impl<'a> IntoIterator for &Trail<'a> {
    type Item = Event;
    type IntoIter = TrailCursor<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
enum TimestampSource<'a> {
    Raw(&'a [u8]),
    Delta(TimestampDecoder<'a>),
}

/// Forward cursor over a trail's events.
#[derive(Debug, Clone)]
pub struct TrailCursor<'a> {
    timestamps: TimestampSource<'a>,
    items: &'a [u8],
    num_fields: usize,
    position: usize,
    count: usize,
    /// Items of the previous event, present only for edge-encoded replay.
    previous: Option<Vec<Item>>,
}

impl TrailCursor<'_> {
    fn next_timestamp(&mut self) -> Option<Timestamp> {
        match &mut self.timestamps {
            TimestampSource::Raw(data) => {
                let bytes = data.get(self.position * 8..self.position * 8 + 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Some(Timestamp::from_le_bytes(raw))
            }
            TimestampSource::Delta(decoder) => decoder.decode_next(),
        }
    }

    fn item_at(&self, event: usize, field: usize) -> Option<Item> {
        let at = (event * self.num_fields + field) * 4;
        let bytes = self.items.get(at..at + 4)?;
        Item::from_raw(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Iterator for TrailCursor<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.count {
            return None;
        }
        let timestamp = self.next_timestamp()?;
        let event = self.position;
        let items = (0..self.num_fields)
            .map(|field| self.item_at(event, field))
            .collect::<Option<Vec<_>>>()?;
        self.position += 1;

        let items = match &mut self.previous {
            None => items,
            Some(previous) if previous.is_empty() => {
                previous.clone_from(&items);
                items
            }
            Some(previous) => {
                let changed = items
                    .iter()
                    .zip(previous.iter())
                    .filter(|(now, before)| now != before)
                    .map(|(now, _)| *now)
                    .collect();
                previous.clone_from(&items);
                changed
            }
        };

        Some(Event { timestamp, items })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.position;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::encode_trail_block;

    #[test]
    fn test_trail_flags() {
        let mut flags = TrailFlags::new();
        assert!(!flags.is_edge_encoded());
        flags.set_edge_encoded();
        assert!(flags.is_edge_encoded());
        assert_eq!(flags, TrailFlags::edge_encoded());
        assert_eq!(TrailFlags::from_u8(flags.as_u8()), flags);
    }

    fn trail(block: &[u8], num_fields: usize) -> Trail<'_> {
        Trail {
            ordinal: 0,
            id: EntityId::new([1; 16]),
            num_fields,
            block: TrailBlockRef::parse(block, num_fields).unwrap(),
        }
    }

    #[test]
    fn test_cursor_both_encodings() {
        let timestamps = [5, 6, 6, 100];
        let items: Vec<Item> = (0..8).map(|v| Item::new((v % 2) as u8, v / 2 + 1)).collect();

        for encoding in [TimestampEncoding::Raw, TimestampEncoding::DeltaOfDelta] {
            let block = encode_trail_block(&timestamps, &items, encoding).unwrap();
            let trail = trail(&block, 2);
            let events: Vec<Event> = trail.iter().collect();

            assert_eq!(events.len(), 4);
            assert_eq!(trail.iter().size_hint(), (4, Some(4)));
            for (i, event) in events.iter().enumerate() {
                assert_eq!(event.timestamp, timestamps[i]);
                assert_eq!(event.items, items[i * 2..i * 2 + 2].to_vec());
            }
        }
    }

    #[test]
    fn test_cursor_edge_encoded() {
        let a = Item::new(0, 1);
        let b = Item::new(0, 2);
        let x = Item::new(1, 1);
        let items = [a, x, a, x, b, x, b, Item::empty(1)];
        let block = encode_trail_block(&[1, 2, 3, 4], &items, TimestampEncoding::Raw).unwrap();
        let trail = trail(&block, 2);

        let events: Vec<Vec<Item>> = trail
            .iter_with(TrailFlags::edge_encoded())
            .map(|e| e.items)
            .collect();
        assert_eq!(
            events,
            vec![vec![a, x], vec![], vec![b], vec![Item::empty(1)]]
        );

        // Restarting yields the full first event again
        let first = trail.iter_with(TrailFlags::edge_encoded()).next().unwrap();
        assert_eq!(first.items, vec![a, x]);
    }
}
