//! Trail store file format.
//!
//! A finalized store is a single immutable file:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  File Header (48 bytes)                                      │
//! │  - Magic: "ATRL" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Field Count: u16 (2 bytes)                                │
//! │  - Entity Count: u64 (8 bytes)                               │
//! │  - Event Count: u64 (8 bytes)                                │
//! │  - Min Timestamp: u64 (8 bytes)                              │
//! │  - Max Timestamp: u64 (8 bytes)                              │
//! │  - Compression: u8 (1 byte)                                  │
//! │  - Reserved: 7 bytes                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Field Schema                                                │
//! │  - Per field: name_len u16 + name                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Item Dictionary (see `dictionary`)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Trail Blocks (one per entity, in ordinal order)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entity Index (see `index`)                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Footer (64 bytes)                                           │
//! │  - Section offsets and sizes, file CRC, reverse magic        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use crate::cons::interner::ValueInterner;
use crate::error::{Result, TrailError};
use crate::store::codec::encode_timestamps;
use crate::store::dictionary::write_dictionary;
use crate::store::index::{EntityIndexWriter, TrailIndexEntry};
use crate::types::{EntityId, Item, Timestamp};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the file header: "ATRL"
pub const STORE_MAGIC: [u8; 4] = *b"ATRL";

/// Reverse magic bytes for the file footer: "LRTA"
pub const STORE_MAGIC_REVERSE: [u8; 4] = *b"LRTA";

/// Current file format version.
pub const STORE_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 48;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 64;

/// Fixed part of a trail block before the timestamp data.
pub const BLOCK_PREFIX_SIZE: usize = 9;

/// Size of the CRC trailing every trail block.
pub const BLOCK_CRC_SIZE: usize = 4;

/// Compression applied to trail blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// Fixed-width timestamps and items.
    #[default]
    Raw = 0,
    /// Delta-of-delta timestamps, fixed-width items.
    Delta = 1,
}

impl CompressionType {
    /// Creates a CompressionType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Raw),
            1 => Some(Self::Delta),
            _ => None,
        }
    }

    fn timestamp_encoding(self) -> TimestampEncoding {
        match self {
            Self::Raw => TimestampEncoding::Raw,
            Self::Delta => TimestampEncoding::DeltaOfDelta,
        }
    }
}

/// Timestamp encoding of a single trail block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimestampEncoding {
    /// 8 bytes per event.
    #[default]
    Raw = 0,
    /// Delta-of-delta bit stream.
    DeltaOfDelta = 1,
}

impl TimestampEncoding {
    /// Creates a TimestampEncoding from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Raw),
            1 => Some(Self::DeltaOfDelta),
            _ => None,
        }
    }
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

/// Reads a little-endian u32 at `at`, failing if `buf` is too short.
pub(crate) fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    slice_at(buf, at, 4).map(|b| u32_at(b, 0))
}

/// Reads a little-endian u64 at `at`, failing if `buf` is too short.
pub(crate) fn read_u64(buf: &[u8], at: usize) -> Result<u64> {
    slice_at(buf, at, 8).map(|b| u64_at(b, 0))
}

/// Returns `buf[start..start + len]`, failing if the range is out of bounds.
pub(crate) fn slice_at(buf: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| buf.get(start..end))
        .ok_or_else(|| TrailError::Corrupted(format!("range {start}+{len} past end")))
}

/// Store file header (48 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    /// Magic bytes: "ATRL"
    pub magic: [u8; 4],
    /// File format version.
    pub version: u16,
    /// Number of fields in the schema.
    pub num_fields: u16,
    /// Number of trails.
    pub num_entities: u64,
    /// Number of events across all trails.
    pub num_events: u64,
    /// Smallest timestamp stored.
    pub min_timestamp: Timestamp,
    /// Largest timestamp stored.
    pub max_timestamp: Timestamp,
    /// Compression applied to trail blocks.
    pub compression: CompressionType,
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            num_fields: 0,
            num_entities: 0,
            num_events: 0,
            min_timestamp: 0,
            max_timestamp: 0,
            compression: CompressionType::default(),
        }
    }
}

impl StoreHeader {
    /// Writes the header using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.num_fields.to_le_bytes())?;
        writer.write_all(&self.num_entities.to_le_bytes())?;
        writer.write_all(&self.num_events.to_le_bytes())?;
        writer.write_all(&self.min_timestamp.to_le_bytes())?;
        writer.write_all(&self.max_timestamp.to_le_bytes())?;
        writer.write_all(&[self.compression as u8])?;
        writer.write_all(&[0u8; 7])?;
        Ok(())
    }

    /// Parses a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMagic`, `UnsupportedVersion`, or `Corrupted` for a
    /// truncated buffer or unknown compression.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TrailError::Corrupted("file shorter than header".into()));
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != STORE_MAGIC {
            return Err(TrailError::InvalidMagic(magic));
        }

        let version = u16_at(buf, 4);
        if version != STORE_VERSION {
            return Err(TrailError::UnsupportedVersion(version));
        }

        let compression = CompressionType::from_u8(buf[40])
            .ok_or_else(|| TrailError::Corrupted(format!("unknown compression {}", buf[40])))?;

        Ok(Self {
            magic,
            version,
            num_fields: u16_at(buf, 6),
            num_entities: u64_at(buf, 8),
            num_events: u64_at(buf, 16),
            min_timestamp: u64_at(buf, 24),
            max_timestamp: u64_at(buf, 32),
            compression,
        })
    }
}

/// Store file footer (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFooter {
    /// Offset of the field schema section.
    pub fields_offset: u64,
    /// Offset of the dictionary section.
    pub dictionary_offset: u64,
    /// Offset of the first trail block.
    pub events_offset: u64,
    /// Total size of all trail blocks.
    pub events_size: u64,
    /// Offset of the entity index section.
    pub index_offset: u64,
    /// Size of the entity index section.
    pub index_size: u64,
    /// CRC32 of everything before the footer.
    pub file_crc32: u32,
    /// Reverse magic bytes: "LRTA"
    pub magic_reverse: [u8; 4],
}

impl Default for StoreFooter {
    fn default() -> Self {
        Self {
            fields_offset: HEADER_SIZE as u64,
            dictionary_offset: HEADER_SIZE as u64,
            events_offset: HEADER_SIZE as u64,
            events_size: 0,
            index_offset: HEADER_SIZE as u64,
            index_size: 0,
            file_crc32: 0,
            magic_reverse: STORE_MAGIC_REVERSE,
        }
    }
}

impl StoreFooter {
    /// Writes the footer using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.fields_offset.to_le_bytes())?;
        writer.write_all(&self.dictionary_offset.to_le_bytes())?;
        writer.write_all(&self.events_offset.to_le_bytes())?;
        writer.write_all(&self.events_size.to_le_bytes())?;
        writer.write_all(&self.index_offset.to_le_bytes())?;
        writer.write_all(&self.index_size.to_le_bytes())?;
        writer.write_all(&self.file_crc32.to_le_bytes())?;
        writer.write_all(&self.magic_reverse)?;
        writer.write_all(&[0u8; 8])?;
        Ok(())
    }

    /// Parses a footer from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMagic` if the reverse magic bytes don't match.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FOOTER_SIZE {
            return Err(TrailError::Corrupted("file shorter than footer".into()));
        }

        let magic_reverse = [buf[52], buf[53], buf[54], buf[55]];
        if magic_reverse != STORE_MAGIC_REVERSE {
            return Err(TrailError::InvalidMagic(magic_reverse));
        }

        Ok(Self {
            fields_offset: u64_at(buf, 0),
            dictionary_offset: u64_at(buf, 8),
            events_offset: u64_at(buf, 16),
            events_size: u64_at(buf, 24),
            index_offset: u64_at(buf, 32),
            index_size: u64_at(buf, 40),
            file_crc32: u32_at(buf, 48),
            magic_reverse,
        })
    }
}

/// Writes the field schema section.
fn write_fields<W: Write>(writer: &mut W, fields: &[String]) -> Result<u64> {
    let mut written = 0u64;
    for name in fields {
        let bytes = name.as_bytes();
        writer.write_all(&(bytes.len() as u16).to_le_bytes())?;
        writer.write_all(bytes)?;
        written += 2 + bytes.len() as u64;
    }
    Ok(written)
}

/// Parses the field schema section.
pub(crate) fn parse_fields(buf: &[u8], num_fields: usize) -> Result<Vec<String>> {
    let mut fields = Vec::with_capacity(num_fields);
    let mut pos = 0usize;
    for _ in 0..num_fields {
        let len = slice_at(buf, pos, 2).map(|b| u16_at(b, 0) as usize)?;
        let name = slice_at(buf, pos + 2, len)?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|e| TrailError::Corrupted(format!("invalid UTF-8 in field name: {e}")))?;
        fields.push(name);
        pos += 2 + len;
    }
    Ok(fields)
}

/// Encodes one trail as a block.
///
/// ## Binary Layout
///
/// ```text
/// Offset  Size    Field
/// ------  ----    -----
/// 0x00    4       event_count (u32 LE)
/// 0x04    1       ts_encoding (u8)
/// 0x05    4       ts_data_size (u32 LE)
/// 0x09    N       ts_data[ts_data_size]
/// 0x09+N  M       items (u32 LE, event_count × num_fields)
/// 0x09+N+M 4      block_crc32 (u32 LE)
/// ```
///
/// # Errors
///
/// Returns `CapacityExceeded` if the event count or the encoded timestamps
/// do not fit the block's 32-bit length fields.
pub fn encode_trail_block(
    timestamps: &[Timestamp],
    items: &[Item],
    encoding: TimestampEncoding,
) -> Result<Vec<u8>> {
    let event_count = block_len(timestamps.len(), "events per trail")?;
    let ts_data: Vec<u8> = match encoding {
        TimestampEncoding::Raw => timestamps.iter().flat_map(|ts| ts.to_le_bytes()).collect(),
        TimestampEncoding::DeltaOfDelta => encode_timestamps(timestamps),
    };
    let ts_data_size = block_len(ts_data.len(), "timestamp bytes per trail")?;

    let mut block =
        Vec::with_capacity(BLOCK_PREFIX_SIZE + ts_data.len() + items.len() * 4 + BLOCK_CRC_SIZE);
    block.extend_from_slice(&event_count.to_le_bytes());
    block.push(encoding as u8);
    block.extend_from_slice(&ts_data_size.to_le_bytes());
    block.extend_from_slice(&ts_data);
    for item in items {
        block.extend_from_slice(&item.raw().to_le_bytes());
    }
    let crc = crc32fast::hash(&block);
    block.extend_from_slice(&crc.to_le_bytes());
    Ok(block)
}

fn block_len(len: usize, what: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| TrailError::CapacityExceeded {
        what,
        limit: u64::from(u32::MAX),
    })
}

/// A parsed, checksum-verified view of a trail block.
#[derive(Debug, Clone, Copy)]
pub struct TrailBlockRef<'a> {
    /// Number of events.
    pub event_count: u32,
    /// Encoding of `ts_data`.
    pub ts_encoding: TimestampEncoding,
    /// Encoded timestamps.
    pub ts_data: &'a [u8],
    /// Item matrix, `event_count × num_fields` little-endian u32.
    pub items: &'a [u8],
}

impl<'a> TrailBlockRef<'a> {
    /// Parses and verifies a block.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` if the block CRC fails, `Corrupted` if the
    /// sizes are inconsistent with `num_fields`.
    pub fn parse(block: &'a [u8], num_fields: usize) -> Result<Self> {
        if block.len() < BLOCK_PREFIX_SIZE + BLOCK_CRC_SIZE {
            return Err(TrailError::Corrupted("trail block too short".into()));
        }
        let body_len = block.len() - BLOCK_CRC_SIZE;
        let expected = u32_at(block, body_len);
        let actual = crc32fast::hash(&block[..body_len]);
        if expected != actual {
            return Err(TrailError::ChecksumMismatch { expected, actual });
        }

        let event_count = u32_at(block, 0);
        let ts_encoding = TimestampEncoding::from_u8(block[4])
            .ok_or_else(|| TrailError::Corrupted(format!("unknown ts encoding {}", block[4])))?;
        let ts_len = u32_at(block, 5) as usize;
        let ts_data = slice_at(&block[..body_len], BLOCK_PREFIX_SIZE, ts_len)?;
        let items = &block[BLOCK_PREFIX_SIZE + ts_len..body_len];

        if ts_encoding == TimestampEncoding::Raw && ts_len != event_count as usize * 8 {
            return Err(TrailError::Corrupted("raw timestamp size mismatch".into()));
        }
        if items.len() != event_count as usize * num_fields * 4 {
            return Err(TrailError::Corrupted("item matrix size mismatch".into()));
        }

        Ok(Self {
            event_count,
            ts_encoding,
            ts_data,
            items,
        })
    }
}

/// Handle to a finished store file.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    /// Path to the store file.
    pub path: PathBuf,
    /// The header of the file.
    pub header: StoreHeader,
    /// The footer of the file.
    pub footer: StoreFooter,
}

/// Store file writer.
///
/// Writes a store with the following sequence:
/// 1. Header placeholder (48 bytes)
/// 2. Field schema and item dictionary
/// 3. Trail blocks, one per entity
/// 4. Entity index
/// 5. Final header and footer (64 bytes, with file CRC)
pub struct StoreWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    position: u64,
    header: StoreHeader,
    footer: StoreFooter,
    index: EntityIndexWriter,
}

impl StoreWriter {
    /// Creates the file at `path` and writes the schema and dictionary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn create(
        path: &Path,
        fields: &[String],
        interner: &ValueInterner,
        compression: CompressionType,
    ) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = StoreHeader {
            num_fields: fields.len() as u16,
            compression,
            ..StoreHeader::default()
        };
        header.write_to(&mut writer)?;
        let mut position = HEADER_SIZE as u64;

        let mut footer = StoreFooter {
            fields_offset: position,
            ..StoreFooter::default()
        };
        position += write_fields(&mut writer, fields)?;

        footer.dictionary_offset = position;
        position += write_dictionary(&mut writer, interner)?;

        footer.events_offset = position;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            position,
            header,
            footer,
            index: EntityIndexWriter::new(),
        })
    }

    /// Appends the trail of one entity. Trails must be written in ordinal order.
    ///
    /// `items` holds `timestamps.len() × num_fields` items, event-major.
    pub fn write_trail(
        &mut self,
        id: EntityId,
        timestamps: &[Timestamp],
        items: &[Item],
    ) -> Result<()> {
        debug_assert_eq!(items.len(), timestamps.len() * self.header.num_fields as usize);

        let block = encode_trail_block(
            timestamps,
            items,
            self.header.compression.timestamp_encoding(),
        )?;
        self.writer.write_all(&block)?;

        if let (Some(&first), Some(&last)) = (timestamps.first(), timestamps.last()) {
            if self.header.num_events == 0 {
                self.header.min_timestamp = first;
                self.header.max_timestamp = last;
            } else {
                self.header.min_timestamp = self.header.min_timestamp.min(first);
                self.header.max_timestamp = self.header.max_timestamp.max(last);
            }
        }
        self.header.num_entities += 1;
        self.header.num_events += timestamps.len() as u64;

        self.index.push(TrailIndexEntry {
            id,
            block_offset: self.position,
            block_size: block.len() as u64,
            event_count: timestamps.len() as u64,
        });
        self.position += block.len() as u64;
        Ok(())
    }

    /// Finishes the file: index, final header, footer, fsync.
    ///
    /// # Errors
    ///
    /// Returns an error if any I/O operation fails.
    pub fn finish(mut self) -> Result<StoreHandle> {
        self.footer.events_size = self.position - self.footer.events_offset;

        self.footer.index_offset = self.position;
        let index_size = self.index.write_to(&mut self.writer)?;
        self.footer.index_size = index_size;
        self.position += index_size;

        // Overwrite the placeholder header with the final counts
        self.writer.seek(SeekFrom::Start(0))?;
        self.header.write_to(&mut self.writer)?;
        self.writer.flush()?;
        self.writer.seek(SeekFrom::End(0))?;

        self.footer.file_crc32 = file_crc(&self.path, self.position)?;
        self.footer.write_to(&mut self.writer)?;

        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        Ok(StoreHandle {
            path: self.path,
            header: self.header,
            footer: self.footer,
        })
    }
}

/// Calculates the CRC32 of the first `size` bytes of a file.
fn file_crc(path: &Path, size: u64) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = [0u8; 8192];
    let mut remaining = size;

    while remaining > 0 {
        let to_read = remaining.min(buffer.len() as u64) as usize;
        let n = file.read(&mut buffer[..to_read])?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        remaining -= n as u64;
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        let mut buf = Vec::new();
        StoreHeader::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = StoreHeader {
            num_fields: 3,
            num_entities: 10,
            num_events: 500,
            min_timestamp: 1_400_000_000,
            max_timestamp: 1_500_000_000,
            compression: CompressionType::Delta,
            ..StoreHeader::default()
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(StoreHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            StoreHeader::parse(&buf),
            Err(TrailError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_header_other_versions() {
        for version in [0, STORE_VERSION + 1] {
            let mut buf = Vec::new();
            StoreHeader {
                version,
                ..StoreHeader::default()
            }
            .write_to(&mut buf)
            .unwrap();
            assert!(matches!(
                StoreHeader::parse(&buf),
                Err(TrailError::UnsupportedVersion(v)) if v == version
            ));
        }
    }

    #[test]
    fn test_block_len_limit() {
        assert_eq!(block_len(0, "events").unwrap(), 0);
        assert_eq!(block_len(u32::MAX as usize, "events").unwrap(), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            block_len(u32::MAX as usize + 1, "events"),
            Err(TrailError::CapacityExceeded { what: "events", limit })
                if limit == u64::from(u32::MAX)
        ));
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = StoreFooter {
            fields_offset: 48,
            dictionary_offset: 60,
            events_offset: 200,
            events_size: 1000,
            index_offset: 1200,
            index_size: 300,
            file_crc32: 0x1234_5678,
            magic_reverse: STORE_MAGIC_REVERSE,
        };
        let mut buf = Vec::new();
        footer.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), FOOTER_SIZE);
        assert_eq!(StoreFooter::parse(&buf).unwrap(), footer);
    }

    #[test]
    fn test_footer_invalid_magic() {
        let footer = StoreFooter {
            magic_reverse: *b"XXXX",
            ..StoreFooter::default()
        };
        let mut buf = Vec::new();
        footer.write_to(&mut buf).unwrap();
        assert!(matches!(
            StoreFooter::parse(&buf),
            Err(TrailError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_fields_roundtrip() {
        let fields = vec!["a".to_string(), "page_url".to_string()];
        let mut buf = Vec::new();
        let written = write_fields(&mut buf, &fields).unwrap();
        assert_eq!(written as usize, buf.len());
        assert_eq!(parse_fields(&buf, 2).unwrap(), fields);
        assert!(parse_fields(&buf[..4], 2).is_err());
    }

    #[test]
    fn test_trail_block_raw() {
        let timestamps = [10, 20, 30];
        let items: Vec<Item> = (1..=6).map(|v| Item::new((v % 2) as u8, v)).collect();
        let block = encode_trail_block(&timestamps, &items, TimestampEncoding::Raw).unwrap();

        let parsed = TrailBlockRef::parse(&block, 2).unwrap();
        assert_eq!(parsed.event_count, 3);
        assert_eq!(parsed.ts_encoding, TimestampEncoding::Raw);
        assert_eq!(parsed.ts_data.len(), 24);
        assert_eq!(parsed.items.len(), 24);
        assert_eq!(u32_at(parsed.items, 0), items[0].raw());
    }

    #[test]
    fn test_trail_block_detects_corruption() {
        let mut block = encode_trail_block(
            &[1, 2],
            &[Item::new(0, 1), Item::new(0, 2)],
            TimestampEncoding::DeltaOfDelta,
        )
        .unwrap();
        assert!(TrailBlockRef::parse(&block, 1).is_ok());

        let last = block.len() - BLOCK_CRC_SIZE - 1;
        block[last] ^= 0xff;
        assert!(matches!(
            TrailBlockRef::parse(&block, 1),
            Err(TrailError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_trail_block_wrong_field_count() {
        let block = encode_trail_block(&[1], &[Item::new(0, 1)], TimestampEncoding::Raw).unwrap();
        assert!(matches!(
            TrailBlockRef::parse(&block, 2),
            Err(TrailError::Corrupted(_))
        ));
    }
}
