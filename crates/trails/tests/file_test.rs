//! Integration tests for the store file format.

use alopex_trails::store::file::{FOOTER_SIZE, HEADER_SIZE, STORE_MAGIC, STORE_MAGIC_REVERSE};
use alopex_trails::{
    CompressionType, EntityId, FinalizeOptions, TrailConstructor, TrailDb, TrailError,
};
use std::path::Path;
use tempfile::TempDir;

fn write_store(path: &Path, compression: CompressionType) {
    let mut cons = TrailConstructor::open(path, &["action", "page"]).unwrap();
    for user in 0..20u8 {
        for i in 0..50u64 {
            let page = format!("/page/{}", i % 7);
            cons.add(
                &EntityId::new([user; 16]),
                1_400_000_000 + i * 60,
                &["view", page.as_str()],
            )
            .unwrap();
        }
    }
    cons.finalize(FinalizeOptions::default().with_compression(compression))
        .unwrap();
}

/// Rewrites the whole-file CRC in the footer after a deliberate edit.
fn reseal(contents: &mut [u8]) {
    let body_len = contents.len() - FOOTER_SIZE;
    let crc = crc32fast::hash(&contents[..body_len]);
    contents[body_len + 48..body_len + 52].copy_from_slice(&crc.to_le_bytes());
}

#[test]
fn test_file_layout() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("layout.trails");
    write_store(&file_path, CompressionType::Raw);

    let contents = std::fs::read(&file_path).unwrap();
    assert_eq!(&contents[..4], &STORE_MAGIC);
    let footer = &contents[contents.len() - FOOTER_SIZE..];
    assert_eq!(&footer[52..56], &STORE_MAGIC_REVERSE);

    let db = TrailDb::open(&file_path).unwrap();
    let header = db.header();
    assert_eq!(header.num_fields, 2);
    assert_eq!(header.num_entities, 20);
    assert_eq!(header.num_events, 1000);
    assert_eq!(header.min_timestamp, 1_400_000_000);
    assert_eq!(header.max_timestamp, 1_400_000_000 + 49 * 60);

    let footer = db.footer();
    assert_eq!(footer.fields_offset, HEADER_SIZE as u64);
    assert!(footer.dictionary_offset < footer.events_offset);
    assert_eq!(footer.events_offset + footer.events_size, footer.index_offset);
    assert_eq!(
        footer.index_offset + footer.index_size,
        (contents.len() - FOOTER_SIZE) as u64
    );
}

#[test]
fn test_delta_compression_is_smaller() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw.trails");
    let delta = temp_dir.path().join("delta.trails");
    write_store(&raw, CompressionType::Raw);
    write_store(&delta, CompressionType::Delta);

    let raw_db = TrailDb::open(&raw).unwrap();
    let delta_db = TrailDb::open(&delta).unwrap();
    assert!(delta_db.footer().events_size < raw_db.footer().events_size);

    for ordinal in 0..raw_db.num_trails() {
        let a: Vec<_> = raw_db.get_trail(ordinal).unwrap().iter().collect();
        let b: Vec<_> = delta_db.get_trail(ordinal).unwrap().iter().collect();
        assert_eq!(a, b);
    }
}

#[test]
fn test_corrupted_file_detection() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("corrupt.trails");
    write_store(&file_path, CompressionType::Raw);

    let mut contents = std::fs::read(&file_path).unwrap();
    let corrupt_offset = HEADER_SIZE + 20;
    contents[corrupt_offset] ^= 0xFF;
    std::fs::write(&file_path, &contents).unwrap();

    assert!(matches!(
        TrailDb::open(&file_path),
        Err(TrailError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_corrupted_block_detection() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("corrupt_block.trails");
    write_store(&file_path, CompressionType::Delta);

    let events_offset = {
        let db = TrailDb::open(&file_path).unwrap();
        assert!(db.verify_file_checksum());
        db.footer().events_offset as usize
    };

    // Damage the first trail's timestamps but keep the file CRC valid
    let mut contents = std::fs::read(&file_path).unwrap();
    contents[events_offset + 9] ^= 0x55;
    reseal(&mut contents);
    std::fs::write(&file_path, &contents).unwrap();

    let db = TrailDb::open(&file_path).unwrap();
    assert!(matches!(
        db.get_trail(0),
        Err(TrailError::ChecksumMismatch { .. })
    ));
    assert!(db.get_trail(1).is_ok());
}

#[test]
fn test_truncated_file() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("truncated.trails");
    write_store(&file_path, CompressionType::Raw);

    let contents = std::fs::read(&file_path).unwrap();
    std::fs::write(&file_path, &contents[..contents.len() - 10]).unwrap();
    assert!(TrailDb::open(&file_path).is_err());

    std::fs::write(&file_path, &contents[..HEADER_SIZE]).unwrap();
    assert!(matches!(
        TrailDb::open(&file_path),
        Err(TrailError::Corrupted(_))
    ));
}

#[test]
fn test_wrong_magic() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("magic.trails");
    write_store(&file_path, CompressionType::Raw);

    let mut contents = std::fs::read(&file_path).unwrap();
    contents[0..4].copy_from_slice(b"NOPE");
    reseal(&mut contents);
    std::fs::write(&file_path, &contents).unwrap();

    assert!(matches!(
        TrailDb::open(&file_path),
        Err(TrailError::InvalidMagic(_))
    ));
}

#[test]
fn test_version_zero_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("version.trails");
    write_store(&file_path, CompressionType::Raw);

    let mut contents = std::fs::read(&file_path).unwrap();
    contents[4..6].copy_from_slice(&0u16.to_le_bytes());
    reseal(&mut contents);
    std::fs::write(&file_path, &contents).unwrap();

    assert!(matches!(
        TrailDb::open(&file_path),
        Err(TrailError::UnsupportedVersion(0))
    ));
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = TrailDb::open(temp_dir.path().join("absent.trails")).unwrap_err();
    assert!(matches!(err, TrailError::IoError(_)));
    assert!(err.is_fatal());
}
