//! Many threads reading one open store.

use alopex_trails::{
    CompressionType, EntityId, Event, FinalizeOptions, TrailConstructor, TrailDb, TrailFlags,
};
use std::path::Path;
use std::thread;
use tempfile::TempDir;

const NUM_THREADS: usize = 8;
const NUM_ENTITIES: u8 = 16;
const EVENTS_PER_ENTITY: u64 = 40;

fn assert_send_sync<T: Send + Sync>() {}

fn build(path: &Path) {
    let mut cons = TrailConstructor::open(path, &["action", "page"]).unwrap();
    for i in 0..EVENTS_PER_ENTITY {
        for n in 0..NUM_ENTITIES {
            let action = if i % 3 == 0 { "click" } else { "view" };
            let page = format!("/page/{}", (u64::from(n) + i) % 11);
            cons.add(&EntityId::new([n; 16]), 1_000 + i, &[action, page.as_str()])
                .unwrap();
        }
    }
    cons.finalize(FinalizeOptions::default().with_compression(CompressionType::Delta))
        .unwrap();
}

fn replay(db: &TrailDb) -> Vec<Vec<Event>> {
    db.trails().map(|trail| trail.unwrap().iter().collect()).collect()
}

#[test]
fn test_trail_db_is_send_sync() {
    assert_send_sync::<TrailDb>();
}

#[test]
fn test_concurrent_readers_agree() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("shared.trails");
    build(&path);

    let db = TrailDb::open(&path).unwrap();
    let expected = replay(&db);
    let page = db.field("page").unwrap();
    let pages: Vec<String> = (0..11).map(|p| format!("/page/{p}")).collect();

    thread::scope(|s| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let db = &db;
                let expected = &expected;
                let pages = &pages;
                s.spawn(move || {
                    // First value lookups race to build the reverse map
                    for value in pages.iter().cycle().skip(t).take(pages.len()) {
                        let item = db.get_item(page, value.as_bytes()).unwrap();
                        assert_eq!(db.get_item_value(item).unwrap(), value.as_bytes());
                    }
                    assert_eq!(db.get_item(page, b"/nowhere"), None);

                    // Each thread starts at a different trail
                    let num_trails = db.num_trails();
                    for k in 0..num_trails {
                        let ordinal = (k + t as u64) % num_trails;
                        let trail = db.get_trail(ordinal).unwrap();
                        let events: Vec<Event> = trail.iter().collect();
                        assert_eq!(events, expected[ordinal as usize]);

                        let edges = trail.iter_with(TrailFlags::edge_encoded()).count();
                        assert_eq!(edges, events.len());
                    }

                    let id = EntityId::new([t as u8; 16]);
                    let ordinal = db.get_entity_ordinal(&id).unwrap();
                    assert_eq!(db.get_trail_by_id(&id).unwrap().ordinal(), ordinal);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    });
}
