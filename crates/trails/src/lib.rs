//! Alopex Trails - immutable event-trail store
//!
//! This crate builds and reads write-once stores of per-entity event trails.
//! Events for many entities arrive interleaved; a build groups them into one
//! time-ordered trail per entity and writes a single checksummed file that is
//! memory-mapped for reading.
//!
//! # Components
//!
//! - [`TrailConstructor`]: ingestion and finalize
//! - [`TrailDb`]: read-only access to a finalized store
//! - [`Trail`] / [`TrailCursor`]: restartable replay of one entity's events
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_trails::{EntityId, FinalizeOptions, TrailConstructor, TrailDb};
//!
//! let mut cons = TrailConstructor::open("events.trails", &["action", "page"])?;
//! cons.add(&EntityId::new([1; 16]), 1_400_000_000, &["view", "/home"])?;
//! cons.add(&EntityId::new([2; 16]), 1_400_000_005, &["click", ""])?;
//! cons.finalize(FinalizeOptions::default())?;
//! cons.close();
//!
//! let db = TrailDb::open("events.trails")?;
//! let ordinal = db.get_entity_ordinal(&EntityId::new([1; 16])).unwrap();
//! for event in &db.get_trail(ordinal)? {
//!     for item in &event.items {
//!         let value = db.get_item_value(*item)?;
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod cons;
pub mod error;
pub mod store;
pub mod types;

pub use cons::{ConsConfig, FinalizeOptions, TrailConstructor};
pub use error::{ErrorClass, Result, TrailError};
pub use store::{CompressionType, StoreHandle, Trail, TrailCursor, TrailDb, TrailFlags};
pub use types::{EntityId, Event, FieldId, Item, Timestamp, ValueId};
