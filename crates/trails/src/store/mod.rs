//! On-disk store: file format, codecs, and the read path.

pub mod codec;
pub mod dictionary;
pub mod file;
pub mod index;
pub mod reader;

pub use file::{CompressionType, StoreFooter, StoreHandle, StoreHeader, StoreWriter};
pub use reader::{Trail, TrailCursor, TrailDb, TrailFlags};
