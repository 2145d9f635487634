//! Construction path: ingestion state and finalize.

pub mod constructor;
pub mod entity;
pub(crate) mod finalize;
pub mod interner;
pub mod logline;
pub mod timestamp;

pub use constructor::{ConsConfig, FinalizeOptions, TrailConstructor};
