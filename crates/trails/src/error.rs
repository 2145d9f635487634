//! Error and Result types for trail store operations.

use crate::types::{EntityId, FieldId, Item};
use std::io;
use thiserror::Error;

/// A convenience `Result` type for trail store operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Broad category of a [`TrailError`], deciding how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The offending call was rejected; the build can continue.
    Validation,
    /// A hard limit was reached; the build is unusable.
    Capacity,
    /// The build as a whole failed a data-quality gate at finalize.
    DataQuality,
    /// A read-path lookup missed; the open store is unaffected.
    Lookup,
    /// The underlying storage failed.
    Io,
    /// A file on disk is not a valid store.
    Format,
    /// The constructor is in a state that does not allow the call.
    State,
}

/// The error type for trail store operations.
#[derive(Debug, Error)]
pub enum TrailError {
    /// Field value is longer than `MAX_FIELD_SIZE`.
    #[error("Value of field {field} is {len} bytes, maximum is {max}")]
    FieldValueTooLarge {
        /// Field index.
        field: usize,
        /// Length of the rejected value.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Field index is outside the schema.
    #[error("Invalid field index {field}, store has {num_fields} fields")]
    InvalidFieldIndex {
        /// Requested field index.
        field: usize,
        /// Number of fields in the schema.
        num_fields: usize,
    },

    /// An event carried a different number of values than the schema has fields.
    #[error("Expected {expected} values, got {actual}")]
    FieldCountMismatch {
        /// Number of fields in the schema.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// Entity identifier is not exactly 16 bytes.
    #[error("Malformed entity id: expected 16 bytes, got {0}")]
    MalformedEntityId(usize),

    /// Field name is empty, too long, reserved, duplicated or has bad characters.
    #[error("Invalid field name {0:?}")]
    InvalidFieldName(String),

    /// Build configuration is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Schema has more than `MAX_NUM_FIELDS` fields.
    #[error("Too many fields: {0}")]
    TooManyFields(usize),

    /// A fixed capacity of the build was exhausted.
    #[error("Capacity exceeded: {what} limit is {limit}")]
    CapacityExceeded {
        /// Which resource ran out.
        what: &'static str,
        /// The limit that was hit.
        limit: u64,
    },

    /// Too many events carried timestamps outside the plausible range.
    #[error("Too many invalid timestamps: {invalid} of {total} (maximum ratio {max_ratio})")]
    TimestampRangeExceeded {
        /// Number of invalid timestamps seen.
        invalid: u64,
        /// Number of events seen.
        total: u64,
        /// Configured maximum ratio.
        max_ratio: f64,
    },

    /// The constructor was already finalized or poisoned by a fatal error.
    #[error("Constructor is closed to further input")]
    AlreadyFinalized,

    /// No trail is recorded for the entity ordinal.
    #[error("Unknown entity ordinal {0}")]
    UnknownEntity(u64),

    /// No trail is recorded for the entity id.
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    /// Item was never interned in this store.
    #[error("Unknown item {0}")]
    UnknownItem(Item),

    /// No field with this name in the schema.
    #[error("Unknown field {0:?}")]
    UnknownField(String),

    /// Schemas of two stores cannot be merged.
    #[error("Schema mismatch: field {0} missing from the target store")]
    SchemaMismatch(String),

    /// Invalid magic bytes in the file header or footer.
    #[error("Invalid magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Checksum does not match.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Stored CRC32 checksum.
        expected: u32,
        /// Computed CRC32 checksum.
        actual: u32,
    },

    /// A section of the file is truncated or inconsistent.
    #[error("Corrupted store: {0}")]
    Corrupted(String),

    /// Dictionary of a field in an opened store is malformed.
    #[error("Corrupted dictionary for field {0}")]
    CorruptedDictionary(FieldId),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl TrailError {
    /// Returns the category of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::FieldValueTooLarge { .. }
            | Self::InvalidFieldIndex { .. }
            | Self::FieldCountMismatch { .. }
            | Self::MalformedEntityId(_)
            | Self::InvalidFieldName(_)
            | Self::InvalidConfig(_)
            | Self::SchemaMismatch(_) => ErrorClass::Validation,
            Self::TooManyFields(_) | Self::CapacityExceeded { .. } => ErrorClass::Capacity,
            Self::TimestampRangeExceeded { .. } => ErrorClass::DataQuality,
            Self::UnknownEntity(_)
            | Self::EntityNotFound(_)
            | Self::UnknownItem(_)
            | Self::UnknownField(_) => ErrorClass::Lookup,
            Self::IoError(_) => ErrorClass::Io,
            Self::InvalidMagic(_)
            | Self::UnsupportedVersion(_)
            | Self::ChecksumMismatch { .. }
            | Self::Corrupted(_)
            | Self::CorruptedDictionary(_) => ErrorClass::Format,
            Self::AlreadyFinalized => ErrorClass::State,
        }
    }

    /// Returns true if the error leaves an in-progress build unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Capacity | ErrorClass::DataQuality | ErrorClass::Io
        )
    }
}
