//! Construction API: collect events, then finalize once into a store file.

use crate::cons::entity::EntityIndex;
use crate::cons::finalize::Finalizer;
use crate::cons::interner::ValueInterner;
use crate::cons::logline::LoglineArena;
use crate::cons::timestamp::TimestampValidator;
use crate::error::{Result, TrailError};
use crate::store::file::{CompressionType, StoreHandle};
use crate::store::reader::TrailDb;
use crate::types::{
    EntityId, Item, Timestamp, INVALID_RATIO, MAX_FIELD_NAME_LENGTH, MAX_NUM_FIELDS,
    MAX_NUM_INPUTS, RESERVED_FIELD_NAME, TSTAMP_MAX, TSTAMP_MIN,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration for a build.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsConfig {
    /// Smallest plausible timestamp (inclusive).
    pub min_timestamp: Timestamp,
    /// Largest plausible timestamp (inclusive).
    pub max_timestamp: Timestamp,
    /// Fraction of events allowed outside the plausible range.
    pub max_invalid_ratio: f64,
    /// Maximum number of events accepted.
    pub max_inputs: u64,
}

impl Default for ConsConfig {
    fn default() -> Self {
        Self {
            min_timestamp: TSTAMP_MIN,
            max_timestamp: TSTAMP_MAX,
            max_invalid_ratio: INVALID_RATIO,
            max_inputs: MAX_NUM_INPUTS,
        }
    }
}

impl ConsConfig {
    /// Sets the plausible timestamp range.
    pub fn with_timestamp_range(mut self, min: Timestamp, max: Timestamp) -> Self {
        self.min_timestamp = min;
        self.max_timestamp = max;
        self
    }

    /// Sets the tolerated fraction of invalid timestamps.
    pub fn with_invalid_ratio(mut self, ratio: f64) -> Self {
        self.max_invalid_ratio = ratio;
        self
    }

    /// Sets the maximum number of events.
    pub fn with_max_inputs(mut self, max_inputs: u64) -> Self {
        self.max_inputs = max_inputs;
        self
    }

    /// Checks that the timestamp range is not inverted and that the ratio
    /// is a fraction in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.min_timestamp > self.max_timestamp {
            return Err(TrailError::InvalidConfig(format!(
                "timestamp range {}..={} is empty",
                self.min_timestamp, self.max_timestamp
            )));
        }
        if !(0.0..=1.0).contains(&self.max_invalid_ratio) {
            return Err(TrailError::InvalidConfig(format!(
                "invalid timestamp ratio {} is not in [0, 1]",
                self.max_invalid_ratio
            )));
        }
        Ok(())
    }
}

/// Options for [`TrailConstructor::finalize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeOptions {
    /// Compression applied to trail blocks.
    pub compression: CompressionType,
}

impl FinalizeOptions {
    /// Sets the compression.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsState {
    Open,
    Poisoned,
    Finalized,
}

/// Builder of a trail store.
///
/// Events are added in any order, for any entities; `finalize` groups them
/// into per-entity trails and writes the store file. A fatal error (a hard
/// limit, a failed finalize) closes the constructor to further input.
#[derive(Debug)]
pub struct TrailConstructor {
    path: PathBuf,
    fields: Vec<String>,
    interner: ValueInterner,
    arena: LoglineArena,
    entities: EntityIndex,
    validator: TimestampValidator,
    state: ConsState,
}

impl TrailConstructor {
    /// Starts a build at `path` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldName` or `TooManyFields` for a bad schema.
    pub fn open<S: AsRef<str>>(path: impl AsRef<Path>, field_names: &[S]) -> Result<Self> {
        Self::open_with_config(path, field_names, ConsConfig::default())
    }

    /// Starts a build at `path`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an out-of-range configuration, and
    /// `InvalidFieldName` or `TooManyFields` for a bad schema.
    pub fn open_with_config<S: AsRef<str>>(
        path: impl AsRef<Path>,
        field_names: &[S],
        config: ConsConfig,
    ) -> Result<Self> {
        config.validate()?;
        if field_names.len() > MAX_NUM_FIELDS {
            return Err(TrailError::TooManyFields(field_names.len()));
        }
        let mut fields: Vec<String> = Vec::with_capacity(field_names.len());
        for name in field_names {
            let name = name.as_ref();
            validate_field_name(name)?;
            if fields.iter().any(|f| f == name) {
                return Err(TrailError::InvalidFieldName(name.to_string()));
            }
            fields.push(name.to_string());
        }

        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), fields = fields.len(), "opened trail constructor");

        Ok(Self {
            interner: ValueInterner::new(fields.len())?,
            arena: LoglineArena::new(config.max_inputs),
            entities: EntityIndex::new(),
            validator: TimestampValidator::new(
                config.min_timestamp..=config.max_timestamp,
                config.max_invalid_ratio,
            ),
            state: ConsState::Open,
            path,
            fields,
        })
    }

    /// Adds one event for `id`. `values` are positional against the fields;
    /// empty values are allowed.
    ///
    /// A rejected value leaves the build unchanged.
    ///
    /// # Errors
    ///
    /// - `FieldCountMismatch`, `FieldValueTooLarge`: the event is rejected.
    /// - `CapacityExceeded`: the build is closed to further input.
    /// - `AlreadyFinalized`: the build was finalized or closed by an error.
    pub fn add<V: AsRef<[u8]>>(
        &mut self,
        id: &EntityId,
        timestamp: Timestamp,
        values: &[V],
    ) -> Result<()> {
        if self.state != ConsState::Open {
            return Err(TrailError::AlreadyFinalized);
        }
        if values.len() != self.fields.len() {
            return Err(TrailError::FieldCountMismatch {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        for (field, value) in values.iter().enumerate() {
            self.interner.validate(field, value.as_ref())?;
        }

        let result = self.append(id, timestamp, values);
        if let Err(e) = &result {
            self.poison_on_fatal(e);
        }
        result
    }

    fn append<V: AsRef<[u8]>>(
        &mut self,
        id: &EntityId,
        timestamp: Timestamp,
        values: &[V],
    ) -> Result<()> {
        if !self.arena.has_capacity() {
            return Err(TrailError::CapacityExceeded {
                what: "input events",
                limit: self.arena.max_inputs(),
            });
        }

        let items = values
            .iter()
            .enumerate()
            .map(|(field, value)| self.interner.intern(field, value.as_ref()))
            .collect::<Result<Vec<Item>>>()?;

        let ordinal = self.entities.resolve_or_create(id);
        let entity = self
            .entities
            .get_mut(ordinal)
            .ok_or(TrailError::UnknownEntity(ordinal))?;
        self.arena.append(entity, timestamp, &items)?;
        self.validator.observe(timestamp);
        Ok(())
    }

    fn poison_on_fatal(&mut self, error: &TrailError) {
        if error.is_fatal() {
            warn!(
                path = %self.path.display(),
                error = %error,
                "trail constructor closed to input"
            );
            self.state = ConsState::Poisoned;
        }
    }

    /// Re-adds every event of an opened store.
    ///
    /// Fields are matched by name; fields of this build that `db` lacks get
    /// empty values.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if `db` has a field this build does not, plus
    /// any error of [`TrailConstructor::add`].
    pub fn append_store(&mut self, db: &TrailDb) -> Result<()> {
        if self.state != ConsState::Open {
            return Err(TrailError::AlreadyFinalized);
        }
        let mut positions = Vec::with_capacity(db.num_fields());
        for name in db.fields() {
            let position = self
                .fields
                .iter()
                .position(|f| f == name)
                .ok_or_else(|| TrailError::SchemaMismatch(name.clone()))?;
            positions.push(position);
        }

        let empty: &[u8] = &[];
        let mut values = vec![empty; self.fields.len()];
        let mut added = 0u64;
        for trail in db.trails() {
            let trail = trail?;
            let id = trail.id();
            for event in &trail {
                values.fill(empty);
                for (item, &position) in event.items.iter().zip(&positions) {
                    values[position] = db.get_item_value(*item)?;
                }
                self.add(&id, event.timestamp, &values)?;
                added += 1;
            }
        }

        debug!(
            source = %db.path().display(),
            events = added,
            "appended trail store"
        );
        Ok(())
    }

    /// Writes the store file. The constructor accepts no input afterwards.
    ///
    /// # Errors
    ///
    /// - `TimestampRangeExceeded` if too many timestamps were implausible;
    ///   nothing is written.
    /// - I/O errors; any partial output is removed.
    /// - `AlreadyFinalized` on a second call.
    pub fn finalize(&mut self, options: FinalizeOptions) -> Result<StoreHandle> {
        if self.state != ConsState::Open {
            return Err(TrailError::AlreadyFinalized);
        }

        let finalizer = Finalizer {
            fields: &self.fields,
            interner: &self.interner,
            arena: &self.arena,
            entities: &self.entities,
            validator: &self.validator,
        };
        match finalizer.write(&self.path, options.compression) {
            Ok(handle) => {
                self.state = ConsState::Finalized;
                Ok(handle)
            }
            Err(e) => {
                self.poison_on_fatal(&e);
                Err(e)
            }
        }
    }

    /// Releases the build. Unfinalized input is discarded.
    pub fn close(self) {
        debug!(
            path = %self.path.display(),
            finalized = self.state == ConsState::Finalized,
            "closed trail constructor"
        );
    }

    /// Returns the output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the field names.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the number of events added.
    pub fn num_events(&self) -> u64 {
        self.arena.len() as u64
    }

    /// Returns the number of distinct entities seen.
    pub fn num_entities(&self) -> u64 {
        self.entities.len() as u64
    }

    /// Returns the number of distinct non-empty values across all fields.
    pub fn num_values(&self) -> usize {
        self.interner.len()
    }

    /// Returns the number of events whose timestamp fell outside the range.
    pub fn num_invalid_timestamps(&self) -> u64 {
        self.validator.invalid()
    }

    /// Returns true once the build was finalized or closed by an error.
    pub fn is_closed(&self) -> bool {
        self.state != ConsState::Open
    }
}

/// Checks a field name: non-empty, at most `MAX_FIELD_NAME_LENGTH` bytes of
/// `[A-Za-z0-9_]`, and not the reserved timestamp name.
pub fn validate_field_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_FIELD_NAME_LENGTH
        && name != RESERVED_FIELD_NAME
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(TrailError::InvalidFieldName(name.to_string()))
    }
}
