//! Timestamp plausibility checks.

use crate::error::{Result, TrailError};
use crate::types::Timestamp;
use std::ops::RangeInclusive;
use tracing::warn;

/// Outcome of classifying one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampClass {
    /// Inside the configured range.
    Valid,
    /// Outside the configured range; still recorded.
    Invalid,
}

/// Counts invalid timestamps over a whole build and gates finalize.
#[derive(Debug, Clone)]
pub struct TimestampValidator {
    range: RangeInclusive<Timestamp>,
    max_invalid_ratio: f64,
    total: u64,
    invalid: u64,
}

impl TimestampValidator {
    /// Creates a validator for `range` tolerating `max_invalid_ratio` invalid events.
    pub fn new(range: RangeInclusive<Timestamp>, max_invalid_ratio: f64) -> Self {
        Self {
            range,
            max_invalid_ratio,
            total: 0,
            invalid: 0,
        }
    }

    /// Classifies `ts` without recording it.
    pub fn classify(&self, ts: Timestamp) -> TimestampClass {
        if self.range.contains(&ts) {
            TimestampClass::Valid
        } else {
            TimestampClass::Invalid
        }
    }

    /// Classifies and records `ts`.
    pub fn observe(&mut self, ts: Timestamp) -> TimestampClass {
        let class = self.classify(ts);
        self.total += 1;
        if class == TimestampClass::Invalid {
            self.invalid += 1;
        }
        class
    }

    /// Number of timestamps recorded.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of invalid timestamps recorded.
    pub fn invalid(&self) -> u64 {
        self.invalid
    }

    /// Fraction of invalid timestamps, 0 when nothing was recorded.
    pub fn invalid_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.invalid as f64 / self.total as f64
        }
    }

    /// Fails if the invalid fraction is above the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns `TrailError::TimestampRangeExceeded`.
    pub fn check(&self) -> Result<()> {
        if self.invalid_ratio() > self.max_invalid_ratio {
            warn!(
                invalid = self.invalid,
                total = self.total,
                max_ratio = self.max_invalid_ratio,
                "invalid timestamp ratio exceeded"
            );
            return Err(TrailError::TimestampRangeExceeded {
                invalid: self.invalid,
                total: self.total,
                max_ratio: self.max_invalid_ratio,
            });
        }
        Ok(())
    }
}
