//! Finalize: turn the ingestion arena into a store file.
//!
//! Every entity's chain is walked from its head, reversed into ingestion
//! order, and stably sorted by timestamp before it is written as one trail
//! block. Output goes to a temporary sibling file that is renamed over the
//! target only once the file is complete and synced.

use crate::cons::entity::EntityIndex;
use crate::cons::interner::ValueInterner;
use crate::cons::logline::{Logline, LoglineArena};
use crate::cons::timestamp::TimestampValidator;
use crate::error::Result;
use crate::store::file::{CompressionType, StoreHandle, StoreWriter};
use crate::types::{Item, Timestamp};
use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Borrowed view of everything a build accumulated.
pub(crate) struct Finalizer<'a> {
    pub fields: &'a [String],
    pub interner: &'a ValueInterner,
    pub arena: &'a LoglineArena,
    pub entities: &'a EntityIndex,
    pub validator: &'a TimestampValidator,
}

impl Finalizer<'_> {
    /// Writes the store to `path`.
    ///
    /// Nothing is written if the timestamp gate fails. On any later error
    /// the temporary file is removed and `path` is left untouched.
    pub fn write(&self, path: &Path, compression: CompressionType) -> Result<StoreHandle> {
        self.validator.check()?;

        let started = Instant::now();
        let tmp = temp_path(path);
        debug!(path = %tmp.display(), "writing store to temporary file");

        let written = self.write_file(&tmp, compression).and_then(|handle| {
            fs::rename(&tmp, path)?;
            Ok(handle)
        });
        let handle = match written {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(cleanup) = discard_temp(&tmp) {
                    warn!(
                        path = %tmp.display(),
                        error = %cleanup,
                        "failed to remove temporary store file"
                    );
                }
                return Err(e);
            }
        };

        info!(
            path = %path.display(),
            entities = handle.header.num_entities,
            events = handle.header.num_events,
            values = self.interner.len(),
            invalid_timestamps = self.validator.invalid(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finalized trail store"
        );

        Ok(StoreHandle {
            path: path.to_path_buf(),
            ..handle
        })
    }

    fn write_file(&self, path: &Path, compression: CompressionType) -> Result<StoreHandle> {
        let mut writer = StoreWriter::create(path, self.fields, self.interner, compression)?;

        let mut order: Vec<&Logline> = Vec::new();
        let mut timestamps: Vec<Timestamp> = Vec::new();
        let mut items: Vec<Item> = Vec::new();

        for (_, entity) in self.entities.iter() {
            order.clear();
            order.extend(self.arena.chain(entity.head).map(|(_, logline)| logline));
            order.reverse();
            // Stable, so events sharing a timestamp keep ingestion order
            order.sort_by_key(|logline| logline.timestamp);

            timestamps.clear();
            items.clear();
            for logline in &order {
                timestamps.push(logline.timestamp);
                items.extend_from_slice(self.arena.items(logline));
            }

            writer.write_trail(entity.id, &timestamps, &items)?;
        }

        writer.finish()
    }
}

/// Returns `<path>.tmp` next to `path`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Removes a temporary file. A file that was never created is not an error.
fn discard_temp(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
