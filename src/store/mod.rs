//! Record store: newest-first survey records mirrored to a durable slot.
//!
//! The whole collection is serialized into a single named slot on every
//! append. Collections are small; a growing deployment would want an
//! incremental layout instead.

pub mod slot;

pub use slot::{FileSlots, KeyValueSlot};
#[cfg(test)]
pub use slot::MemorySlots;

use crate::models::{seed_records, SurveyRecord};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Slot name used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "iv_survey_responses";

/// Slot that keeps unreadable content from `key` before it is overwritten.
pub fn backup_key(key: &str) -> String {
    format!("{}.bak", key)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored records under '{key}' are malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("a record with id '{0}' already exists")]
    DuplicateId(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where the records currently held came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Parsed from the slot.
    Stored,
    /// Nothing was stored yet.
    Seeded,
    /// Stored content was unreadable and was replaced by the seed set.
    /// The first append copies it to [`backup_key`] before overwriting.
    Recovered,
}

/// Ordered record collection; index 0 is always the most recent submission.
pub struct RecordStore<S: KeyValueSlot> {
    slot: S,
    key: String,
    records: Vec<SurveyRecord>,
    source: LoadSource,
}

impl<S: KeyValueSlot> RecordStore<S> {
    /// Load records from `slot`. An empty slot yields the seed set; stored
    /// content that does not parse is reported as [`StoreError::Malformed`].
    pub fn load(slot: S, key: &str) -> Result<Self, StoreError> {
        let (records, source) = Self::read(&slot, key)?;
        Ok(Self {
            slot,
            key: key.to_string(),
            records,
            source,
        })
    }

    /// Like [`load`](Self::load), but malformed stored content falls back to
    /// the seed set. The bad content stays in the slot until the next append
    /// moves a copy of it to [`backup_key`].
    pub fn load_or_seed(slot: S, key: &str) -> Result<Self, StoreError> {
        let (records, source) = match Self::read(&slot, key) {
            Ok(loaded) => loaded,
            Err(StoreError::Malformed { source, .. }) => {
                warn!(
                    "Stored records under '{}' are malformed ({}), using seed data",
                    key, source
                );
                (seed_records(), LoadSource::Recovered)
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            slot,
            key: key.to_string(),
            records,
            source,
        })
    }

    fn read(slot: &S, key: &str) -> Result<(Vec<SurveyRecord>, LoadSource), StoreError> {
        match slot.get(key)? {
            Some(raw) => {
                let records: Vec<SurveyRecord> =
                    serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
                        key: key.to_string(),
                        source,
                    })?;
                debug!("Loaded {} records from '{}'", records.len(), key);
                Ok((records, LoadSource::Stored))
            }
            None => {
                info!("No stored records under '{}', using seed data", key);
                Ok((seed_records(), LoadSource::Seeded))
            }
        }
    }

    pub fn records(&self) -> &[SurveyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn source(&self) -> LoadSource {
        self.source
    }

    /// Prepend `record` and write the full collection back before returning.
    ///
    /// If the write fails the record is removed again, so the in-memory view
    /// never runs ahead of the slot. After a recovered load the unreadable
    /// content is copied to [`backup_key`] first; nothing is written if that
    /// copy fails.
    pub fn append(&mut self, record: SurveyRecord) -> Result<&[SurveyRecord], StoreError> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }

        if self.source == LoadSource::Recovered {
            let backup = backup_key(&self.key);
            if self.slot.copy(&self.key, &backup)? {
                warn!("Kept unreadable records from '{}' in '{}'", self.key, backup);
            }
        }

        self.records.insert(0, record);

        if let Err(e) = self.persist() {
            self.records.remove(0);
            return Err(e);
        }
        self.source = LoadSource::Stored;

        info!("Stored record {} ({} total)", self.records[0].id, self.records.len());
        Ok(&self.records)
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let json = serde_json::to_string(&self.records)?;
        self.slot.set(&self.key, &json)
    }

    #[cfg(test)]
    pub fn into_slot(self) -> S {
        self.slot
    }
}
