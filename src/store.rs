//! Metadata records in the bucket: one JSON object per source file.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::gcs::ObjectStore;
use crate::record::{file_stem, TranscriptRecord};

/// Result of looking up a record. "Absent" and "unreadable" are kept apart
/// so the caller decides what corruption means instead of silently starting
/// over with a blank record.
#[derive(Debug)]
pub enum LoadedRecord {
    Found(TranscriptRecord),
    NotFound,
    Corrupt(serde_json::Error),
}

/// Reads and writes one record per source file under the metadata prefix.
pub struct MetadataStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Object path of the record for a source file: the audio extension is
    /// replaced with `.json` under the metadata prefix.
    pub fn record_path(&self, filename: &str) -> String {
        format!("{}{}.json", self.prefix, file_stem(filename))
    }

    pub async fn load(&self, filename: &str) -> Result<LoadedRecord> {
        let path = self.record_path(filename);
        let body = self
            .store
            .fetch_string(&path)
            .await
            .with_context(|| format!("Failed to load metadata record '{}'", path))?;

        Ok(match body {
            None => LoadedRecord::NotFound,
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(record) => LoadedRecord::Found(record),
                Err(err) => LoadedRecord::Corrupt(err),
            },
        })
    }

    /// Serialize and overwrite the record at its deterministic path. Last
    /// writer wins; nothing else writes these objects during a run.
    pub async fn save(&self, record: &TranscriptRecord) -> Result<()> {
        let path = self.record_path(&record.filename);
        let body = serde_json::to_string_pretty(record)
            .context("Failed to serialize metadata record")?;
        self.store
            .put_string(&path, body, "application/json")
            .await
            .with_context(|| format!("Failed to save metadata record '{}'", path))?;

        debug!("Saved metadata record '{}'", path);
        Ok(())
    }
}
