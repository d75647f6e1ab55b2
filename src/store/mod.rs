//! Output persistence and row merging.
//!
//! [`RowMerger`] is the only writer of the output file. In update mode it
//! carries a [`DedupSet`] seeded from the identifiers already on disk and kept
//! current with every row it appends during the run.

pub mod output;

pub use output::OutputStore;

use crate::domain::{AwardRecord, ProgressState};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing column '{0}' in {1}")]
    MissingColumn(String, String),
    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Identifiers known to be in the output.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    ids: HashSet<String>,
}

impl DedupSet {
    pub fn new(ids: HashSet<String>) -> Self {
        Self { ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

pub struct RowMerger {
    store: OutputStore,
    dedup: Option<DedupSet>,
}

impl RowMerger {
    /// Appends every row it is given.
    pub fn basic(store: OutputStore) -> Self {
        Self { store, dedup: None }
    }

    /// Drops rows whose identifier is already in `dedup`.
    pub fn deduplicating(store: OutputStore, dedup: DedupSet) -> Self {
        Self {
            store,
            dedup: Some(dedup),
        }
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn dedup(&self) -> Option<&DedupSet> {
        self.dedup.as_ref()
    }

    /// Writes the new rows of `batch` and updates `state` accordingly.
    ///
    /// Returns the number of rows appended. Nothing touches the disk when the
    /// filtered batch is empty.
    pub async fn merge(
        &mut self,
        batch: &[AwardRecord],
        state: &mut ProgressState,
    ) -> Result<usize, StoreError> {
        let rows: Vec<AwardRecord> = match &self.dedup {
            Some(dedup) => {
                let mut seen = HashSet::new();
                batch
                    .iter()
                    .filter(|record| match record.id() {
                        Some(id) => !dedup.contains(&id) && seen.insert(id),
                        None => true,
                    })
                    .cloned()
                    .collect()
            }
            None => batch.to_vec(),
        };

        if rows.is_empty() {
            debug!("Nothing new in batch of {}", batch.len());
            return Ok(0);
        }

        let new_ids: Vec<String> = if self.dedup.is_some() {
            rows.iter().filter_map(AwardRecord::id).collect()
        } else {
            Vec::new()
        };

        let appended = self.store.append(rows, !state.header_written).await?;
        state.header_written = true;
        state.total_saved += appended as u64;

        if let Some(dedup) = self.dedup.as_mut() {
            for id in new_ids {
                dedup.insert(id);
            }
        }

        Ok(appended)
    }
}
