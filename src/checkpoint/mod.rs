//! Durable progress tracking.
//!
//! The checkpoint is a small JSON document overwritten after every fetched
//! page, so an interrupted run loses at most one page of work. Reads fail open:
//! a missing or unreadable checkpoint yields a fresh state.

use crate::domain::{ProgressState, YearRange};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub range: YearRange,
    pub page_size: u32,
}

pub struct ProgressTracker {
    config: CheckpointConfig,
}

impl ProgressTracker {
    pub fn new(config: CheckpointConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Loads the persisted state, falling back to a fresh one.
    ///
    /// `header_hint` is used only for a fresh state: it tells whether the
    /// output already carries a header row.
    pub async fn load(&self, header_hint: bool) -> ProgressState {
        match self.read_state().await {
            Ok(Some(state)) => self.reconcile(state),
            Ok(None) => {
                debug!("No checkpoint at {}", self.config.path.display());
                self.fresh(header_hint)
            }
            Err(e) => {
                warn!(
                    "Ignoring unreadable checkpoint {}: {}",
                    self.config.path.display(),
                    e
                );
                self.fresh(header_hint)
            }
        }
    }

    /// Overwrites the checkpoint. The document is written to a sibling
    /// temporary file and renamed into place.
    pub async fn save(&self, state: &ProgressState) -> Result<(), CheckpointError> {
        let data = serde_json::to_vec(state)?;

        if let Some(parent) = self.config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.config.path).await?;
        Ok(())
    }

    /// Deletes the checkpoint. Returns whether a file was removed.
    pub async fn remove(&self) -> Result<bool, CheckpointError> {
        match fs::remove_file(&self.config.path).await {
            Ok(()) => {
                info!("Deleted old checkpoint: {}", self.config.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_state(&self) -> Result<Option<ProgressState>, CheckpointError> {
        let data = match fs::read(&self.config.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn fresh(&self, header_hint: bool) -> ProgressState {
        ProgressState::fresh(self.config.range, header_hint, self.config.page_size)
    }

    fn reconcile(&self, mut state: ProgressState) -> ProgressState {
        let range = self.config.range;
        if !range.contains(state.year) {
            debug!(
                "Checkpoint year {} outside {}..={}, restarting at {}",
                state.year, range.start, range.end, range.end
            );
            state.year = range.end;
            state.offset = 1;
        }
        state.offset = state.offset.max(1);

        let page_size = self.config.page_size;
        if let Some(previous) = state.page_size
            && previous != page_size
        {
            // Offsets count records, so they stay valid across page sizes.
            if (state.offset - 1) % page_size.max(1) != 0 {
                warn!(
                    "Checkpoint offset {} was written with page size {} and is not aligned to page size {}",
                    state.offset, previous, page_size
                );
            }
        }
        state.page_size = Some(page_size);
        state
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .config
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("checkpoint"));
        name.push(".tmp");
        self.config.path.with_file_name(name)
    }
}
