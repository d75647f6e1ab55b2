//! The driving loop.
//!
//! Years are walked backwards from the end of the range to its start. Inside
//! a year, pages are requested at increasing record offsets until a page comes
//! back short or empty. The checkpoint is saved after every page.

use crate::checkpoint::{CheckpointError, ProgressTracker};
use crate::domain::{ProgressState, YearRange};
use crate::fetcher::{PageOutcome, PageSource};
use crate::store::{RowMerger, StoreError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("Output error: {0}")]
    Store(#[from] StoreError),
    #[error("Fetching year {year} offset {offset} failed after {attempts} attempts")]
    FetchFailed {
        year: i32,
        offset: u32,
        attempts: u32,
    },
}

/// What to do with a page whose retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the page as the end of its year and move on.
    #[default]
    Skip,
    /// Stop the run, leaving the checkpoint on the failed page.
    Halt,
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub range: YearRange,
    pub page_size: u32,
    pub pause: Duration,
    pub on_fetch_failure: FailurePolicy,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            range: YearRange::new(2019, 2024),
            page_size: 25,
            pause: Duration::from_millis(200),
            on_fetch_failure: FailurePolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStep {
    AdvancingYear(i32),
    FetchingPage { year: i32, offset: u32 },
    /// Cancelled while a request or pause was in flight.
    Interrupted,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total_saved: u64,
    pub appended: u64,
    pub pages_fetched: u64,
    pub years_completed: u32,
    pub failed_pages: u32,
    pub interrupted: bool,
    pub elapsed: Duration,
    pub final_state: ProgressState,
}

impl RunSummary {
    fn new(state: &ProgressState) -> Self {
        Self {
            total_saved: state.total_saved,
            appended: 0,
            pages_fetched: 0,
            years_completed: 0,
            failed_pages: 0,
            interrupted: false,
            elapsed: Duration::ZERO,
            final_state: state.clone(),
        }
    }
}

pub struct Harvester<S> {
    source: S,
    tracker: ProgressTracker,
    merger: RowMerger,
    settings: HarvestSettings,
    cancel: CancellationToken,
}

impl<S: PageSource> Harvester<S> {
    pub fn new(
        source: S,
        tracker: ProgressTracker,
        merger: RowMerger,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            source,
            tracker,
            merger,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the run at the next page boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn run(&mut self, mut state: ProgressState) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(&state);
        let mut step = HarvestStep::AdvancingYear(state.year);

        loop {
            step = match step {
                HarvestStep::AdvancingYear(year) => self.enter_year(&mut state, year),
                HarvestStep::FetchingPage { year, offset } => {
                    if self.cancel.is_cancelled() {
                        warn!(year, offset, "Interrupted, stopping at page boundary");
                        summary.interrupted = true;
                        HarvestStep::Done
                    } else {
                        self.fetch_page(&mut state, &mut summary, year, offset)
                            .await?
                    }
                }
                HarvestStep::Interrupted => {
                    summary.interrupted = true;
                    HarvestStep::Done
                }
                HarvestStep::Done => break,
            };
        }

        summary.total_saved = state.total_saved;
        summary.elapsed = started.elapsed();
        summary.final_state = state;
        Ok(summary)
    }

    fn enter_year(&self, state: &mut ProgressState, year: i32) -> HarvestStep {
        if year < self.settings.range.start {
            return HarvestStep::Done;
        }

        state.year = year;
        state.offset = state.offset.max(1);
        info!(
            year,
            offset = state.offset,
            page = state.page_number(self.settings.page_size),
            "Harvesting year"
        );
        HarvestStep::FetchingPage {
            year,
            offset: state.offset,
        }
    }

    async fn fetch_page(
        &mut self,
        state: &mut ProgressState,
        summary: &mut RunSummary,
        year: i32,
        offset: u32,
    ) -> Result<HarvestStep, HarvestError> {
        let page_size = self.settings.page_size;

        // A page that is already complete wins over a cancellation.
        let outcome = tokio::select! {
            biased;
            outcome = self.source.fetch(year, offset) => outcome,
            () = self.cancel.cancelled() => {
                warn!(year, offset, "Interrupted while fetching, page will be requested again");
                return Ok(HarvestStep::Interrupted);
            }
        };

        match outcome {
            PageOutcome::Page(records) => {
                summary.pages_fetched += 1;
                let fetched = records.len();
                let appended = self.merger.merge(&records, state).await?;
                summary.appended += appended as u64;
                self.tracker.save(state).await?;

                info!(
                    year,
                    offset,
                    fetched,
                    appended,
                    total_saved = state.total_saved,
                    "Saved page"
                );

                if fetched < page_size as usize {
                    info!(year, "End of results for year");
                    return self.finish_year(state, summary).await;
                }

                state.advance_page(page_size);
                self.tracker.save(state).await?;
                if !self.settings.pause.is_zero() {
                    tokio::select! {
                        () = tokio::time::sleep(self.settings.pause) => {}
                        () = self.cancel.cancelled() => {}
                    }
                }
                Ok(HarvestStep::FetchingPage {
                    year,
                    offset: state.offset,
                })
            }
            PageOutcome::EndOfYear => {
                info!(year, offset, "Finished year");
                self.finish_year(state, summary).await
            }
            PageOutcome::FetchFailed { attempts } => {
                summary.failed_pages += 1;
                match self.settings.on_fetch_failure {
                    FailurePolicy::Skip => {
                        warn!(year, offset, "Giving up on the rest of the year");
                        self.finish_year(state, summary).await
                    }
                    FailurePolicy::Halt => {
                        self.tracker.save(state).await?;
                        error!(year, offset, "Halting on failed page");
                        Err(HarvestError::FetchFailed {
                            year,
                            offset,
                            attempts,
                        })
                    }
                }
            }
        }
    }

    async fn finish_year(
        &mut self,
        state: &mut ProgressState,
        summary: &mut RunSummary,
    ) -> Result<HarvestStep, HarvestError> {
        state.finish_year();
        self.tracker.save(state).await?;
        summary.years_completed += 1;
        debug!(next_year = state.year, "Checkpoint moved to next year");
        Ok(HarvestStep::AdvancingYear(state.year))
    }
}
