//! Page fetching with bounded retries.
//!
//! [`AwardsFetcher`] never surfaces transport errors to the caller. Failures
//! are retried with backoff and, once attempts run out, reported as
//! [`PageOutcome::FetchFailed`] so the driving loop can decide whether to skip
//! the rest of the year or stop.

pub mod client;
pub mod retry;

pub use client::{AwardsClient, ClientConfig, DEFAULT_FIELDS, FetchError};
pub use retry::{RetryConfig, RetryError, RetryPolicy};

use crate::domain::AwardRecord;
use std::future::Future;
use tracing::{debug, error, warn};

/// Result of asking the source for one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// A non-empty page of records.
    Page(Vec<AwardRecord>),
    /// The source has no records at this offset.
    EndOfYear,
    /// Every attempt failed.
    FetchFailed { attempts: u32 },
}

impl PageOutcome {
    pub fn from_records(records: Vec<AwardRecord>) -> Self {
        if records.is_empty() {
            Self::EndOfYear
        } else {
            Self::Page(records)
        }
    }

    /// Records of the page; empty for both terminal outcomes.
    pub fn into_records(self) -> Vec<AwardRecord> {
        match self {
            Self::Page(records) => records,
            Self::EndOfYear | Self::FetchFailed { .. } => Vec::new(),
        }
    }
}

/// Anything the driving loop can pull pages from.
pub trait PageSource: Send + Sync {
    fn fetch(&self, year: i32, offset: u32) -> impl Future<Output = PageOutcome> + Send;
}

pub struct AwardsFetcher {
    client: AwardsClient,
    retry: RetryPolicy,
}

impl AwardsFetcher {
    pub fn new(client: AwardsClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

impl PageSource for AwardsFetcher {
    async fn fetch(&self, year: i32, offset: u32) -> PageOutcome {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            match self.client.fetch_page(year, offset).await {
                Ok(records) => {
                    debug!(year, offset, attempt, fetched = records.len(), "Fetched page");
                    return PageOutcome::from_records(records);
                }
                Err(e) => {
                    warn!(year, offset, attempt, "Fetch attempt failed: {}", e);
                }
            }

            if !self.retry.should_retry(attempt) {
                error!(
                    year,
                    offset, "Skipping page after {} failed attempts", max_attempts
                );
                return PageOutcome::FetchFailed {
                    attempts: max_attempts,
                };
            }

            let delay = self.retry.calculate_delay(attempt);
            debug!(year, offset, "Retrying in {:?} (attempt {})", delay, attempt + 1);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
