#![allow(dead_code)]

use nsf_harvest::AwardRecord;
use nsf_harvest::checkpoint::{CheckpointConfig, ProgressTracker};
use nsf_harvest::domain::YearRange;
use nsf_harvest::fetcher::{PageOutcome, PageSource};
use nsf_harvest::harvest::{FailurePolicy, HarvestSettings};
use nsf_harvest::store::OutputStore;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn award(id: &str) -> AwardRecord {
    AwardRecord::from_pairs([("id", id.to_string()), ("title", format!("Award {id}"))])
}

pub fn awards(year: i32, first: u32, count: u32) -> Vec<AwardRecord> {
    (first..first + count)
        .map(|n| award(&format!("{year}-{n:05}")))
        .collect()
}

/// In-memory page source answering from a fixed script.
///
/// Offsets without a scripted outcome answer `EndOfYear`.
#[derive(Default)]
pub struct ScriptedSource {
    pages: HashMap<(i32, u32), PageOutcome>,
    calls: Mutex<Vec<(i32, u32)>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, year: i32, offset: u32, outcome: PageOutcome) -> Self {
        self.pages.insert((year, offset), outcome);
        self
    }

    /// Scripts `full_pages` pages of `page_size` records followed by one page
    /// of `last_page` records (skipped when zero).
    pub fn year(mut self, year: i32, page_size: u32, full_pages: u32, last_page: u32) -> Self {
        let mut offset = 1;
        for _ in 0..full_pages {
            self.pages.insert(
                (year, offset),
                PageOutcome::Page(awards(year, offset, page_size)),
            );
            offset += page_size;
        }
        if last_page > 0 {
            self.pages.insert(
                (year, offset),
                PageOutcome::Page(awards(year, offset, last_page)),
            );
        }
        self
    }

    /// Cancels `token` once `calls` fetches have been served.
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> Vec<(i32, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageSource for ScriptedSource {
    fn fetch(&self, year: i32, offset: u32) -> impl Future<Output = PageOutcome> + Send {
        let served = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((year, offset));
            calls.len()
        };
        if let Some((limit, token)) = &self.cancel_after
            && served >= *limit
        {
            token.cancel();
        }

        let outcome = self
            .pages
            .get(&(year, offset))
            .cloned()
            .unwrap_or(PageOutcome::EndOfYear);
        std::future::ready(outcome)
    }
}

pub fn settings(range: YearRange, page_size: u32, policy: FailurePolicy) -> HarvestSettings {
    HarvestSettings {
        range,
        page_size,
        pause: Duration::ZERO,
        on_fetch_failure: policy,
    }
}

pub fn tracker(dir: &Path, range: YearRange, page_size: u32) -> ProgressTracker {
    ProgressTracker::new(CheckpointConfig {
        path: dir.join("checkpoint.json"),
        range,
        page_size,
    })
}

pub fn output(dir: &Path) -> OutputStore {
    OutputStore::new(dir.join("awards.csv"), &["title".to_string()])
}

/// Data rows of a CSV file (header excluded).
pub fn data_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}
