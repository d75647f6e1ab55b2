use serde::{Deserialize, Serialize};

/// Inclusive window of calendar years, walked from `end` down to `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub const fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub const fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }
}

/// Durable resume point of a harvest run.
///
/// `offset` is the 1-based index of the first record of the next page to
/// request within `year`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub year: i32,
    pub offset: u32,
    #[serde(alias = "written_header", default)]
    pub header_written: bool,
    #[serde(default)]
    pub total_saved: u64,
    /// Page size the offset was produced with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl ProgressState {
    pub fn fresh(range: YearRange, header_written: bool, page_size: u32) -> Self {
        Self {
            year: range.end,
            offset: 1,
            header_written,
            total_saved: 0,
            page_size: Some(page_size),
        }
    }

    /// 1-based page number the current offset falls on.
    pub fn page_number(&self, page_size: u32) -> u32 {
        1 + (self.offset.max(1) - 1) / page_size.max(1)
    }

    /// Marks the current year exhausted and moves to the previous one.
    pub fn finish_year(&mut self) {
        self.year -= 1;
        self.offset = 1;
    }

    pub fn advance_page(&mut self, page_size: u32) {
        self.offset = self.offset.max(1) + page_size;
    }
}
