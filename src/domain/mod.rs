//! Domain layer for nsf-harvest.
//!
//! Contains the canonical types shared across all modules:
//! - `AwardRecord`: one award row as returned by the awards API
//! - `ProgressState`: the durable resume point (year + record offset)
//! - `YearRange`: the inclusive calendar-year window walked backwards

pub mod award;
pub mod progress;

pub use award::{AWARD_ID_FIELD, AwardRecord};
pub use progress::{ProgressState, YearRange};
