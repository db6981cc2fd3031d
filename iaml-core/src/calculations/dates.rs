//! Date derivation for partial attendance.
//!
//! Session dates are calendar dates. They are never converted through UTC, so
//! `"2025-03-10"` is March 10 regardless of where the code runs.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Attendance, BlockId, Program, SessionRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("session has no start date")]
    MissingStartDate,

    #[error("invalid date '{0}'")]
    Invalid(String),

    #[error("{block} is not part of {program}")]
    UnknownBlock { program: String, block: BlockId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Parses the calendar date at the front of `s`.
///
/// Accepts `YYYY-MM-DD` as well as full ISO timestamps, of which only the date
/// part is read.
pub fn parse_local_date(s: &str) -> Result<NaiveDate, DateError> {
    let trimmed = s.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| DateError::Invalid(s.to_string()))
}

/// Formats a date as `YYYY-MM-DD` from its calendar components.
pub fn to_iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Computes the date range covered by `attendance` within `session`.
///
/// Full attendance, programs without blocks, and empty selections get the
/// session's base range. Otherwise the range runs from the earliest selected
/// block start to the latest selected block end, even when the blocks are
/// not adjacent.
pub fn compute_derived_dates(
    session: &SessionRecord,
    program: &Program,
    attendance: &Attendance,
) -> Result<DateRange, DateError> {
    let base_start = session.start_date.ok_or(DateError::MissingStartDate)?;
    let base_end = session.end_date.unwrap_or(base_start);
    let base = DateRange {
        start: base_start,
        end: base_end,
    };

    if attendance.is_full() || !program.has_blocks() {
        return Ok(base);
    }

    let mut min_offset = u32::MAX;
    let mut max_offset = 0;
    for id in attendance.blocks() {
        let block = program.block(id).ok_or_else(|| DateError::UnknownBlock {
            program: program.name.clone(),
            block: id,
        })?;
        min_offset = min_offset.min(block.start_offset);
        max_offset = max_offset.max(block.end_offset);
    }

    Ok(DateRange {
        start: offset(base_start, min_offset)?,
        end: offset(base_start, max_offset)?,
    })
}

fn offset(
    base: NaiveDate,
    days: u32,
) -> Result<NaiveDate, DateError> {
    base.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| DateError::Invalid(format!("{base} + {days} days")))
}
