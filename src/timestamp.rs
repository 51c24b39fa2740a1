//! Timestamp parsing and forecast-lead arithmetic.

use crate::constants::{DIAGNOSTIC_DATE, MET_DATE_FORMAT, NA, SQL_DATE_FORMAT};
use crate::models::RowIssue;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::collections::HashMap;

/// Entries kept before the cache is cleared
const DATE_CACHE_CAPACITY: usize = 16_384;

/// Memoizing parser for MET timestamps, owned by one parser worker
#[derive(Debug, Default)]
pub struct DateCache {
    entries: HashMap<String, Option<NaiveDateTime>>,
}

impl DateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `YYYYMMDD_HHMMSS` field.
    ///
    /// `NA` yields `None`; fields starting with `F` or `O` (diagnostic rows)
    /// yield the fixed diagnostic date.
    pub fn parse(&mut self, raw: &str) -> Result<Option<NaiveDateTime>, RowIssue> {
        if let Some(cached) = self.entries.get(raw) {
            return Ok(*cached);
        }

        let parsed = if raw == NA {
            None
        } else if raw.starts_with('F') || raw.starts_with('O') {
            Some(diagnostic_date())
        } else {
            let value = NaiveDateTime::parse_from_str(raw, MET_DATE_FORMAT)
                .map_err(|e| RowIssue::new(format!("unparsable timestamp '{}': {}", raw, e)))?;
            Some(value)
        };

        if self.entries.len() >= DATE_CACHE_CAPACITY {
            self.entries.clear();
        }
        self.entries.insert(raw.to_string(), parsed);
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn diagnostic_date() -> NaiveDateTime {
    let (year, month, day) = DIAGNOSTIC_DATE;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Parse a VSDB `YYYYMMDDHH` valid time
pub fn parse_vsdb_valid(raw: &str) -> Result<NaiveDateTime, RowIssue> {
    NaiveDateTime::parse_from_str(&format!("{}00", raw), "%Y%m%d%H%M")
        .map_err(|e| RowIssue::new(format!("unparsable VSDB valid time '{}': {}", raw, e)))
}

/// Whole hours of a MET lead: `HHMMSS` leads above 9999 are divided down
pub fn lead_hours(lead: i64) -> i64 {
    if lead > 9999 { lead / 10000 } else { lead }
}

/// Initialization time implied by a valid time and lead
pub fn init_from_valid(
    valid: Option<NaiveDateTime>,
    lead: i64,
) -> Result<Option<NaiveDateTime>, RowIssue> {
    let Some(valid) = valid else {
        return Ok(None);
    };
    TimeDelta::try_hours(lead_hours(lead))
        .and_then(|delta| valid.checked_sub_signed(delta))
        .map(Some)
        .ok_or_else(|| RowIssue::new(format!("lead {} is out of range for {}", lead, valid)))
}

/// Parse a lead field; `NA` is `None`
pub fn parse_lead(raw: &str) -> Result<Option<i64>, RowIssue> {
    if raw == NA {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| RowIssue::new(format!("lead '{}' is not an integer", raw)))
}

/// Render for the store
pub fn format_sql(value: &NaiveDateTime) -> String {
    value.format(SQL_DATE_FORMAT).to_string()
}
