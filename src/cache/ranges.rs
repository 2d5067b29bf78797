//! Date domain for the cache: the default fetch window, covered-range
//! keys, and the fetched-range bookkeeping shared with mirror storage.
//!
//! Covered ranges are keyed by the local `YYYY-MM-DD` date of the
//! `since` used to load; membership is exact string equality.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Monday 00:00:00 (local timezone) of the week containing now.
pub fn default_fetch_start() -> DateTime<Utc> {
    let today = Local::now();
    let monday = today.date_naive() - Days::new(u64::from(today.weekday().num_days_from_monday()));
    start_of_day(monday)
}

/// Local midnight of the given date, as a UTC instant.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // A DST hole at midnight; fall back to the naive UTC reading.
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Covered-range key for a load boundary: the local date as `YYYY-MM-DD`.
pub fn to_date_string(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// A contiguous stretch of fetched history recorded in a mirror's config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Merge a new range into the set, collapsing overlaps and adjacency of
/// at most one day. The result is sorted and maximal, so coverage checks
/// reduce to single-range containment.
pub fn merge_range(ranges: &mut Vec<FetchedRange>, new: FetchedRange) {
    ranges.push(normalized(new));
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<FetchedRange> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if range.start <= last.end + Days::new(1) => {
                if range.end > last.end {
                    last.end = range.end;
                }
            }
            _ => merged.push(range),
        }
    }
    *ranges = merged;
}

/// True when `start..=end` lies inside a single recorded range. Gaps
/// between ranges count as uncovered.
pub fn is_covered(ranges: &[FetchedRange], start: NaiveDate, end: NaiveDate) -> bool {
    ranges.iter().any(|r| r.start <= start && r.end >= end)
}

/// Earliest recorded start across all ranges.
pub fn oldest_start(ranges: &[FetchedRange]) -> Option<NaiveDate> {
    ranges.iter().map(|r| r.start).min()
}

fn normalized(range: FetchedRange) -> FetchedRange {
    if range.end < range.start {
        FetchedRange {
            start: range.end,
            end: range.start,
        }
    } else {
        range
    }
}
