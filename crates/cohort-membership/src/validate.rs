//! Argument checks shared by every backend.
//!
//! Everything here runs before a transaction is opened.

use chrono::{NaiveDate, TimeZone, Utc};

use crate::error::{MembershipError, Result};

/// Width of the `segments.name` column.
pub const MAX_SEGMENT_NAME_LEN: usize = 50;

pub fn user_id(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(MembershipError::InvalidArgument(format!(
            "user id must be positive, got {}",
            id
        )));
    }
    Ok(())
}

pub fn segment_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MembershipError::InvalidArgument(
            "segment name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_SEGMENT_NAME_LEN {
        return Err(MembershipError::InvalidArgument(format!(
            "segment name longer than {} characters",
            MAX_SEGMENT_NAME_LEN
        )));
    }
    Ok(())
}

pub fn auto_percent(percent: i32) -> Result<()> {
    if !(0..=100).contains(&percent) {
        return Err(MembershipError::InvalidArgument(format!(
            "auto percent must be within 0..=100, got {}",
            percent
        )));
    }
    Ok(())
}

/// Validates every name and drops repeats, keeping first-seen order.
pub fn segment_names(names: &[String]) -> Result<Vec<String>> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        segment_name(name)?;
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    Ok(unique)
}

/// Number of users enrolled by a segment created with `percent`.
pub fn auto_enroll_count(total_users: i64, percent: i32) -> i64 {
    total_users * i64::from(percent) / 100
}

/// Expiration timestamp for a membership created at `now`.
pub fn expiry(now: i64, active_time_secs: i64) -> Option<i64> {
    (active_time_secs > 0).then(|| now.saturating_add(active_time_secs))
}

/// History window for a calendar month, as `(start, end)` epoch seconds.
///
/// `start` is the first of the month at 00:00 UTC. `end` is the first of the
/// following month plus one day; the extra day absorbs boundary and timezone
/// slop in callers.
pub fn month_window(year: i32, month: u32) -> Result<(i64, i64)> {
    if !(1..=12).contains(&month) {
        return Err(MembershipError::InvalidArgument(format!(
            "month must be within 1..=12, got {}",
            month
        )));
    }

    let invalid_year =
        || MembershipError::InvalidArgument(format!("year {} is out of range", year));

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid_year)?;
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1).ok_or_else(invalid_year)?, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.succ_opt())
        .ok_or_else(invalid_year)?;

    let start = midnight_utc(first).ok_or_else(invalid_year)?;
    let end = midnight_utc(end).ok_or_else(invalid_year)?;
    Ok((start, end))
}

fn midnight_utc(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight).timestamp())
}
