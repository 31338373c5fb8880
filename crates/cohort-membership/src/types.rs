//! Membership Type Definitions
//!
//! This module defines the data structures passed to and returned from the
//! membership store.
//!
//! ## Types Overview
//!
//! ### NewSegment
//! Request to create a segment, with an optional auto-enrollment percentage.
//!
//! ### Segment
//! A segment as stored in the catalog.
//!
//! ### MembershipChange
//! A batch of segments to add to (or remove from) one user, with an optional
//! time-to-live for additions.
//!
//! ### UserSegments
//! A user and the names of the segments they currently belong to.
//!
//! ### HistoryQuery / HistoryEntry
//! Month-scoped lookup into the append-only membership history.
//!
//! ## Design Decisions
//!
//! - Timestamps are i64 seconds since the Unix epoch
//! - User ids are i64 and must be positive
//! - Segments are addressed by name; the numeric id never leaves the store

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Request to create a new segment.
///
/// `auto_percent` of 0 creates an empty, manually managed segment. Any value in
/// 1..=100 enrolls `floor(total_users * auto_percent / 100)` randomly chosen
/// existing users at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSegment {
    /// Unique segment name (1..=50 characters)
    pub name: String,

    /// Share of existing users to enroll, in percent
    #[serde(default)]
    pub auto_percent: i32,
}

impl NewSegment {
    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auto_percent: 0,
        }
    }

    pub fn with_auto_percent(name: impl Into<String>, auto_percent: i32) -> Self {
        Self {
            name: name.into(),
            auto_percent,
        }
    }
}

/// A segment from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,

    /// Auto-enrollment percentage the segment was created with
    pub auto_percent: i32,

    /// Creation timestamp (seconds since Unix epoch)
    pub created_at: i64,
}

/// Segments to attach to or detach from one user.
///
/// `active_time_secs` only applies to additions: a positive value sets the
/// membership to expire that many seconds from now, anything else means the
/// membership lasts until removed explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipChange {
    pub user_id: i64,
    pub segments: Vec<String>,
    #[serde(default)]
    pub active_time_secs: i64,
}

impl MembershipChange {
    pub fn new(user_id: i64, segments: Vec<String>) -> Self {
        Self {
            user_id,
            segments,
            active_time_secs: 0,
        }
    }

    pub fn with_ttl(mut self, active_time_secs: i64) -> Self {
        self.active_time_secs = active_time_secs;
        self
    }
}

/// A user and their currently active segments, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSegments {
    pub id: i64,
    pub segments: Vec<String>,
}

/// History lookup for one user over one calendar month (UTC).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub user_id: i64,
    pub year: i32,
    /// 1..=12
    pub month: u32,
}

/// One closed membership interval.
///
/// Only closed intervals are reported by month queries, so `time_removed` is
/// always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: i64,
    pub segment: String,
    pub time_added: i64,
    pub time_removed: i64,
}

impl HistoryEntry {
    /// RFC 3339 rendering of `time_added`
    pub fn time_in(&self) -> String {
        format_timestamp(self.time_added)
    }

    /// RFC 3339 rendering of `time_removed`
    pub fn time_out(&self) -> String {
        format_timestamp(self.time_removed)
    }
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
