//! Cohort Membership Engine
//!
//! This crate owns every read and write of user-to-segment associations: the
//! segment catalog, active memberships (with optional expiration) and the
//! append-only membership history.
//!
//! ## Data Model
//!
//! - **Users**: positive integer ids, created once and never updated
//! - **Segments**: named cohorts, optionally auto-populated with a random
//!   percentage of existing users at creation time
//! - **Memberships**: at most one active row per (user, segment), with
//!   `time_in` and an optional `time_out`
//! - **History**: one interval per membership, opened on creation and closed
//!   on removal, segment deletion or expiry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────────┐
//! │  HTTP shell  │─────▶│ MembershipStore  │ ◄── You are here
//! └──────────────┘      │ (SQLite/Postgres)│
//!                       └────────▲─────────┘
//!                                │ sweep_expired()
//!                       ┌────────┴─────────┐
//!                       │  ExpirySweeper   │
//!                       └──────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use cohort_membership::{MembershipChange, MembershipStore, NewSegment, SqliteMembershipStore};
//!
//! let store = SqliteMembershipStore::new_in_memory().await?;
//!
//! store.create_segment(NewSegment::manual("beta")).await?;
//! store.create_user(1).await?;
//! store
//!     .add_segments_to_user(MembershipChange::new(1, vec!["beta".into()]).with_ttl(3600))
//!     .await?;
//!
//! let user = store.get_user(1).await?.unwrap();
//! assert_eq!(user.segments, vec!["beta"]);
//! ```
//!
//! ## Consistency
//!
//! Every multi-row operation runs in a single transaction. Any error rolls the
//! whole operation back. The store is the only shared state; nothing is cached
//! in process.

pub mod deadline;
pub mod error;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod validate;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use deadline::{DeadlineConfig, DeadlineStore};
pub use error::{ErrorKind, MembershipError, Result};
pub use store::SqliteMembershipStore;
pub use sweeper::{ExpirySweeper, SweeperConfig, SweeperHandle, SweeperStats};
pub use types::*;

#[cfg(feature = "postgres")]
pub use postgres::PostgresMembershipStore;

use async_trait::async_trait;

/// Membership store trait - abstracts over storage backends.
///
/// Implementations must be `Send + Sync` so the store can be shared across
/// request handlers and the expiry sweeper as `Arc<dyn MembershipStore>`.
///
/// ## Error Handling
///
/// Argument errors (`InvalidArgument`) are returned before any transaction is
/// opened. Every other error rolls back the whole operation.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    // ============================================================
    // SEGMENT OPERATIONS
    // ============================================================

    /// Create a segment, enrolling a random share of existing users when
    /// `auto_percent > 0`.
    ///
    /// The segment and all auto-enrolled memberships (with their history rows)
    /// are created in one transaction.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: empty/long name or percent outside 0..=100
    /// - `SegmentAlreadyExists`: name is taken
    async fn create_segment(&self, segment: NewSegment) -> Result<()>;

    /// Delete a segment, its active memberships, and close its open history.
    ///
    /// History rows already closed are left untouched.
    ///
    /// # Errors
    ///
    /// - `SegmentNotFound`: no segment with this name
    async fn delete_segment(&self, name: &str) -> Result<()>;

    /// Get a segment from the catalog.
    async fn get_segment(&self, name: &str) -> Result<Option<Segment>>;

    /// List all segments, ordered by name.
    async fn list_segments(&self) -> Result<Vec<Segment>>;

    // ============================================================
    // USER OPERATIONS
    // ============================================================

    /// Register a user.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: id is not positive
    /// - `UserAlreadyExists`: id is taken
    async fn create_user(&self, id: i64) -> Result<()>;

    /// Attach segments to a user.
    ///
    /// A pair that is not yet active is inserted with a new open history row.
    /// A pair that is already active keeps its `time_in` and open history row;
    /// only its expiration is overwritten.
    ///
    /// # Errors
    ///
    /// - `UserNotFound`: user does not exist
    /// - `SegmentsNotFound`: one or more names are unknown (nothing is applied)
    async fn add_segments_to_user(&self, change: MembershipChange) -> Result<()>;

    /// Detach segments from a user, closing the most recent open history row
    /// of each pair. Pairs that are not active are skipped.
    ///
    /// # Errors
    ///
    /// - `UserNotFound`: user does not exist
    /// - `SegmentsNotFound`: one or more names are unknown (nothing is applied)
    async fn delete_segments_from_user(&self, change: MembershipChange) -> Result<()>;

    /// Get a user and their active segments.
    ///
    /// Returns `Ok(None)` for an unknown user.
    async fn get_user(&self, id: i64) -> Result<Option<UserSegments>>;

    /// Closed membership intervals for a user within a calendar month.
    ///
    /// Returns rows with `time_added > start` and `time_removed < end`, where
    /// the window runs from the first of the month to one day past the first
    /// of the next month. Open intervals are never reported.
    async fn get_user_history(&self, query: HistoryQuery) -> Result<Vec<HistoryEntry>>;

    // ============================================================
    // EXPIRY
    // ============================================================

    /// Retire every membership with `time_out <= now`, closing each one's
    /// open history row at its `time_out`. Returns the number retired.
    async fn sweep_expired(&self, now: i64) -> Result<u64>;
}

/// Current time in seconds since the Unix epoch.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
