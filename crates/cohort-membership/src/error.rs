//! Membership Error Types
//!
//! This module defines all error types that can occur during membership operations.
//!
//! ## Error Categories
//!
//! ### Client Errors
//! - `InvalidArgument`: Malformed id, out-of-range percentage, bad month/year
//! - `UserNotFound` / `SegmentNotFound` / `SegmentsNotFound`: Referenced entity is missing
//! - `UserAlreadyExists` / `SegmentAlreadyExists`: Duplicate creation
//!
//! ### Server Errors
//! - `Timeout`: Operation exceeded its deadline (retryable)
//! - `DatabaseError`: SQLx/database operation failed (connection, deadlock, ...)
//! - `MigrationError`: Schema setup failed at startup
//!
//! ## Usage
//!
//! All store operations return `Result<T>`, aliased to
//! `Result<T, MembershipError>`. Callers that only care about the category use
//! [`MembershipError::kind`]:
//!
//! ```ignore
//! use cohort_membership::{ErrorKind, MembershipStore};
//!
//! match store.create_user(42).await {
//!     Ok(()) => println!("Created!"),
//!     Err(e) if e.kind() == ErrorKind::AlreadyExists => println!("User 42 exists"),
//!     Err(e) => return Err(e),
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MembershipError>;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    #[error("Segments not found: {}", .0.join(", "))]
    SegmentsNotFound(Vec<String>),

    #[error("User already exists: {0}")]
    UserAlreadyExists(i64),

    #[error("Segment already exists: {0}")]
    SegmentAlreadyExists(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<sqlx::migrate::MigrateError> for MembershipError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        MembershipError::MigrationError(e.to_string())
    }
}

/// Coarse error category, used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before touching the store. Never retried.
    InvalidArgument,
    NotFound,
    AlreadyExists,
    /// Deadline exceeded; safe to retry.
    Transient,
    StoreFailure,
}

impl MembershipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::UserNotFound(_) | Self::SegmentNotFound(_) | Self::SegmentsNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::UserAlreadyExists(_) | Self::SegmentAlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Timeout(_) => ErrorKind::Transient,
            Self::DatabaseError(sqlx::Error::PoolTimedOut) => ErrorKind::Transient,
            Self::DatabaseError(_) | Self::MigrationError(_) => ErrorKind::StoreFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// True when the database rejected a write on a UNIQUE / PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
