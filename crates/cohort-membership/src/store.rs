//! SQLite Membership Store Implementation
//!
//! This module implements the [`MembershipStore`] trait using SQLite as the
//! backend.
//!
//! ## What Does This Do?
//!
//! SqliteMembershipStore persists the whole membership model in one file (or
//! in memory):
//! - `users`: registered user ids
//! - `segments`: the segment catalog
//! - `user_segments`: active memberships with optional expiration
//! - `user_segment_history`: membership intervals, keyed by segment name
//!
//! ## Usage
//!
//! ### File-Based
//! ```ignore
//! let store = SqliteMembershipStore::new("cohort.db").await?;
//! ```
//!
//! ### In-Memory (Testing)
//! ```ignore
//! let store = SqliteMembershipStore::new_in_memory().await?;
//! ```
//!
//! ## Implementation Details
//!
//! ### Connection Pool
//! - File databases use a pool of 10 connections in WAL mode with a 5s busy
//!   timeout
//! - In-memory databases use exactly one long-lived connection, because every
//!   SQLite connection to `:memory:` opens a separate database
//!
//! ### Migrations
//! - Run on construction via `sqlx::migrate!("./migrations")`
//! - Statements are `CREATE ... IF NOT EXISTS`, so reruns are harmless
//!
//! ### Transactions
//! - Every mutating operation runs in one transaction; helpers take the
//!   transaction's connection so a single-connection pool never deadlocks
//! - Writers are serialized by a store-wide lock taken before `BEGIN`. Each
//!   write transaction reads before it writes, and SQLite fails (rather than
//!   waits) when two readers both try to upgrade to a write lock

use crate::{
    error::{is_unique_violation, MembershipError, Result},
    now_secs,
    types::*,
    validate, MembershipStore,
};
use async_trait::async_trait;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite-based membership store implementation
pub struct SqliteMembershipStore {
    pool: SqlitePool,
    writer: Mutex<()>,
}

impl SqliteMembershipStore {
    /// Open (or create) a SQLite database file
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::with_pool(pool))
    }

    /// Create in-memory database (for testing)
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a write transaction. The guard must outlive the transaction.
    async fn begin_write(&self) -> Result<(MutexGuard<'_, ()>, Transaction<'static, Sqlite>)> {
        let guard = self.writer.lock().await;
        let tx = self.pool.begin().await?;
        Ok((guard, tx))
    }
}

fn segment_from_row(row: &SqliteRow) -> Result<Segment> {
    Ok(Segment {
        name: row.try_get("name")?,
        auto_percent: row.try_get("auto_percent")?,
        created_at: row.try_get("created_at")?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        user_id: row.try_get("user_id")?,
        segment: row.try_get("segment_name")?,
        time_added: row.try_get("time_added")?,
        time_removed: row.try_get("time_removed")?,
    })
}

async fn user_exists(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

async fn segment_id(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM segments WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Resolves names to ids, failing with every unknown name at once.
async fn resolve_segments(
    conn: &mut SqliteConnection,
    names: &[String],
) -> Result<Vec<(String, i64)>> {
    let mut resolved = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        match segment_id(conn, name).await? {
            Some(id) => resolved.push((name.clone(), id)),
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(MembershipError::SegmentsNotFound(missing));
    }
    Ok(resolved)
}

/// Inserts the pair with a fresh open history row, or, if the pair is already
/// active, only overwrites its expiration.
async fn attach(
    conn: &mut SqliteConnection,
    user_id: i64,
    segment_id: i64,
    segment_name: &str,
    now: i64,
    time_out: Option<i64>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT INTO user_segments (user_id, segment_id, time_in, time_out)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (user_id, segment_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(segment_id)
    .bind(now)
    .bind(time_out)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        sqlx::query("UPDATE user_segments SET time_out = ? WHERE user_id = ? AND segment_id = ?")
            .bind(time_out)
            .bind(user_id)
            .bind(segment_id)
            .execute(&mut *conn)
            .await?;
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO user_segment_history (user_id, segment_name, time_added, time_removed)
         VALUES (?, ?, ?, NULL)",
    )
    .bind(user_id)
    .bind(segment_name)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stamps the most recently opened, still-open interval of a pair.
async fn close_history(
    conn: &mut SqliteConnection,
    user_id: i64,
    segment_name: &str,
    at: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE user_segment_history SET time_removed = ?
         WHERE id = (
             SELECT id FROM user_segment_history
             WHERE user_id = ? AND segment_name = ? AND time_removed IS NULL
             ORDER BY time_added DESC, id DESC
             LIMIT 1
         )",
    )
    .bind(at)
    .bind(user_id)
    .bind(segment_name)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl MembershipStore for SqliteMembershipStore {
    async fn create_segment(&self, segment: NewSegment) -> Result<()> {
        validate::segment_name(&segment.name)?;
        validate::auto_percent(segment.auto_percent)?;

        let (_writer, mut tx) = self.begin_write().await?;
        let now = now_secs();

        if segment_id(&mut tx, &segment.name).await?.is_some() {
            return Err(MembershipError::SegmentAlreadyExists(segment.name));
        }

        let new_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO segments (name, auto_percent, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&segment.name)
        .bind(segment.auto_percent)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MembershipError::SegmentAlreadyExists(segment.name.clone())
            } else {
                MembershipError::from(e)
            }
        })?;

        if segment.auto_percent > 0 {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(&mut *tx)
                .await?;
            let count = validate::auto_enroll_count(total, segment.auto_percent);

            let user_ids = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM users ORDER BY RANDOM() LIMIT ?",
            )
            .bind(count)
            .fetch_all(&mut *tx)
            .await?;

            for user_id in &user_ids {
                attach(&mut tx, *user_id, new_id, &segment.name, now, None).await?;
            }

            info!(
                segment = %segment.name,
                auto_percent = segment.auto_percent,
                total_users = total,
                enrolled = user_ids.len(),
                "Auto-enrolled users into new segment"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_segment(&self, name: &str) -> Result<()> {
        let (_writer, mut tx) = self.begin_write().await?;
        let now = now_secs();

        let id = segment_id(&mut tx, name)
            .await?
            .ok_or_else(|| MembershipError::SegmentNotFound(name.to_string()))?;

        let removed = sqlx::query("DELETE FROM user_segments WHERE segment_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "UPDATE user_segment_history SET time_removed = ?
             WHERE segment_name = ? AND (time_removed IS NULL OR time_removed > ?)",
        )
        .bind(now)
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM segments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(segment = %name, memberships_removed = removed, "Segment deleted");
        Ok(())
    }

    async fn get_segment(&self, name: &str) -> Result<Option<Segment>> {
        let row = sqlx::query("SELECT name, auto_percent, created_at FROM segments WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(segment_from_row).transpose()
    }

    async fn list_segments(&self) -> Result<Vec<Segment>> {
        let rows = sqlx::query("SELECT name, auto_percent, created_at FROM segments ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(segment_from_row).collect()
    }

    async fn create_user(&self, id: i64) -> Result<()> {
        validate::user_id(id)?;

        let _writer = self.writer.lock().await;
        sqlx::query("INSERT INTO users (id) VALUES (?)")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MembershipError::UserAlreadyExists(id)
                } else {
                    MembershipError::from(e)
                }
            })?;

        Ok(())
    }

    async fn add_segments_to_user(&self, change: MembershipChange) -> Result<()> {
        validate::user_id(change.user_id)?;
        let names = validate::segment_names(&change.segments)?;

        let (_writer, mut tx) = self.begin_write().await?;
        let now = now_secs();
        let time_out = validate::expiry(now, change.active_time_secs);

        if !user_exists(&mut tx, change.user_id).await? {
            return Err(MembershipError::UserNotFound(change.user_id));
        }

        for (name, id) in resolve_segments(&mut tx, &names).await? {
            attach(&mut tx, change.user_id, id, &name, now, time_out).await?;
        }

        tx.commit().await?;

        debug!(
            user_id = change.user_id,
            segments = names.len(),
            time_out = ?time_out,
            "Segments added to user"
        );
        Ok(())
    }

    async fn delete_segments_from_user(&self, change: MembershipChange) -> Result<()> {
        validate::user_id(change.user_id)?;
        let names = validate::segment_names(&change.segments)?;

        let (_writer, mut tx) = self.begin_write().await?;
        let now = now_secs();

        if !user_exists(&mut tx, change.user_id).await? {
            return Err(MembershipError::UserNotFound(change.user_id));
        }

        let mut removed = 0u64;
        for (name, id) in resolve_segments(&mut tx, &names).await? {
            let deleted =
                sqlx::query("DELETE FROM user_segments WHERE user_id = ? AND segment_id = ?")
                    .bind(change.user_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

            if deleted > 0 {
                close_history(&mut tx, change.user_id, &name, now).await?;
                removed += deleted;
            }
        }

        tx.commit().await?;

        debug!(user_id = change.user_id, removed, "Segments removed from user");
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserSegments>> {
        let mut tx = self.pool.begin().await?;

        if !user_exists(&mut tx, id).await? {
            return Ok(None);
        }

        let segments = sqlx::query_scalar::<_, String>(
            "SELECT s.name
             FROM user_segments us
             JOIN segments s ON us.segment_id = s.id
             WHERE us.user_id = ?
             ORDER BY s.name",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(UserSegments { id, segments }))
    }

    async fn get_user_history(&self, query: HistoryQuery) -> Result<Vec<HistoryEntry>> {
        validate::user_id(query.user_id)?;
        let (start, end) = validate::month_window(query.year, query.month)?;

        let rows = sqlx::query(
            "SELECT user_id, segment_name, time_added, time_removed
             FROM user_segment_history
             WHERE user_id = ? AND time_added > ? AND time_removed < ?
             ORDER BY time_added, id",
        )
        .bind(query.user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    async fn sweep_expired(&self, now: i64) -> Result<u64> {
        let (_writer, mut tx) = self.begin_write().await?;

        let expired = sqlx::query(
            "SELECT us.user_id, us.segment_id, s.name, us.time_out
             FROM user_segments us
             JOIN segments s ON us.segment_id = s.id
             WHERE us.time_out IS NOT NULL AND us.time_out <= ?",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let mut retired = 0u64;
        for row in expired {
            let user_id: i64 = row.try_get("user_id")?;
            let segment_id: i64 = row.try_get("segment_id")?;
            let name: String = row.try_get("name")?;
            let time_out: i64 = row.try_get("time_out")?;

            // Re-check the deadline: a concurrent re-add may have extended it.
            let deleted = sqlx::query(
                "DELETE FROM user_segments
                 WHERE user_id = ? AND segment_id = ?
                   AND time_out IS NOT NULL AND time_out <= ?",
            )
            .bind(user_id)
            .bind(segment_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if deleted > 0 {
                close_history(&mut tx, user_id, &name, time_out).await?;
                retired += deleted;
            }
        }

        tx.commit().await?;
        Ok(retired)
    }
}
