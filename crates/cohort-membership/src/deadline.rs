//! Operation Deadlines
//!
//! Wraps any [`MembershipStore`] so that every call is bounded by a deadline.
//!
//! ## Why?
//!
//! Request handlers must never wait on the database indefinitely: a stuck
//! connection or a long lock wait would otherwise pin the request (and its
//! pool connection) forever. When the deadline elapses the inner future is
//! dropped, which drops any open transaction and rolls it back, so a timed-out
//! call leaves no partial state behind.
//!
//! The caller sees [`MembershipError::Timeout`], classified as
//! [`ErrorKind::Transient`](crate::ErrorKind::Transient).
//!
//! ## Usage Example
//!
//! ```ignore
//! use cohort_membership::{DeadlineConfig, DeadlineStore, SqliteMembershipStore};
//! use std::time::Duration;
//!
//! let store = SqliteMembershipStore::new("cohort.db").await?;
//! let store = DeadlineStore::with_config(
//!     store,
//!     DeadlineConfig { timeout: Duration::from_secs(5) },
//! );
//! ```

use crate::{
    error::{MembershipError, Result},
    types::*,
    MembershipStore,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Deadline applied to every store call.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineConfig {
    pub timeout: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// A [`MembershipStore`] whose operations fail with `Timeout` after a deadline.
pub struct DeadlineStore<S> {
    inner: S,
    config: DeadlineConfig,
}

impl<S: MembershipStore> DeadlineStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, DeadlineConfig::default())
    }

    pub fn with_config(inner: S, config: DeadlineConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = op,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Store operation exceeded deadline"
                );
                Err(MembershipError::Timeout(self.config.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: MembershipStore> MembershipStore for DeadlineStore<S> {
    async fn create_segment(&self, segment: NewSegment) -> Result<()> {
        self.bounded("create_segment", self.inner.create_segment(segment))
            .await
    }

    async fn delete_segment(&self, name: &str) -> Result<()> {
        self.bounded("delete_segment", self.inner.delete_segment(name))
            .await
    }

    async fn get_segment(&self, name: &str) -> Result<Option<Segment>> {
        self.bounded("get_segment", self.inner.get_segment(name))
            .await
    }

    async fn list_segments(&self) -> Result<Vec<Segment>> {
        self.bounded("list_segments", self.inner.list_segments())
            .await
    }

    async fn create_user(&self, id: i64) -> Result<()> {
        self.bounded("create_user", self.inner.create_user(id)).await
    }

    async fn add_segments_to_user(&self, change: MembershipChange) -> Result<()> {
        self.bounded(
            "add_segments_to_user",
            self.inner.add_segments_to_user(change),
        )
        .await
    }

    async fn delete_segments_from_user(&self, change: MembershipChange) -> Result<()> {
        self.bounded(
            "delete_segments_from_user",
            self.inner.delete_segments_from_user(change),
        )
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserSegments>> {
        self.bounded("get_user", self.inner.get_user(id)).await
    }

    async fn get_user_history(&self, query: HistoryQuery) -> Result<Vec<HistoryEntry>> {
        self.bounded("get_user_history", self.inner.get_user_history(query))
            .await
    }

    async fn sweep_expired(&self, now: i64) -> Result<u64> {
        self.bounded("sweep_expired", self.inner.sweep_expired(now))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, SqliteMembershipStore};

    /// Store whose every call hangs for `delay` before failing.
    struct SlowStore {
        delay: Duration,
    }

    impl SlowStore {
        async fn stall<T: Send>(&self) -> Result<T> {
            tokio::time::sleep(self.delay).await;
            Err(MembershipError::InvalidArgument("unreachable".into()))
        }
    }

    #[async_trait]
    impl MembershipStore for SlowStore {
        async fn create_segment(&self, _segment: NewSegment) -> Result<()> {
            self.stall().await
        }
        async fn delete_segment(&self, _name: &str) -> Result<()> {
            self.stall().await
        }
        async fn get_segment(&self, _name: &str) -> Result<Option<Segment>> {
            self.stall().await
        }
        async fn list_segments(&self) -> Result<Vec<Segment>> {
            self.stall().await
        }
        async fn create_user(&self, _id: i64) -> Result<()> {
            self.stall().await
        }
        async fn add_segments_to_user(&self, _change: MembershipChange) -> Result<()> {
            self.stall().await
        }
        async fn delete_segments_from_user(&self, _change: MembershipChange) -> Result<()> {
            self.stall().await
        }
        async fn get_user(&self, _id: i64) -> Result<Option<UserSegments>> {
            self.stall().await
        }
        async fn get_user_history(&self, _query: HistoryQuery) -> Result<Vec<HistoryEntry>> {
            self.stall().await
        }
        async fn sweep_expired(&self, _now: i64) -> Result<u64> {
            self.stall().await
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out_as_transient() {
        let store = DeadlineStore::with_config(
            SlowStore {
                delay: Duration::from_secs(30),
            },
            DeadlineConfig {
                timeout: Duration::from_millis(20),
            },
        );

        let err = store.create_user(1).await.unwrap_err();
        assert!(matches!(err, MembershipError::Timeout(_)));
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err = store.sweep_expired(0).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let inner = SqliteMembershipStore::new_in_memory().await.unwrap();
        let store = DeadlineStore::new(inner);

        store.create_segment(NewSegment::manual("beta")).await.unwrap();
        store.create_user(1).await.unwrap();
        store
            .add_segments_to_user(MembershipChange::new(1, vec!["beta".into()]))
            .await
            .unwrap();

        let user = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.segments, vec!["beta"]);

        // Inner errors are returned unchanged
        let err = store.create_user(1).await.unwrap_err();
        assert!(matches!(err, MembershipError::UserAlreadyExists(1)));
    }
}
