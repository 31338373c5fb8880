//! Expiry Sweeper Background Task
//!
//! Periodically retires memberships whose `time_out` has passed.
//!
//! ## How Sweeping Works
//!
//! 1. Wake up every `interval` (default: 30 seconds)
//! 2. Call [`MembershipStore::sweep_expired`] with the current time
//! 3. The store deletes every membership with `time_out <= now` and closes
//!    its open history row at `time_out`, all in one transaction
//!
//! A failed pass is logged and retried on the next tick; the loop only exits
//! when the handle is stopped. Between passes an expired membership may still
//! be reported as active, so expiry is enforced with up to one interval of lag.
//!
//! ## Usage Example
//!
//! ```ignore
//! let sweeper = ExpirySweeper::new(store.clone(), SweeperConfig::default());
//! let handle = sweeper.start();
//!
//! // ... serve requests ...
//!
//! handle.stop().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{error::Result, now_secs, MembershipStore};

/// Sweeper configuration
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweep passes (default: 30 seconds)
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Counters updated by the sweeper loop.
#[derive(Debug, Default)]
struct SweeperCounters {
    passes: AtomicU64,
    retired: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of the sweeper counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweeperStats {
    /// Passes that completed without error
    pub passes: u64,
    /// Memberships retired across all passes
    pub retired: u64,
    /// Passes that failed
    pub failures: u64,
}

/// Expiry sweeper background task
pub struct ExpirySweeper {
    store: Arc<dyn MembershipStore>,
    config: SweeperConfig,
    counters: Arc<SweeperCounters>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn MembershipStore>, config: SweeperConfig) -> Self {
        Self {
            store,
            config,
            counters: Arc::new(SweeperCounters::default()),
        }
    }

    /// Run a single pass against the current time.
    pub async fn sweep_once(&self) -> Result<u64> {
        self.sweep_at(now_secs()).await
    }

    async fn sweep_at(&self, now: i64) -> Result<u64> {
        match self.store.sweep_expired(now).await {
            Ok(retired) => {
                self.counters.passes.fetch_add(1, Ordering::Relaxed);
                self.counters.retired.fetch_add(retired, Ordering::Relaxed);
                if retired > 0 {
                    debug!(retired, "Retired expired memberships");
                }
                Ok(retired)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> SweeperStats {
        self.counters.snapshot()
    }

    /// Start the sweep loop. The first pass runs immediately.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let counters = self.counters.clone();

        let join = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval = ?self.config.interval, "Expiry sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(
                                error = %e,
                                failures = self.counters.failures.load(Ordering::Relaxed),
                                "Expiry sweep failed"
                            );
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Expiry sweeper shutting down");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
            counters,
        }
    }
}

impl SweeperCounters {
    fn snapshot(&self) -> SweeperStats {
        SweeperStats {
            passes: self.passes.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running sweeper.
///
/// Dropping the handle without calling [`SweeperHandle::stop`] also ends the
/// loop, since the shutdown channel closes.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    counters: Arc<SweeperCounters>,
}

impl SweeperHandle {
    pub fn stats(&self) -> SweeperStats {
        self.counters.snapshot()
    }

    /// Signal the loop and wait for it to exit. An in-flight pass is allowed
    /// to finish first.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.join).await {
            error!(error = %e, "Expiry sweeper task panicked");
        }
    }
}
