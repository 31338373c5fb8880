//! Graceful Shutdown for the Cohort API Server
//!
//! Provides utilities for handling graceful shutdown with signal handling.
//!
//! ## Features
//!
//! - SIGINT (Ctrl+C) handling
//! - SIGTERM handling (Unix only)
//! - Bounded wait for in-flight requests
//!
//! ## Usage
//!
//! ```ignore
//! use cohort_api::shutdown::{GracefulShutdown, serve_with_shutdown};
//!
//! let router = create_router(state);
//!
//! // Waits for in-flight requests on SIGINT/SIGTERM, at most 30s
//! serve_with_shutdown(router, "0.0.0.0:8080", GracefulShutdown::default()).await?;
//! ```

use std::future::{Future, IntoFuture};
use std::io;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    /// Maximum time to wait for in-flight requests to complete
    pub timeout: Duration,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl GracefulShutdown {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Shutdown signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
        }
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// If a handler cannot be installed, that signal is never reported and the
/// other one still is.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        ShutdownSignal::SigInt
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        ShutdownSignal::SigTerm
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}

/// Start the API server with graceful shutdown on SIGINT/SIGTERM
pub async fn serve_with_shutdown(
    router: axum::Router,
    addr: &str,
    config: GracefulShutdown,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "REST API server listening");
    tracing::info!("   Health: http://{}/health", addr);
    tracing::info!("   Graceful shutdown timeout: {:?}", config.timeout);

    let signal = async {
        let signal = shutdown_signal().await;
        tracing::info!("Received {}, initiating graceful shutdown...", signal);
    };

    serve_with_custom_shutdown(router, listener, signal, config.timeout).await
}

/// Serve on an already bound listener until `signal` completes, then give
/// in-flight requests up to `timeout` to finish.
pub async fn serve_with_custom_shutdown<F>(
    router: axum::Router,
    listener: TcpListener,
    signal: F,
    timeout: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signaled_tx, signaled_rx) = oneshot::channel::<()>();
    let signal = async move {
        signal.await;
        let _ = signaled_tx.send(());
    };

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    let drain_deadline = async {
        if signaled_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(timeout).await;
    };

    tokio::select! {
        result = &mut server => {
            result?;
            tracing::info!("Server shut down gracefully");
        }
        _ = drain_deadline => {
            tracing::warn!(timeout = ?timeout, "In-flight requests did not finish in time, shutting down");
        }
    }

    Ok(())
}
