//! Service configuration
//!
//! Every setting can be given as a flag or an environment variable:
//!
//! ```bash
//! DATABASE_DSN="host=db user=postgres dbname=postgres sslmode=disable" \
//! DATABASE_PASSWORD=qwerty \
//! SERVER_HOST=:8080 \
//! LOG_FILE_PATH=/var/log/cohort.log \
//! cohort
//! ```
//!
//! `DATABASE_DSN` selects the backend: a `postgres://` URL or a libpq
//! key/value string connects to PostgreSQL, anything else is a SQLite file
//! path (`:memory:` for a throwaway database).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use cohort_membership::{
    DeadlineConfig, DeadlineStore, MembershipError, MembershipStore, SqliteMembershipStore,
    SweeperConfig,
};
use tracing::info;

use crate::shutdown::GracefulShutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable
    Text,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "cohort", version, about = "Dynamic user segmentation service")]
pub struct Config {
    /// PostgreSQL URL, libpq key/value DSN, or SQLite path
    #[arg(long, env = "DATABASE_DSN")]
    pub database_dsn: String,

    /// Password for key/value DSNs that do not carry one
    #[arg(long, env = "DATABASE_PASSWORD", hide_env_values = true)]
    pub database_password: Option<String>,

    /// Listen address; `:port` binds all interfaces
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0:8080")]
    pub server_host: String,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "LOG_FILE_PATH")]
    pub log_file_path: Option<PathBuf>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Seconds between expiry sweeps
    #[arg(
        long,
        env = "SWEEP_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_secs: u64,

    /// Deadline for a single store operation
    #[arg(
        long,
        env = "OP_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub op_timeout_secs: u64,

    /// Time allowed for in-flight requests on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
}

/// Storage backend selected by the DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Postgres {
        dsn: String,
        password: Option<String>,
    },
    Sqlite(String),
}

impl Config {
    pub fn backend(&self) -> Backend {
        let dsn = self.database_dsn.trim();

        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            return Backend::Postgres {
                dsn: dsn.to_string(),
                password: None,
            };
        }

        if dsn.contains('=') {
            let has_password = dsn.split_whitespace().any(|kv| kv.starts_with("password="));
            return Backend::Postgres {
                dsn: dsn.to_string(),
                password: self.database_password.clone().filter(|_| !has_password),
            };
        }

        Backend::Sqlite(dsn.to_string())
    }

    pub fn listen_addr(&self) -> String {
        let host = self.server_host.trim();
        if host.starts_with(':') {
            format!("0.0.0.0{}", host)
        } else {
            host.to_string()
        }
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    pub fn deadline_config(&self) -> DeadlineConfig {
        DeadlineConfig {
            timeout: Duration::from_secs(self.op_timeout_secs),
        }
    }

    pub fn graceful_shutdown(&self) -> GracefulShutdown {
        GracefulShutdown::with_timeout(Duration::from_secs(self.shutdown_timeout_secs))
    }

    /// Open the configured store, run migrations and wrap it with operation
    /// deadlines.
    pub async fn connect(&self) -> Result<Arc<dyn MembershipStore>, MembershipError> {
        let deadline = self.deadline_config();

        match self.backend() {
            Backend::Postgres { dsn, password } => {
                #[cfg(feature = "postgres")]
                {
                    use cohort_membership::PostgresMembershipStore;

                    info!("Using PostgreSQL membership store");
                    let store = match password {
                        Some(password) => {
                            PostgresMembershipStore::with_password(&dsn, &password).await?
                        }
                        None => PostgresMembershipStore::new(&dsn).await?,
                    };
                    Ok(Arc::new(DeadlineStore::with_config(store, deadline)))
                }
                #[cfg(not(feature = "postgres"))]
                {
                    let _ = (dsn, password);
                    Err(MembershipError::InvalidArgument(
                        "PostgreSQL DSN provided but postgres feature not enabled".to_string(),
                    ))
                }
            }
            Backend::Sqlite(path) => {
                info!(path = %path, "Using SQLite membership store");
                let store = if path == ":memory:" {
                    SqliteMembershipStore::new_in_memory().await?
                } else {
                    SqliteMembershipStore::new(&path).await?
                };
                Ok(Arc::new(DeadlineStore::with_config(store, deadline)))
            }
        }
    }
}
