//! Cohort Service Binary
//!
//! # Environment Variables
//!
//! - `DATABASE_DSN`: PostgreSQL URL / key-value DSN, or SQLite path (required)
//! - `DATABASE_PASSWORD`: password for key/value DSNs without one (optional)
//! - `SERVER_HOST`: listen address (default: 0.0.0.0:8080)
//! - `LOG_FILE_PATH`: append logs here instead of stderr (optional)
//! - `LOG_FORMAT`: `json` or `text` (default: json)
//! - `SWEEP_INTERVAL_SECS`: expiry sweep period (default: 30)
//! - `OP_TIMEOUT_SECS`: per-operation store deadline (default: 10)
//! - `SHUTDOWN_TIMEOUT_SECS`: drain time on shutdown (default: 30)
//! - `RUST_LOG`: Log filter (default: info)
//!
//! # Example
//!
//! ```bash
//! export DATABASE_DSN="host=localhost user=postgres dbname=postgres sslmode=disable"
//! export DATABASE_PASSWORD=qwerty
//! export SERVER_HOST=:8080
//! cargo run --bin cohort
//! ```

use clap::Parser;
use cohort_api::{
    create_router, logging::init_logging, shutdown::serve_with_shutdown, AppState, Config,
};
use cohort_membership::ExpirySweeper;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_logging(config.log_format, config.log_file_path.as_deref());

    info!("Cohort segmentation service starting...");
    info!(
        listen = %config.listen_addr(),
        sweep_interval_secs = config.sweep_interval_secs,
        op_timeout_secs = config.op_timeout_secs,
        "Configuration loaded"
    );

    let store = config.connect().await?;
    info!("Membership store ready");

    let sweeper = ExpirySweeper::new(store.clone(), config.sweeper_config()).start();

    let router = create_router(AppState::new(store));
    let served = serve_with_shutdown(router, &config.listen_addr(), config.graceful_shutdown()).await;

    sweeper.stop().await;
    info!("Expiry sweeper stopped");

    served?;
    Ok(())
}
