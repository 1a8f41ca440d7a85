//! Logging bootstrap
//!
//! Operator-facing lines go to stderr; a daily rolling file under the
//! user data dir keeps the full record with source locations. The
//! `DEVPOOL_LOG` environment variable overrides the default filter.

use std::io;
use std::path::PathBuf;

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

const DEFAULT_FILTER: &str = "device_pool=info,devpool=info,warn";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install the global subscriber. Call once, before any task spawns.
pub fn init() -> Result<()> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;

    let filter = EnvFilter::try_from_env("DEVPOOL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()));

    let file_layer = fmt::layer()
        .with_writer(tracing_appender::rolling::daily(&dir, "devpool.log"))
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!("Logging to {}", dir.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devpool")
        .join("logs")
}
