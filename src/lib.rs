//! Device Pool Library
//!
//! A shared mobile-device pool manager for test automation. The daemon
//! tracks connected Android and iOS devices, queues reservations, and
//! locks devices behind per-device automation servers.

use std::path::Path;
use std::sync::Arc;

use devpool_core::prelude::*;
use devpool_core::Settings;
use devpool_engine::Engine;

// Re-export the crates behind one facade
pub use devpool_agent as agent;
pub use devpool_core as core;
pub use devpool_engine as engine;

/// Run the daemon until Ctrl-C or a fatal error.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    color_eyre::install().map_err(|e| Error::process(e.to_string()))?;
    devpool_core::logging::init()?;

    let settings = Settings::load(config_path)?;
    let engine = Arc::new(Engine::new(settings)?);
    engine.check_tools()?;

    let signal_engine = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            signal_engine.shutdown();
        }
    });

    engine.run().await
}
