//! devpoold - the device pool daemon
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use devpool_core::prelude::*;

/// A shared mobile-device pool manager for test automation
#[derive(Parser, Debug)]
#[command(name = "devpoold")]
#[command(about = "A shared mobile-device pool manager for test automation", long_about = None)]
struct Args {
    /// Path to the configuration file (defaults to
    /// ~/.config/devpool/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    device_pool::run(args.config.as_deref()).await
}
