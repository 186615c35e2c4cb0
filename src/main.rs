//! OBS Live Indicator - shows an "on air" marker on every monitor while OBS
//! is streaming
//!
//! Follows OBS over obs-websocket, reconnecting on its own, and keeps one
//! click-through indicator per monitor in sync with the stream state.

mod app;
mod config;
mod connection;
mod dashboard;
mod logging;
mod overlay;
mod shared;
mod storage;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::app::IndicatorApp;
use crate::config::AppConfig;
use crate::overlay::topology::platform_topology;

/// OBS Live Indicator
#[derive(Parser, Debug)]
#[command(name = "obs-live-indicator")]
#[command(about = "Shows a live indicator on every monitor while OBS is streaming")]
struct Args {
    /// Config file to use instead of the one in the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG is honoured)
    #[arg(long)]
    debug: bool,

    /// List monitors with their DPI scale and exit
    #[arg(long)]
    list_monitors: bool,

    /// Write the default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => storage::default_config_path()?,
    };

    if args.write_default_config {
        config::save_config(&AppConfig::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let loaded = config_path
        .exists()
        .then(|| config::load_config(&config_path));
    let config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => AppConfig::default(),
    };

    let log_dir = match storage::get_log_dir() {
        Ok(dir) => Some(dir),
        Err(e) => {
            eprintln!("File logging disabled: {:#}", e);
            None
        }
    };
    let _log_guard = logging::init(args.debug || config.logging.debug, log_dir.as_deref());

    match loaded {
        Some(Ok(_)) => info!("Loaded configuration from {:?}", config_path),
        Some(Err(e)) => warn!("Ignoring invalid configuration {:?}: {:#}", config_path, e),
        None => info!("No configuration at {:?}, using defaults", config_path),
    }

    if args.list_monitors {
        list_monitors();
        return Ok(());
    }

    info!("OBS Live Indicator starting...");

    let host = IndicatorApp::new(config)?;
    if let Err(e) = dashboard::app::run_dashboard(host) {
        error!("Dashboard error: {}", e);
    }

    info!("OBS Live Indicator shutdown complete");
    Ok(())
}

fn list_monitors() {
    let (topology, _) = platform_topology();
    match topology.enumerate_monitors() {
        Ok(monitors) => {
            println!("Available monitors:");
            for (index, monitor) in monitors.iter().enumerate() {
                let logical = monitor.logical_rect();
                println!(
                    "  [{}] {}x{} at ({}, {}), scale {:.2} -> {:.0}x{:.0} units",
                    index,
                    monitor.width,
                    monitor.height,
                    monitor.left,
                    monitor.top,
                    monitor.dpi_scale_x,
                    logical.width(),
                    logical.height(),
                );
            }
        }
        Err(e) => println!("Monitors unavailable: {}", e),
    }
}
