//! warpblend - warp mesh and blend buffer generation for projector walls
//!
//! Reads a display-wall topology plus per-display warp and blend grids,
//! builds the triangle mesh and RGBA blend mask for every display output,
//! and hands them to the display-control backend one output at a time.

mod blend;
mod config;
mod debug_image;
mod dispatch;
mod error;
mod mesh;
mod pipeline;
mod tokens;
mod topology;
mod warp;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// warpblend - projector warp and blend calibration loader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Topology file (overrides paths.topology)
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Write meshes and blend buffers into this directory
    #[arg(short, long)]
    export_dir: Option<PathBuf>,

    /// Post-dispatch settle timeout in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Skip the blend debug images
    #[arg(long)]
    no_debug_image: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("warpblend v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::Config::load_or_create(&args.config)?;

    // CLI args override the config file
    if let Some(topology) = args.topology {
        config.paths.topology = topology;
    }
    if let Some(dir) = args.export_dir {
        config.dispatch.export_dir = Some(dir);
    }
    if let Some(ms) = args.settle_ms {
        config.dispatch.settle_timeout_ms = ms;
    }
    if args.no_debug_image {
        config.debug.dump_blend_image = false;
    }

    // A broken topology aborts before anything is dispatched
    let topology = topology::Topology::load(&config.paths.topology)
        .context("Cannot start calibration run")?;

    let mut dispatcher = dispatch::ExportDispatcher::new(config.dispatch.export_dir.clone());
    let summary = pipeline::Pipeline::new(&topology, &config).run(&mut dispatcher);
    info!("Dispatcher: {}", dispatcher.info());

    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            "{} of {} display output(s) failed",
            summary.failed(),
            summary.processed()
        );
        Ok(ExitCode::FAILURE)
    }
}
