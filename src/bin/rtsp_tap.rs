//! rtsp_tap - consume an RTSP stream and log each decoded frame
//!
//! This binary:
//! 1. Builds an RTSP -> decode -> RGB pipeline
//! 2. Logs the shape and element type of every frame pulled from the sink
//! 3. On Ctrl-C, sends EOS and waits for it before tearing the pipeline down

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use rtsp_frame_tap::{consume, Outcome, ShutdownSignal, TapConfig, TapOverrides};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Consume an RTSP stream and log the layout of each decoded frame"
)]
struct Args {
    /// RTSP URL to consume (or stub://name?frames=N for a synthetic stream).
    rtsp_url: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Optional JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// RTSP jitter buffer latency in milliseconds.
    #[arg(long)]
    latency_ms: Option<u32>,

    /// Raw video format requested from the converter (e.g. RGB, BGR, GRAY8).
    #[arg(long)]
    format: Option<String>,

    /// Seconds to wait for EOS after an interrupt.
    #[arg(long)]
    drain_timeout_secs: Option<u64>,

    /// Do not insert a queue ahead of the sink.
    #[arg(long)]
    no_queue: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = TapConfig::load(TapOverrides {
        url: args.rtsp_url,
        config_path: args.config,
        debug: args.debug,
        latency_ms: args.latency_ms,
        format: args.format,
        drain_timeout_secs: args.drain_timeout_secs,
        no_queue: args.no_queue,
    })?;

    let shutdown = ShutdownSignal::new();
    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || handler_signal.trigger())
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let report = consume(&config, &shutdown)?;
    match report.outcome {
        Outcome::Failed(message) => Err(anyhow!("stream failed: {}", message)),
        Outcome::Interrupted { drained: false } => {
            log::warn!("stopped without a clean EOS");
            Ok(())
        }
        _ => Ok(()),
    }
}
