// SPDX-License-Identifier: GPL-3.0-only

use clap::{ArgAction, Parser};
use gpucap::Config;
use gpucap::constants::H264Profile;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod cli;

/// Capture H.264 from a V4L2 camera, converting YUYV to I420 on the GPU
#[derive(Parser, Debug)]
#[command(name = "gpucap")]
#[command(version = env!("GIT_VERSION"))]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Bitrate in kbps [default: 1000]
    #[arg(short = 'b', long = "bitrate", value_name = "KBPS")]
    bitrate: Option<u32>,

    /// Frame rate [default: 30]
    #[arg(short = 'f', long)]
    fps: Option<u32>,

    /// Frame height, a multiple of 2 [default: 720]
    #[arg(short = 'h', long)]
    height: Option<u32>,

    /// Frame width, a multiple of 16 [default: 1280]
    #[arg(short = 'w', long)]
    width: Option<u32>,

    /// Input device [default: /dev/video0]
    #[arg(short = 'i', long = "input", value_name = "DEVICE")]
    input: Option<String>,

    /// Number of capture buffers [default: 4]
    #[arg(short = 'n', long = "num-buffers", value_name = "N")]
    num_buffers: Option<u32>,

    /// Output file [default: stdout]
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// H.264 profile: baseline, main or high [default: baseline]
    #[arg(short = 'p', long)]
    profile: Option<H264Profile>,

    /// Seconds to capture, 0 runs until interrupted [default: 10]
    #[arg(short = 't', long = "timeout", value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Leave autofocus enabled
    #[arg(long)]
    autofocus: bool,

    /// GPU render node [default: /dev/dri/card0]
    #[arg(long = "render-node", value_name = "DEVICE")]
    render_node: Option<String>,

    /// Force a GStreamer H.264 encoder element (e.g. x264enc)
    #[arg(long, value_name = "ELEMENT")]
    encoder: Option<String>,

    /// Convert on the CPU instead of the GPU
    #[arg(long)]
    software: bool,

    /// Always copy GPU output into a readback buffer
    #[arg(long = "no-zero-copy")]
    no_zero_copy: bool,

    /// Read raw YUYV frames from a file instead of the camera
    #[arg(long = "from-file", value_name = "FILE")]
    from_file: Option<PathBuf>,

    /// List GPU adapters and H.264 encoders, then exit
    #[arg(long)]
    probe: bool,

    /// Configuration file [default: ~/.config/gpucap/config.json]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print frames/sec information
    #[arg(long)]
    verbose: bool,

    /// Print this message
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    // Initialize logging on stderr, stdout may carry the H.264 stream
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=gpucap=trace, RUST_LOG=info
    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    let result = Config::load_or_default(args.config.as_deref()).and_then(|mut config| {
        cli::apply_overrides(&args, &mut config);
        if args.probe {
            cli::probe(&config)
        } else {
            cli::record(&config, args.from_file.as_deref())
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            eprintln!("gpucap: {}", e);
            ExitCode::FAILURE
        }
    }
}
