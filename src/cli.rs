// SPDX-License-Identifier: GPL-3.0-only

//! Command-line operations
//!
//! - Recording H.264 from the camera or a raw YUYV file
//! - Probing GPU adapters and H.264 encoders

use crate::Cli;
use gpucap::backends::capture::disable_autofocus;
use gpucap::backends::{FrameSource, RawFileSource, V4l2Capture, V4l2CaptureConfig};
use gpucap::config::Config;
use gpucap::convert::{BackendKind, ConversionBackend, ConversionEngine, Geometry};
use gpucap::errors::{AppError, AppResult};
use gpucap::gpu::context::ContextOptions;
use gpucap::media::encoders::enumerate_h264_encoders;
use gpucap::media::{GstH264Encoder, H264EncoderConfig};
use gpucap::pipelines::{self, RunOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Apply command line flags on top of the loaded configuration
pub fn apply_overrides(args: &Cli, config: &mut Config) {
    if let Some(v) = args.bitrate {
        config.bitrate_kbps = v;
    }
    if let Some(v) = args.fps {
        config.fps = v;
    }
    if let Some(v) = args.height {
        config.height = v;
    }
    if let Some(v) = args.width {
        config.width = v;
    }
    if let Some(v) = &args.input {
        config.capture_device = v.clone();
    }
    if let Some(v) = args.num_buffers {
        config.num_buffers = v;
    }
    if let Some(v) = &args.output {
        config.output = Some(v.clone());
    }
    if let Some(v) = args.profile {
        config.profile = v;
    }
    if let Some(v) = args.timeout {
        config.timeout_secs = v;
    }
    if let Some(v) = &args.render_node {
        config.render_node = v.clone();
    }
    if let Some(v) = &args.encoder {
        config.encoder = Some(v.clone());
    }
    config.autofocus |= args.autofocus;
    config.verbose |= args.verbose;
    if args.software {
        config.backend = BackendKind::Software;
    }
    if args.no_zero_copy {
        config.zero_copy = false;
    }
}

/// Record until the frame budget is spent, the source ends, or Ctrl-C
pub fn record(config: &Config, from_file: Option<&Path>) -> AppResult<()> {
    config.validate()?;
    let geometry = Geometry::new(config.width, config.height)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .map_err(|e| AppError::Io(format!("Failed to install Ctrl-C handler: {}", e)))?;
    }

    let mut source: Box<dyn FrameSource> = match from_file {
        Some(path) => Box::new(RawFileSource::open(path, geometry.input_len())?),
        None => {
            let capture = V4l2Capture::open(&V4l2CaptureConfig {
                path: config.capture_device.clone(),
                width: config.width,
                height: config.height,
                fps: config.fps,
                num_buffers: config.num_buffers,
            })?;
            if !config.autofocus {
                if let Err(e) = disable_autofocus(&config.autofocus_path) {
                    warn!(error = %e, "Autofocus left enabled");
                }
            }
            Box::new(capture)
        }
    };

    let sink: Box<dyn Write + Send> = match &config.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| AppError::Io(format!("{}: {}", path.display(), e)))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let encoder = GstH264Encoder::new(
        &H264EncoderConfig {
            width: config.width,
            height: config.height,
            fps: config.fps,
            bitrate_kbps: config.bitrate_kbps,
            profile: config.profile,
            element: config.encoder.clone(),
        },
        sink,
    )?;

    let options = ContextOptions {
        allow_direct_mapping: config.zero_copy,
    };
    let mut engine = ConversionEngine::build(
        config.width,
        config.height,
        |geometry| ConversionBackend::open(config.backend, geometry, &config.render_node, options),
        encoder,
    )?;

    let summary = pipelines::run(
        source.as_mut(),
        &mut engine,
        RunOptions {
            max_frames: config.frame_budget(),
            verbose: config.verbose,
        },
        &stop,
    )?;

    info!(
        frames = summary.frames,
        bytes = summary.bytes,
        stream_bytes = engine.encoder().bytes_written(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        backend = %engine.device().kind(),
        encoder = engine.encoder().element_name(),
        "Recording complete"
    );
    Ok(())
}

/// Print GPU adapters and H.264 encoders
pub fn probe(config: &Config) -> AppResult<()> {
    gstreamer::init().map_err(|e| AppError::Config(format!("GStreamer init failed: {}", e)))?;

    println!("Render node: {}", config.render_node);
    println!();

    let adapters = gpucap::gpu::list_adapters();
    if adapters.is_empty() {
        println!("No GPU adapters found.");
    } else {
        println!("GPU adapters:");
        for adapter in &adapters {
            println!(
                "  {} ({:?}, {:?}) [{:04x}:{:04x}] compute: {} zero-copy: {}",
                adapter.name,
                adapter.backend,
                adapter.device_type,
                adapter.vendor,
                adapter.device,
                if adapter.compute { "yes" } else { "no" },
                if adapter.direct_mapping { "yes" } else { "no" },
            );
        }
    }
    println!();

    let encoders = enumerate_h264_encoders();
    if encoders.is_empty() {
        println!("No H.264 encoders found.");
    } else {
        println!("H.264 encoders (in selection order):");
        for encoder in &encoders {
            println!("  {:<14} {}", encoder.element_name, encoder.display_name);
        }
    }

    Ok(())
}
