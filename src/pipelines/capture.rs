// SPDX-License-Identifier: MPL-2.0

//! Capture loop: frame source -> conversion engine -> encoder
//!
//! Runs on the calling thread. Each frame is captured, converted and encoded
//! before the next one is dequeued, so frames reach the encoder in capture
//! order and the source's buffer is only lent for one iteration.

use crate::backends::FrameSource;
use crate::convert::{ComputeDevice, ConversionEngine};
use crate::errors::{AppResult, CaptureError};
use crate::media::Encoder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Loop controls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many frames
    pub max_frames: Option<u64>,
    /// Log the instantaneous frame rate of every frame
    pub verbose: bool,
}

/// What a finished run produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Frame rate from the interval between consecutive frames
#[derive(Debug, Default)]
pub struct FrameRateMeter {
    last: Option<Instant>,
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame at `now`; returns the rate since the previous frame
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        let previous = self.last.replace(now)?;
        let delta = now.saturating_duration_since(previous).as_secs_f64();
        (delta > 0.0).then(|| 1.0 / delta)
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }
}

/// Drive frames from `source` through `engine` until the source ends, the
/// frame budget is spent, or `stop` is raised.
///
/// Any capture, conversion or encoder error ends the run. The encoder is
/// drained only after a clean stop.
pub fn run<S, D, E>(
    source: &mut S,
    engine: &mut ConversionEngine<D, E>,
    options: RunOptions,
    stop: &AtomicBool,
) -> AppResult<RunSummary>
where
    S: FrameSource + ?Sized,
    D: ComputeDevice,
    E: Encoder,
{
    let start = Instant::now();
    let mut meter = FrameRateMeter::new();
    let mut frames = 0u64;
    let mut bytes = 0u64;

    info!(max_frames = ?options.max_frames, "Capture loop started");

    while !stop.load(Ordering::SeqCst) {
        if options.max_frames.is_some_and(|max| frames >= max) {
            debug!(frames, "Frame budget reached");
            break;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(CaptureError::EndOfStream) => {
                info!(frames, "Source exhausted");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = engine.convert(frame.data)?;
        frames += 1;
        bytes += outcome.bytes_written as u64;

        if options.verbose {
            if let Some(fps) = meter.tick() {
                info!(
                    frame = outcome.index,
                    sequence = frame.sequence,
                    fps = format_args!("{:.1}", fps),
                    "Frame encoded"
                );
            }
        }
    }

    if stop.load(Ordering::SeqCst) {
        info!(frames, "Stop requested");
    }

    bytes += engine.finish()? as u64;

    let summary = RunSummary {
        frames,
        bytes,
        elapsed: start.elapsed(),
    };
    info!(
        frames = summary.frames,
        bytes = summary.bytes,
        average_fps = format_args!("{:.1}", summary.average_fps()),
        "Capture loop finished"
    );
    Ok(summary)
}
