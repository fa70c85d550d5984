// SPDX-License-Identifier: GPL-3.0-only

//! Sources of packed YUYV frames
//!
//! A [`FrameSource`] lends one frame at a time. The slice stays valid until
//! the next call, which lets the V4L2 source hand out its mmap buffers
//! without copying.

pub mod v4l2;

pub use v4l2::{V4l2Capture, V4l2CaptureConfig};

use crate::errors::CaptureError;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// One packed frame borrowed from its source
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    pub data: &'a [u8],
    /// Driver or file sequence number
    pub sequence: u32,
}

/// Producer of packed frames
pub trait FrameSource {
    /// Block until the next frame is available.
    ///
    /// Returns [`CaptureError::EndOfStream`] once the source is exhausted.
    fn next_frame(&mut self) -> Result<CapturedFrame<'_>, CaptureError>;
}

/// Reads back-to-back raw YUYV frames from any reader
pub struct RawFileSource<R> {
    reader: R,
    buffer: Vec<u8>,
    sequence: u32,
}

impl<R: Read> RawFileSource<R> {
    pub fn new(reader: R, frame_len: usize) -> Self {
        Self {
            reader,
            buffer: vec![0; frame_len],
            sequence: 0,
        }
    }
}

impl RawFileSource<std::io::BufReader<std::fs::File>> {
    pub fn open(path: &Path, frame_len: usize) -> Result<Self, CaptureError> {
        let file = std::fs::File::open(path).map_err(|e| {
            CaptureError::DeviceOpen(format!("{}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), frame_len, "Reading raw YUYV frames from file");
        Ok(Self::new(std::io::BufReader::new(file), frame_len))
    }
}

impl<R: Read> FrameSource for RawFileSource<R> {
    fn next_frame(&mut self) -> Result<CapturedFrame<'_>, CaptureError> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Err(CaptureError::EndOfStream);
        }
        if filled < self.buffer.len() {
            warn!(
                read = filled,
                expected = self.buffer.len(),
                "Dropping truncated trailing frame"
            );
            return Err(CaptureError::EndOfStream);
        }

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(CapturedFrame {
            data: &self.buffer,
            sequence,
        })
    }
}

/// Switch off the sensor's continuous autofocus through its driver parameter
pub fn disable_autofocus(path: &Path) -> Result<(), CaptureError> {
    std::fs::write(path, "1").map_err(|e| {
        CaptureError::Io(format!("failed to disable autofocus via {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "Autofocus disabled");
    Ok(())
}
