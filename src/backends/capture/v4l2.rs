// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 YUYV capture over memory-mapped buffers

use super::{CapturedFrame, FrameSource};
use crate::errors::CaptureError;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::format::FieldOrder;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;

/// Capture device settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4l2CaptureConfig {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub num_buffers: u32,
}

/// Streaming YUYV capture from a V4L2 device
pub struct V4l2Capture {
    stream: MmapStream<'static>,
    _device: Device,
    path: String,
    frame_len: usize,
}

impl V4l2Capture {
    /// Open the device, negotiate YUYV at the requested size and rate, and
    /// start streaming
    pub fn open(config: &V4l2CaptureConfig) -> Result<Self, CaptureError> {
        info!(
            path = %config.path,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Opening V4L2 device for YUYV capture"
        );

        let device = Device::with_path(&config.path)
            .map_err(|e| CaptureError::DeviceOpen(format!("{}: {}", config.path, e)))?;

        let caps = device
            .query_caps()
            .map_err(|e| CaptureError::DeviceOpen(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::Unsupported(format!(
                "{} ({}) is not a video capture device",
                config.path, caps.card
            )));
        }
        if !caps.capabilities.contains(Flags::STREAMING) {
            return Err(CaptureError::Unsupported(format!(
                "{} ({}) does not support streaming I/O",
                config.path, caps.card
            )));
        }
        debug!(driver = %caps.driver, card = %caps.card, "V4L2 capabilities");

        let yuyv = v4l::FourCC::new(b"YUYV");
        let mut format = device
            .format()
            .map_err(|e| CaptureError::Format(format!("Failed to get format: {}", e)))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = yuyv;
        format.field_order = FieldOrder::Progressive;

        let actual = device
            .set_format(&format)
            .map_err(|e| CaptureError::Format(format!("Failed to set format: {}", e)))?;
        if actual.fourcc != yuyv || actual.width != config.width || actual.height != config.height {
            return Err(CaptureError::Format(format!(
                "requested YUYV {}x{}, driver chose {} {}x{}",
                config.width, config.height, actual.fourcc, actual.width, actual.height
            )));
        }
        if actual.stride != config.width * 2 {
            return Err(CaptureError::Format(format!(
                "rows are padded to {} bytes, expected {}",
                actual.stride,
                config.width * 2
            )));
        }

        match device.set_params(&Parameters::with_fps(config.fps)) {
            Ok(params) => debug!(interval = ?params.interval, "Frame interval set"),
            Err(e) => warn!(
                error = %e,
                fps = config.fps,
                "Could not set frame rate, using driver default"
            ),
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.num_buffers)
            .map_err(|e| CaptureError::Stream(format!("Failed to create buffer stream: {}", e)))?;

        info!(buffers = config.num_buffers, "V4L2 capture stream started");

        Ok(Self {
            stream,
            _device: device,
            path: config.path.clone(),
            frame_len: config.width as usize * config.height as usize * 2,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FrameSource for V4l2Capture {
    fn next_frame(&mut self) -> Result<CapturedFrame<'_>, CaptureError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CaptureError::Stream(format!("Failed to dequeue frame: {}", e)))?;

        if buf.len() < self.frame_len {
            return Err(CaptureError::Stream(format!(
                "frame {} holds {} bytes, expected {}",
                meta.sequence,
                buf.len(),
                self.frame_len
            )));
        }

        Ok(CapturedFrame {
            data: buf,
            sequence: meta.sequence,
        })
    }
}
