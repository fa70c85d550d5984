// SPDX-License-Identifier: GPL-3.0-only

//! Frame capture backends

pub mod capture;

pub use capture::{CapturedFrame, FrameSource, RawFileSource, V4l2Capture, V4l2CaptureConfig};
