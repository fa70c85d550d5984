// SPDX-License-Identifier: MPL-2.0

//! Media encoding for converted frames
//!
//! # Video Encoding
//!
//! The [`encoders`] module turns converted I420 pictures into an H.264
//! Annex B byte stream, preferring hardware encoders (V4L2, VA-API, NVENC)
//! and falling back to x264 or OpenH264.

pub mod encoders;

// Re-export commonly used types
pub use encoders::{Encoder, GstH264Encoder, H264EncoderConfig};
