// SPDX-License-Identifier: MPL-2.0

//! gpucap - camera capture with GPU pixel format conversion and H.264 encoding
//!
//! Frames are captured as packed YUYV, converted to planar I420 by a compute
//! shader and handed to a GStreamer H.264 encoder, one frame at a time.
//!
//! # Architecture
//!
//! - [`backends`]: V4L2 and raw file frame sources
//! - [`convert`]: Conversion engine, frame geometry and the planar view lent to encoders
//! - [`gpu`]: Headless GPU context and its ordered resource lifecycle
//! - [`shaders`]: WGSL compute shader and its uniform layout
//! - [`media`]: H.264 encoder selection and the GStreamer encoder
//! - [`pipelines`]: The capture loop tying source, engine and encoder together
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! use gpucap::convert::{ConversionEngine, software::SoftwareDevice};
//!
//! let mut engine = ConversionEngine::build(
//!     1280,
//!     720,
//!     |geometry| Ok(SoftwareDevice::new(geometry)),
//!     encoder,
//! )?;
//! engine.convert(&yuyv_frame)?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod convert;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod shaders;

// Re-export commonly used types
pub use config::Config;
pub use constants::H264Profile;
pub use convert::{ConversionEngine, Geometry, Picture};
pub use errors::{AppError, ConvertError};
