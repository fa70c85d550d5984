// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ V4L2 / file  │ ──▶ │ Conversion engine │ ──▶ │ H.264 stream │
//! │   (YUYV)     │     │  - YUYV→I420 (GPU)│     │  (Annex B)   │
//! │              │     │  - GStreamer enc  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```

pub mod capture;

pub use capture::{FrameRateMeter, RunOptions, RunSummary, run};
