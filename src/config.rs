// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{
    AUTOFOCUS_SYSFS_PATH, DEFAULT_BITRATE_KBPS, DEFAULT_CAPTURE_DEVICE, DEFAULT_FPS,
    DEFAULT_HEIGHT, DEFAULT_NUM_BUFFERS, DEFAULT_RENDER_NODE, DEFAULT_TIMEOUT_SECS, DEFAULT_WIDTH,
    H264Profile, MAX_BITRATE_KBPS,
};
use crate::convert::BackendKind;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Capture, conversion and encoding settings.
///
/// Loaded from `~/.config/gpucap/config.json` when present; command line
/// flags override individual fields. Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame width in pixels (multiple of 16)
    pub width: u32,
    /// Frame height in pixels (multiple of 2)
    pub height: u32,
    /// Capture and encode frame rate
    pub fps: u32,
    /// Target encoder bitrate
    pub bitrate_kbps: u32,
    /// H.264 profile of the output stream
    pub profile: H264Profile,
    /// V4L2 capture device
    pub capture_device: String,
    /// DRM node the GPU context is created on
    pub render_node: String,
    /// mmap buffers requested from the capture driver
    pub num_buffers: u32,
    /// Output file; stdout when unset
    pub output: Option<PathBuf>,
    /// Seconds to record, 0 to run until interrupted
    pub timeout_secs: u64,
    /// Leave sensor autofocus enabled
    pub autofocus: bool,
    /// Sensor driver parameter written to disable autofocus
    pub autofocus_path: PathBuf,
    /// Log per-frame timing
    pub verbose: bool,
    /// Conversion device
    pub backend: BackendKind,
    /// Force a GStreamer encoder element
    pub encoder: Option<String>,
    /// Map the GPU output buffer directly when the adapter supports it
    pub zero_copy: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            profile: H264Profile::default(),
            capture_device: DEFAULT_CAPTURE_DEVICE.to_string(),
            render_node: DEFAULT_RENDER_NODE.to_string(),
            num_buffers: DEFAULT_NUM_BUFFERS,
            output: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            autofocus: false,
            autofocus_path: PathBuf::from(AUTOFOCUS_SYSFS_PATH),
            verbose: false,
            backend: BackendKind::default(),
            encoder: None,
            zero_copy: true,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gpucap").join("config.json"))
    }

    /// Load a config file
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path`, or the default file if it exists, or fall back to defaults.
    ///
    /// An explicitly given path must exist; a missing default file is not an error.
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject rates the capture loop and encoders cannot work with
    pub fn validate(&self) -> AppResult<()> {
        if self.fps == 0 {
            return Err(AppError::Config("frame rate must be at least 1 fps".to_string()));
        }
        if !(1..=MAX_BITRATE_KBPS).contains(&self.bitrate_kbps) {
            return Err(AppError::Config(format!(
                "bitrate {} kbps is outside 1..={} kbps",
                self.bitrate_kbps, MAX_BITRATE_KBPS
            )));
        }
        Ok(())
    }

    /// Number of frames to record, or `None` to run until interrupted
    pub fn frame_budget(&self) -> Option<u64> {
        (self.timeout_secs > 0).then(|| self.timeout_secs * self.fps as u64)
    }
}
