// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DRM node the compute context is created on
pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/card0";

/// V4L2 capture device
pub const DEFAULT_CAPTURE_DEVICE: &str = "/dev/video0";

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_BITRATE_KBPS: u32 = 1000;

/// Highest accepted bitrate; encoders taking bits per second get this times 1000
pub const MAX_BITRATE_KBPS: u32 = 1_000_000;

/// Number of mmap buffers requested from the capture driver
pub const DEFAULT_NUM_BUFFERS: u32 = 4;

/// Seconds to capture before stopping (0 runs until interrupted)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Sensor driver parameter that switches off continuous autofocus (OV5645 MIPI module)
pub const AUTOFOCUS_SYSFS_PATH: &str = "/sys/module/ov5645_camera_mipi_v2/parameters/ov5645_af";

/// Width of the pixel block converted by one compute workgroup
pub const BLOCK_WIDTH: u32 = 16;

/// Height of the pixel block converted by one compute workgroup
pub const BLOCK_HEIGHT: u32 = 2;

/// VBV buffer size for rate control, in milliseconds of stream at the target bitrate
pub const VBV_BUFFER_MS: u32 = 2000;

/// Fixed bind slots of the conversion program
pub mod binding {
    /// Packed YUYV input storage buffer
    pub const INPUT: u32 = 0;
    /// Planar I420 output storage buffer
    pub const OUTPUT: u32 = 1;
    /// Geometry uniform
    pub const PARAMS: u32 = 2;
}

/// H.264 profile restriction applied to the encoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum H264Profile {
    /// Constrained feature set, widest decoder support (default)
    #[default]
    Baseline,
    Main,
    High,
}

impl H264Profile {
    /// All profiles, lowest first
    pub const ALL: [H264Profile; 3] = [H264Profile::Baseline, H264Profile::Main, H264Profile::High];

    /// Profile name as used in `video/x-h264` caps
    pub fn as_str(&self) -> &'static str {
        match self {
            H264Profile::Baseline => "baseline",
            H264Profile::Main => "main",
            H264Profile::High => "high",
        }
    }
}

impl fmt::Display for H264Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for H264Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "constrained-baseline" => Ok(H264Profile::Baseline),
            "main" => Ok(H264Profile::Main),
            "high" => Ok(H264Profile::High),
            other => Err(format!(
                "unknown H.264 profile '{}' (expected baseline, main or high)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parse_is_case_insensitive() {
        assert_eq!("Baseline".parse::<H264Profile>(), Ok(H264Profile::Baseline));
        assert_eq!(" HIGH ".parse::<H264Profile>(), Ok(H264Profile::High));
        assert!("extended".parse::<H264Profile>().is_err());
    }

    #[test]
    fn test_binding_slots_are_distinct() {
        assert_ne!(binding::INPUT, binding::OUTPUT);
        assert_ne!(binding::OUTPUT, binding::PARAMS);
        assert_ne!(binding::INPUT, binding::PARAMS);
    }
}
