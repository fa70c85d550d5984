// SPDX-License-Identifier: MPL-2.0

//! H.264 encoder selection with hardware acceleration priority
//!
//! Hardware encoders are preferred in this order: V4L2 stateful (SoC
//! encoders such as the one next to the capture sensor), VA-API, NVENC,
//! Quick Sync and AMF. x264 and OpenH264 are the software fallbacks.

use crate::constants::VBV_BUFFER_MS;
use crate::errors::EncodeError;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// Known H.264 encoder elements: (element, display name, hardware, priority)
const H264_ENCODERS: [(&str, &str, bool, u32); 8] = [
    ("v4l2h264enc", "V4L2 H.264 (HW)", true, 10),
    ("vah264enc", "VA-API H.264 (HW)", true, 20),
    ("vaapih264enc", "VA-API H.264 (HW)", true, 21),
    ("nvh264enc", "NVIDIA H.264 (HW)", true, 30),
    ("qsvh264enc", "Intel QSV H.264 (HW)", true, 40),
    ("amfh264enc", "AMD AMF H.264 (HW)", true, 50),
    ("x264enc", "x264 H.264 (SW)", false, 100),
    ("openh264enc", "OpenH264 H.264 (SW)", false, 110),
];

/// Information about an available encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    /// GStreamer element name
    pub element_name: String,
    /// Human-readable name for logs and `--probe`
    pub display_name: String,
    /// Whether this is hardware accelerated
    pub is_hardware: bool,
    /// Priority (lower = higher priority)
    pub priority: u32,
}

/// Rate control applied to whichever encoder is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControl {
    pub bitrate_kbps: u32,
    /// Also the keyframe interval, one IDR per second
    pub fps: u32,
}

impl RateControl {
    /// VBV buffer size in kbit
    pub fn vbv_kbits(&self) -> u32 {
        self.bitrate_kbps * VBV_BUFFER_MS / 1000
    }
}

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::ElementFactory::find(element_name).is_some()
}

/// Enumerate all available H.264 encoders, sorted by priority
pub fn enumerate_h264_encoders() -> Vec<EncoderInfo> {
    let _ = gst::init();

    let mut available: Vec<EncoderInfo> = H264_ENCODERS
        .iter()
        .filter(|(name, ..)| is_element_available(name))
        .map(|(name, display, hw, priority)| {
            debug!(encoder = name, "H.264 encoder available");
            EncoderInfo {
                element_name: name.to_string(),
                display_name: display.to_string(),
                is_hardware: *hw,
                priority: *priority,
            }
        })
        .collect();

    available.sort_by_key(|e| e.priority);
    info!(count = available.len(), "Detected H.264 encoders");
    available
}

/// Pick the encoder to use.
///
/// A `preferred` element is used when installed; an unknown element name is
/// accepted too, as long as GStreamer can create it. Otherwise the highest
/// priority available encoder wins.
pub fn select_h264_encoder(preferred: Option<&str>) -> Result<EncoderInfo, EncodeError> {
    gst::init()
        .map_err(|e| EncodeError::Pipeline(format!("Failed to initialize GStreamer: {}", e)))?;

    if let Some(name) = preferred {
        if is_element_available(name) {
            let known = H264_ENCODERS.iter().find(|(n, ..)| *n == name);
            info!(encoder = name, "Using requested H.264 encoder");
            return Ok(EncoderInfo {
                element_name: name.to_string(),
                display_name: known.map_or_else(|| name.to_string(), |k| k.1.to_string()),
                is_hardware: known.is_some_and(|k| k.2),
                priority: 0,
            });
        }
        return Err(EncodeError::NoEncoderAvailable(format!(
            "requested encoder '{}' is not installed",
            name
        )));
    }

    let selected = enumerate_h264_encoders().into_iter().next().ok_or_else(|| {
        EncodeError::NoEncoderAvailable(
            "install x264enc (gst-plugins-ugly), openh264enc (gst-plugins-bad) \
             or a hardware encoder plugin"
                .to_string(),
        )
    })?;

    info!(
        encoder = %selected.element_name,
        hardware = selected.is_hardware,
        "Selected H.264 encoder"
    );
    Ok(selected)
}

/// Set a property from its string form when the element has it
fn set_if_present(encoder: &gst::Element, property: &str, value: &str) {
    if encoder.find_property(property).is_some() {
        encoder.set_property_from_str(property, value);
    } else {
        debug!(property, "Encoder has no such property, skipping");
    }
}

/// Configure encoder for low-latency constant bitrate streaming
pub fn configure_video_encoder(encoder: &gst::Element, encoder_name: &str, rate: RateControl) {
    let bitrate = rate.bitrate_kbps.to_string();
    let gop = rate.fps.to_string();

    match encoder_name {
        // x264 software encoder
        "x264enc" => {
            set_if_present(encoder, "speed-preset", "ultrafast");
            set_if_present(encoder, "tune", "zerolatency");
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "vbv-buf-capacity", &VBV_BUFFER_MS.to_string());
            set_if_present(encoder, "key-int-max", &gop);
            set_if_present(encoder, "threads", "0");
            set_if_present(encoder, "byte-stream", "true");
            debug!(
                bitrate_kbps = rate.bitrate_kbps,
                vbv_kbits = rate.vbv_kbits(),
                keyint = rate.fps,
                "Configured x264enc"
            );
        }

        // V4L2 stateful encoders take bitrate in bps through extra controls
        "v4l2h264enc" => {
            let controls = format!(
                "controls,video_bitrate={},video_bitrate_mode=1,h264_i_frame_period={}",
                rate.bitrate_kbps * 1000,
                rate.fps
            );
            set_if_present(encoder, "extra-controls", &controls);
            debug!(controls = %controls, "Configured V4L2 encoder");
        }

        // VA-API encoders (old plugin)
        "vaapih264enc" => {
            set_if_present(encoder, "rate-control", "cbr");
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "keyframe-period", &gop);
            debug!(bitrate_kbps = rate.bitrate_kbps, "Configured VA-API encoder");
        }

        // VA-API encoders (new plugin)
        "vah264enc" => {
            set_if_present(encoder, "rate-control", "cbr");
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "key-int-max", &gop);
            debug!(bitrate_kbps = rate.bitrate_kbps, "Configured VA-API encoder");
        }

        // NVIDIA encoders
        "nvh264enc" => {
            set_if_present(encoder, "rc-mode", "cbr");
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "gop-size", &gop);
            set_if_present(encoder, "zerolatency", "true");
            debug!(bitrate_kbps = rate.bitrate_kbps, "Configured NVIDIA encoder");
        }

        // Intel QSV encoders
        "qsvh264enc" => {
            set_if_present(encoder, "rate-control", "cbr");
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "gop-size", &gop);
            debug!(bitrate_kbps = rate.bitrate_kbps, "Configured Intel QSV encoder");
        }

        // AMD AMF encoders
        "amfh264enc" => {
            set_if_present(encoder, "rate-control", "cbr");
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "gop-size", &gop);
            debug!(bitrate_kbps = rate.bitrate_kbps, "Configured AMD AMF encoder");
        }

        // OpenH264 (software H.264 encoder)
        "openh264enc" => {
            set_if_present(encoder, "rate-control", "bitrate");
            set_if_present(encoder, "bitrate", &(rate.bitrate_kbps * 1000).to_string());
            set_if_present(encoder, "gop-size", &gop);
            set_if_present(encoder, "usage-type", "camera");
            debug!(bitrate_bps = rate.bitrate_kbps * 1000, "Configured openh264enc");
        }

        _ => {
            warn!(encoder = encoder_name, "Unknown encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_before_software() {
        let first_software = H264_ENCODERS.iter().position(|e| !e.2).unwrap();
        assert!(H264_ENCODERS[..first_software].iter().all(|e| e.2));
        assert!(H264_ENCODERS[first_software..].iter().all(|e| !e.2));
        assert!(H264_ENCODERS.windows(2).all(|w| w[0].3 < w[1].3));
    }

    #[test]
    fn test_vbv_follows_bitrate() {
        let rate = RateControl {
            bitrate_kbps: 1000,
            fps: 30,
        };
        assert_eq!(rate.vbv_kbits(), 2000);
    }

    #[test]
    fn test_enumeration_is_sorted() {
        // Depends on installed plugins; an empty list is valid
        let encoders = enumerate_h264_encoders();
        assert!(encoders.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn test_missing_preferred_encoder_is_an_error() {
        if gst::init().is_err() {
            println!("Skipping test (GStreamer unavailable)");
            return;
        }
        assert!(matches!(
            select_h264_encoder(Some("nosuchh264enc")),
            Err(EncodeError::NoEncoderAvailable(_))
        ));
    }
}
