// SPDX-License-Identifier: MPL-2.0

//! GStreamer H.264 encoder fed one picture at a time
//!
//! Pipeline: appsrc (I420) -> encoder -> capsfilter (profile) -> h264parse
//! -> capsfilter (Annex B, AU aligned) -> appsink. Each picture is copied
//! into a GStreamer buffer before `encode` returns, then whatever access
//! units are ready are written to the output sink.

use super::Encoder;
use super::video::{RateControl, configure_video_encoder, select_h264_encoder};
use crate::constants::H264Profile;
use crate::convert::Picture;
use crate::errors::EncodeError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSrc};
use gstreamer_video as gst_video;
use std::io::Write;
use tracing::{debug, error, info, warn};

/// How long `finish` waits for each delayed access unit
const DRAIN_TIMEOUT_SECS: u64 = 5;

/// Raw frames preallocated in the input pool; it grows past this on demand
const POOL_MIN_BUFFERS: u32 = 2;

/// Settings for [`GstH264Encoder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H264EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    pub profile: H264Profile,
    /// Force a specific encoder element instead of auto-selection
    pub element: Option<String>,
}

impl H264EncoderConfig {
    /// Caps restricting the encoder output to the requested profile
    fn profile_caps(&self) -> Result<gst::Caps, EncodeError> {
        let profiles = match self.profile {
            // Encoders advertise either name for the baseline subset
            H264Profile::Baseline => "{ constrained-baseline, baseline }",
            H264Profile::Main => "main",
            H264Profile::High => "high",
        };
        format!("video/x-h264, profile=(string){}", profiles)
            .parse::<gst::Caps>()
            .map_err(|e| EncodeError::Pipeline(format!("Invalid profile caps: {}", e)))
    }
}

/// H.264 encoder writing an Annex B byte stream to `sink`
pub struct GstH264Encoder {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    appsink: AppSink,
    /// Reused raw frame buffers handed to appsrc
    pool: gst::BufferPool,
    sink: Box<dyn Write + Send>,
    element_name: String,
    fps: u64,
    frame_len: usize,
    width: u32,
    height: u32,
    bytes_written: u64,
    finished: bool,
}

/// Pool of frame-sized buffers so pushing a picture allocates nothing
fn raw_frame_pool(caps: &gst::Caps, frame_len: usize) -> Result<gst::BufferPool, EncodeError> {
    let pool = gst::BufferPool::new();
    let mut config = pool.config();
    config.set_params(Some(caps), frame_len as u32, POOL_MIN_BUFFERS, 0);
    pool
        .set_config(config)
        .map_err(|e| EncodeError::Pipeline(format!("Failed to configure buffer pool: {}", e)))?;
    pool
        .set_active(true)
        .map_err(|e| EncodeError::Pipeline(format!("Failed to activate buffer pool: {}", e)))?;
    Ok(pool)
}

fn make(factory: &str, name: &str) -> Result<gst::Element, EncodeError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| EncodeError::Pipeline(format!("Failed to create {}: {}", factory, e)))
}

impl GstH264Encoder {
    pub fn new(
        config: &H264EncoderConfig,
        sink: Box<dyn Write + Send>,
    ) -> Result<Self, EncodeError> {
        gst::init().map_err(|e| EncodeError::Pipeline(format!("GStreamer init failed: {}", e)))?;

        let selected = select_h264_encoder(config.element.as_deref())?;

        let video_info = gst_video::VideoInfo::builder(
            gst_video::VideoFormat::I420,
            config.width,
            config.height,
        )
        .fps(gst::Fraction::new(config.fps as i32, 1))
        .build()
        .map_err(|e| EncodeError::Pipeline(format!("Invalid video info: {}", e)))?;
        let raw_caps = video_info
            .to_caps()
            .map_err(|e| EncodeError::Pipeline(format!("Invalid raw caps: {}", e)))?;
        let frame_len = video_info.size();

        let pool = raw_frame_pool(&raw_caps, frame_len)?;

        let pipeline = gst::Pipeline::new();

        let appsrc = make("appsrc", "gpucap_src")?
            .downcast::<AppSrc>()
            .map_err(|_| EncodeError::Pipeline("Failed to downcast to AppSrc".into()))?;
        appsrc.set_caps(Some(&raw_caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_max_bytes(2 * frame_len as u64);
        appsrc.set_property("block", true);

        let encoder = make(&selected.element_name, "gpucap_encoder")?;
        configure_video_encoder(
            &encoder,
            &selected.element_name,
            RateControl {
                bitrate_kbps: config.bitrate_kbps,
                fps: config.fps,
            },
        );

        let profile_filter = make("capsfilter", "gpucap_profile")?;
        profile_filter.set_property("caps", config.profile_caps()?);

        let parser = make("h264parse", "gpucap_parse")?;
        // Repeat SPS/PPS before every IDR so the stream can be joined mid-way
        parser.set_property("config-interval", -1i32);

        let stream_caps = gst::Caps::builder("video/x-h264")
            .field("stream-format", "byte-stream")
            .field("alignment", "au")
            .build();
        let stream_filter = make("capsfilter", "gpucap_stream")?;
        stream_filter.set_property("caps", &stream_caps);

        let appsink = make("appsink", "gpucap_sink")?
            .downcast::<AppSink>()
            .map_err(|_| EncodeError::Pipeline("Failed to downcast to AppSink".into()))?;
        appsink.set_property("sync", false);

        let elements = [
            appsrc.upcast_ref::<gst::Element>(),
            &encoder,
            &profile_filter,
            &parser,
            &stream_filter,
            appsink.upcast_ref(),
        ];
        pipeline
            .add_many(elements)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(elements)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link elements: {}", e)))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to start encoder: {}", e)))?;

        info!(
            encoder = %selected.element_name,
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate_kbps = config.bitrate_kbps,
            profile = %config.profile,
            "H.264 encoder pipeline started"
        );

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            pool,
            sink,
            element_name: selected.element_name,
            fps: config.fps.max(1) as u64,
            frame_len,
            width: config.width,
            height: config.height,
            bytes_written: 0,
            finished: false,
        })
    }

    /// GStreamer element doing the encoding
    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    /// Total compressed bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn timestamp(&self, index: u64) -> gst::ClockTime {
        gst::ClockTime::from_nseconds(index * 1_000_000_000 / self.fps)
    }

    /// Surface the first error posted on the bus, if any
    fn check_bus(&self) -> Result<(), EncodeError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer error in encoder pipeline"
                );
                return Err(EncodeError::Pipeline(err.error().to_string()));
            }
        }
        Ok(())
    }

    fn write_sample(&mut self, sample: &gst::Sample) -> Result<usize, EncodeError> {
        let Some(buffer) = sample.buffer() else {
            return Ok(0);
        };
        let map = buffer
            .map_readable()
            .map_err(|e| EncodeError::Sink(format!("Failed to map access unit: {}", e)))?;
        self.sink
            .write_all(map.as_slice())
            .map_err(|e| EncodeError::Sink(e.to_string()))?;
        self.bytes_written += map.size() as u64;
        Ok(map.size())
    }

    /// Write every access unit that becomes available within `timeout`
    fn drain(&mut self, timeout: gst::ClockTime) -> Result<usize, EncodeError> {
        let mut written = 0;
        while let Some(sample) = self.appsink.try_pull_sample(timeout) {
            written += self.write_sample(&sample)?;
        }
        Ok(written)
    }
}

impl Encoder for GstH264Encoder {
    fn encode(&mut self, picture: &Picture<'_>) -> Result<usize, EncodeError> {
        if picture.width != self.width || picture.height != self.height {
            return Err(EncodeError::Push(format!(
                "picture is {}x{}, encoder expects {}x{}",
                picture.width, picture.height, self.width, self.height
            )));
        }
        if picture.len() != self.frame_len {
            return Err(EncodeError::Push(format!(
                "picture holds {} bytes, encoder expects {}",
                picture.len(),
                self.frame_len
            )));
        }

        let mut buffer = self
            .pool
            .acquire_buffer(None)
            .map_err(|e| EncodeError::Push(format!("Failed to acquire buffer: {:?}", e)))?;
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| EncodeError::Push("Failed to get mutable buffer reference".into()))?;

            let pts = self.timestamp(picture.index);
            buffer_ref.set_pts(pts);
            buffer_ref.set_duration(self.timestamp(picture.index + 1) - pts);

            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| EncodeError::Push(format!("Failed to map buffer: {}", e)))?;
            let mut offset = 0;
            for plane in picture.planes {
                map[offset..offset + plane.len()].copy_from_slice(plane);
                offset += plane.len();
            }
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| EncodeError::Push(format!("{:?}", e)))?;
        self.check_bus()?;

        let written = self.drain(gst::ClockTime::ZERO)?;
        if written > 0 {
            debug!(index = picture.index, bytes = written, "Wrote access units");
        }
        Ok(written)
    }

    fn finish(&mut self) -> Result<usize, EncodeError> {
        if self.finished {
            return Ok(0);
        }
        self.finished = true;

        self.appsrc
            .end_of_stream()
            .map_err(|e| EncodeError::Push(format!("Failed to send EOS: {:?}", e)))?;

        let written = self.drain(gst::ClockTime::from_seconds(DRAIN_TIMEOUT_SECS))?;
        if !self.appsink.is_eos() {
            warn!("Encoder did not reach end of stream before timeout");
        }
        self.check_bus()?;

        self.sink
            .flush()
            .map_err(|e| EncodeError::Sink(e.to_string()))?;
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to stop encoder: {}", e)))?;

        info!(
            encoder = %self.element_name,
            total_bytes = self.bytes_written,
            "H.264 stream finished"
        );
        Ok(written)
    }
}

impl Drop for GstH264Encoder {
    fn drop(&mut self) {
        // Ensure pipeline is properly stopped to avoid GStreamer warnings
        let _ = self.pipeline.set_state(gst::State::Null);
        let _ = self.pool.set_active(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Geometry, OutputPlanarView, PictureFormat};
    use crate::media::encoders::video::is_element_available;
    use std::sync::{Arc, Mutex};

    /// Output sink the test can read back after the encoder took ownership
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_encodes_annex_b_stream() {
        if gst::init().is_err() {
            println!("Skipping test (GStreamer unavailable)");
            return;
        }
        let Some(element) = ["x264enc", "openh264enc"]
            .into_iter()
            .find(|e| is_element_available(e))
        else {
            println!("Skipping test (no software H.264 encoder)");
            return;
        };
        if !is_element_available("h264parse") {
            println!("Skipping test (h264parse unavailable)");
            return;
        }

        let geometry = Geometry::new(320, 240).unwrap();
        let config = H264EncoderConfig {
            width: 320,
            height: 240,
            fps: 30,
            bitrate_kbps: 500,
            profile: H264Profile::Baseline,
            element: Some(element.to_string()),
        };
        let sink = SharedSink::default();
        let mut encoder = GstH264Encoder::new(&config, Box::new(sink.clone())).unwrap();
        let format = PictureFormat::for_geometry(&geometry);

        let mut total = 0;
        for index in 0..30u64 {
            let frame: Vec<u8> = (0..geometry.output_len())
                .map(|i| (i as u64 + index * 3) as u8)
                .collect();
            let view = OutputPlanarView::new(&frame, &geometry).unwrap();
            total += encoder.encode(&format.bind(&view, index)).unwrap();
        }
        total += encoder.finish().unwrap();

        let stream = sink.0.lock().unwrap();
        assert!(!stream.is_empty(), "{} produced no output", element);
        assert_eq!(&stream[..4], &[0, 0, 0, 1]);
        assert_eq!(total, stream.len());
        assert_eq!(encoder.bytes_written(), stream.len() as u64);
    }

    #[test]
    fn test_wrong_picture_size_is_rejected() {
        if gst::init().is_err() || !is_element_available("x264enc") {
            println!("Skipping test (x264enc unavailable)");
            return;
        }
        let config = H264EncoderConfig {
            width: 320,
            height: 240,
            fps: 30,
            bitrate_kbps: 500,
            profile: H264Profile::Baseline,
            element: Some("x264enc".into()),
        };
        let Ok(mut encoder) = GstH264Encoder::new(&config, Box::new(SharedSink::default())) else {
            println!("Skipping test (encoder pipeline unavailable)");
            return;
        };

        let small = Geometry::new(16, 2).unwrap();
        let frame = vec![0u8; small.output_len()];
        let view = OutputPlanarView::new(&frame, &small).unwrap();
        let picture = PictureFormat::for_geometry(&small).bind(&view, 0);
        assert!(matches!(encoder.encode(&picture), Err(EncodeError::Push(_))));
    }

    #[test]
    fn test_profile_caps_parse() {
        if gst::init().is_err() {
            println!("Skipping test (GStreamer unavailable)");
            return;
        }
        for profile in H264Profile::ALL {
            let config = H264EncoderConfig {
                width: 320,
                height: 240,
                fps: 30,
                bitrate_kbps: 500,
                profile,
                element: None,
            };
            let caps = config.profile_caps().unwrap();
            assert_eq!(caps.structure(0).unwrap().name(), "video/x-h264");
        }
    }
}
