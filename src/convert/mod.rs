// SPDX-License-Identifier: GPL-3.0-only

//! Packed to planar conversion engine
//!
//! The engine owns one compute device with a single input and a single
//! output buffer. Each [`ConversionEngine::convert`] call uploads a packed
//! YUYV frame, dispatches the conversion, and lends the planar result to the
//! encoder for the duration of the call. Calls are strictly sequential.

pub mod backend;
pub mod geometry;
pub mod picture;
pub mod software;

pub use backend::{BackendKind, ConversionBackend};
pub use geometry::{Geometry, PlaneLayout};
pub use picture::{ColorSpace, OutputPlanarView, Picture, PictureFormat};

use crate::errors::{ConvertError, ConvertResult};
use crate::media::encoders::Encoder;
use tracing::{debug, info, trace};

/// Device executing the conversion
///
/// Implementations own exactly one input and one output buffer sized for the
/// geometry they were opened with.
pub trait ComputeDevice {
    /// Size of the packed input buffer in bytes
    fn input_capacity(&self) -> usize;

    /// Size of the planar output buffer in bytes
    fn output_capacity(&self) -> usize;

    /// Replace the input buffer contents with `packed`
    fn upload(&mut self, packed: &[u8]) -> ConvertResult<()>;

    /// Run the conversion over the given workgroup grid and wait until its
    /// writes are visible to a subsequent [`ComputeDevice::read_output`]
    fn dispatch(&mut self, grid: [u32; 3]) -> ConvertResult<()>;

    /// Map the output buffer, pass it to `consume`, then unmap it
    fn read_output<R>(&mut self, consume: impl FnOnce(&[u8]) -> R) -> ConvertResult<R>;
}

/// Result of one successful conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Presentation index handed to the encoder
    pub index: u64,
    /// Compressed bytes the encoder produced, zero while it is still buffering
    pub bytes_written: usize,
}

/// Converts packed frames and feeds them to an encoder, one at a time
pub struct ConversionEngine<D, E> {
    geometry: Geometry,
    format: PictureFormat,
    device: D,
    encoder: E,
    next_index: u64,
}

impl<D: ComputeDevice, E: Encoder> ConversionEngine<D, E> {
    /// Validate the geometry, then open the device through `open_device`.
    ///
    /// `open_device` is only called for a valid geometry, so an invalid one
    /// never allocates device resources.
    pub fn build(
        width: u32,
        height: u32,
        open_device: impl FnOnce(Geometry) -> ConvertResult<D>,
        encoder: E,
    ) -> ConvertResult<Self> {
        let geometry = Geometry::new(width, height)?;
        let device = open_device(geometry)?;

        if device.input_capacity() < geometry.input_len()
            || device.output_capacity() < geometry.output_len()
        {
            return Err(ConvertError::UnsupportedDevice(format!(
                "device buffers ({} in, {} out) too small for {}x{}",
                device.input_capacity(),
                device.output_capacity(),
                width,
                height
            )));
        }

        info!(
            width,
            height,
            input_bytes = geometry.input_len(),
            output_bytes = geometry.output_len(),
            "Conversion engine ready"
        );

        Ok(Self {
            geometry,
            format: PictureFormat::for_geometry(&geometry),
            device,
            encoder,
            next_index: 0,
        })
    }

    /// Convert one packed frame and hand the planar picture to the encoder.
    ///
    /// # Panics
    ///
    /// Panics if `packed` is shorter than `2 * width * height` bytes. Longer
    /// buffers are accepted and only the leading frame is read.
    pub fn convert(&mut self, packed: &[u8]) -> ConvertResult<FrameOutcome> {
        let frame_len = self.geometry.input_len();
        assert!(
            packed.len() >= frame_len,
            "packed frame holds {} bytes, expected at least {}",
            packed.len(),
            frame_len
        );

        self.device.upload(&packed[..frame_len])?;
        self.device.dispatch(self.geometry.dispatch_grid())?;

        let index = self.next_index;
        let geometry = self.geometry;
        let format = self.format;
        let encoder = &mut self.encoder;
        let mut delivered = false;

        let written = self.device.read_output(|mapped| -> ConvertResult<usize> {
            let view = OutputPlanarView::new(mapped, &geometry)?;
            let picture = format.bind(&view, index);
            delivered = true;
            Ok(encoder.encode(&picture)?)
        })?;

        // The encoder consumed this index even if it then failed
        if delivered {
            self.next_index += 1;
        }
        let bytes_written = written?;

        if bytes_written == 0 {
            debug!(index, "Encoder produced no output for frame");
        } else {
            trace!(index, bytes_written, "Frame converted");
        }

        Ok(FrameOutcome {
            index,
            bytes_written,
        })
    }

    /// Drain the encoder, returning the bytes it flushed
    pub fn finish(&mut self) -> ConvertResult<usize> {
        let flushed = self.encoder.finish()?;
        debug!(frames = self.next_index, flushed, "Encoder drained");
        Ok(flushed)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Index the next converted picture will carry
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn into_parts(self) -> (D, E) {
        (self.device, self.encoder)
    }
}
