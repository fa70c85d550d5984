// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles shared by the integration tests
#![allow(dead_code)]

use gpucap::convert::software::SoftwareDevice;
use gpucap::convert::{ColorSpace, ComputeDevice, Geometry, Picture};
use gpucap::errors::{ConvertError, ConvertResult, EncodeError, MappedBuffer};
use gpucap::media::Encoder;

/// Which step of the next conversion should fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_upload: bool,
    pub fail_dispatch: bool,
    pub fail_output_map: bool,
}

/// Software device with injectable faults
pub struct FaultyDevice {
    inner: SoftwareDevice,
    pub faults: FaultPlan,
    pub dispatches: Vec<[u32; 3]>,
}

impl FaultyDevice {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            inner: SoftwareDevice::new(geometry),
            faults: FaultPlan::default(),
            dispatches: Vec::new(),
        }
    }
}

impl ComputeDevice for FaultyDevice {
    fn input_capacity(&self) -> usize {
        self.inner.input_capacity()
    }

    fn output_capacity(&self) -> usize {
        self.inner.output_capacity()
    }

    fn upload(&mut self, packed: &[u8]) -> ConvertResult<()> {
        if self.faults.fail_upload {
            return Err(ConvertError::MappingFailed {
                buffer: MappedBuffer::Input,
                reason: "injected".into(),
            });
        }
        self.inner.upload(packed)
    }

    fn dispatch(&mut self, grid: [u32; 3]) -> ConvertResult<()> {
        if self.faults.fail_dispatch {
            return Err(ConvertError::DispatchFailed("injected".into()));
        }
        self.dispatches.push(grid);
        self.inner.dispatch(grid)
    }

    fn read_output<R>(&mut self, consume: impl FnOnce(&[u8]) -> R) -> ConvertResult<R> {
        if self.faults.fail_output_map {
            return Err(ConvertError::MappingFailed {
                buffer: MappedBuffer::Output,
                reason: "injected".into(),
            });
        }
        self.inner.read_output(consume)
    }
}

/// What the encoder saw for one picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPicture {
    pub index: u64,
    pub strides: [u32; 3],
    pub color_space: ColorSpace,
    /// Plane start offsets relative to plane 0
    pub offsets: [usize; 3],
    pub planes: [Vec<u8>; 3],
}

/// Encoder that copies every picture it receives
#[derive(Default)]
pub struct RecordingEncoder {
    pub pictures: Vec<RecordedPicture>,
    /// Bytes to report per call
    pub output_bytes: usize,
    pub fail: bool,
    pub finished: bool,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indices(&self) -> Vec<u64> {
        self.pictures.iter().map(|p| p.index).collect()
    }
}

impl Encoder for RecordingEncoder {
    fn encode(&mut self, picture: &Picture<'_>) -> Result<usize, EncodeError> {
        let base = picture.planes[0].as_ptr() as usize;
        let offsets = picture.planes.map(|p| p.as_ptr() as usize - base);
        self.pictures.push(RecordedPicture {
            index: picture.index,
            strides: picture.strides,
            color_space: picture.color_space,
            offsets,
            planes: picture.planes.map(|p| p.to_vec()),
        });
        if self.fail {
            return Err(EncodeError::Push("injected".into()));
        }
        Ok(self.output_bytes)
    }

    fn finish(&mut self) -> Result<usize, EncodeError> {
        self.finished = true;
        Ok(0)
    }
}

/// Packed frame with a distinct, deterministic value at every byte
pub fn pattern_frame(geometry: &Geometry, seed: u8) -> Vec<u8> {
    (0..geometry.input_len())
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
