// SPDX-License-Identifier: GPL-3.0-only

//! Frame geometry and the byte layout derived from it

use crate::constants::{BLOCK_HEIGHT, BLOCK_WIDTH};
use crate::errors::{ConvertError, ConvertResult};
use std::ops::Range;

/// Validated frame dimensions.
///
/// A geometry is only constructible when the width is a non-zero multiple of
/// 16 and the height a non-zero multiple of 2, so every size derived from it
/// divides evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    width: u32,
    height: u32,
}

/// Offsets and lengths of the Y, U and V planes inside the planar output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offsets: [usize; 3],
    pub lens: [usize; 3],
}

impl PlaneLayout {
    /// Byte range of plane `index` (0 = Y, 1 = U, 2 = V)
    pub fn range(&self, index: usize) -> Range<usize> {
        self.offsets[index]..self.offsets[index] + self.lens[index]
    }
}

impl Geometry {
    /// Validate dimensions for the 16x2 block conversion
    pub fn new(width: u32, height: u32) -> ConvertResult<Self> {
        if width == 0 || height == 0 || width % BLOCK_WIDTH != 0 || height % BLOCK_HEIGHT != 0 {
            return Err(ConvertError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Packed YUYV frame size: two bytes per pixel
    pub fn input_len(&self) -> usize {
        self.pixels() * 2
    }

    /// Full-resolution luma plane size
    pub fn luma_len(&self) -> usize {
        self.pixels()
    }

    /// Size of one quarter-resolution chroma plane
    pub fn chroma_len(&self) -> usize {
        (self.width as usize / 2) * (self.height as usize / 2)
    }

    /// Planar I420 frame size
    pub fn output_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }

    /// Row strides of the Y, U and V planes (tightly packed)
    pub fn strides(&self) -> [u32; 3] {
        [self.width, self.width / 2, self.width / 2]
    }

    pub fn plane_layout(&self) -> PlaneLayout {
        let luma = self.luma_len();
        let chroma = self.chroma_len();
        PlaneLayout {
            offsets: [0, luma, luma + chroma],
            lens: [luma, chroma, chroma],
        }
    }

    /// Workgroup grid covering the frame, one workgroup per 16x2 block
    pub fn dispatch_grid(&self) -> [u32; 3] {
        [self.width / BLOCK_WIDTH, self.height / BLOCK_HEIGHT, 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unaligned_dimensions() {
        for (w, h) in [(1281, 720), (1280, 721), (8, 2), (0, 720), (1280, 0)] {
            assert_eq!(
                Geometry::new(w, h),
                Err(ConvertError::InvalidGeometry {
                    width: w,
                    height: h
                })
            );
        }
    }

    #[test]
    fn test_hd_layout() {
        let g = Geometry::new(1280, 720).unwrap();
        assert_eq!(g.input_len(), 1_843_200);
        assert_eq!(g.output_len(), 1_382_400);
        assert_eq!(g.plane_layout().offsets, [0, 921_600, 1_152_000]);
        assert_eq!(g.strides(), [1280, 640, 640]);
        assert_eq!(g.dispatch_grid(), [80, 360, 1]);
    }

    #[test]
    fn test_smallest_frame() {
        let g = Geometry::new(16, 2).unwrap();
        assert_eq!(g.input_len(), 64);
        assert_eq!(g.output_len(), 48);
        assert_eq!(g.plane_layout().range(2), 40..48);
        assert_eq!(g.dispatch_grid(), [1, 1, 1]);
    }
}
