// SPDX-License-Identifier: GPL-3.0-only

//! Planar output view and the picture handed to the encoder
//!
//! The output view borrows the mapped output buffer, so a [`Picture`] bound
//! to it cannot outlive the mapping. Once the closure that received the view
//! returns, the buffer is unmapped and the borrow ends with it.

use super::geometry::{Geometry, PlaneLayout};
use crate::errors::{ConvertError, ConvertResult, MappedBuffer};

/// Color space of the converted picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// Planar 4:2:0, Y then U then V at quarter resolution
    #[default]
    I420,
}

/// Per-plane layout fixed at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureFormat {
    pub width: u32,
    pub height: u32,
    pub strides: [u32; 3],
    pub color_space: ColorSpace,
}

impl PictureFormat {
    pub fn for_geometry(geometry: &Geometry) -> Self {
        Self {
            width: geometry.width(),
            height: geometry.height(),
            strides: geometry.strides(),
            color_space: ColorSpace::I420,
        }
    }

    /// Rebind the planes to a freshly mapped view
    pub fn bind<'a>(&self, view: &OutputPlanarView<'a>, index: u64) -> Picture<'a> {
        Picture {
            planes: [view.luma(), view.chroma_u(), view.chroma_v()],
            strides: self.strides,
            color_space: self.color_space,
            width: self.width,
            height: self.height,
            index,
        }
    }
}

/// Read-only view of one mapped planar output frame
#[derive(Debug, Clone, Copy)]
pub struct OutputPlanarView<'a> {
    data: &'a [u8],
    layout: PlaneLayout,
}

impl<'a> OutputPlanarView<'a> {
    /// Wrap a mapped output region; fails if it is smaller than one planar frame
    pub fn new(data: &'a [u8], geometry: &Geometry) -> ConvertResult<Self> {
        let expected = geometry.output_len();
        if data.len() < expected {
            return Err(ConvertError::MappingFailed {
                buffer: MappedBuffer::Output,
                reason: format!("mapped {} bytes, expected {}", data.len(), expected),
            });
        }
        Ok(Self {
            data: &data[..expected],
            layout: geometry.plane_layout(),
        })
    }

    pub fn luma(&self) -> &'a [u8] {
        &self.data[self.layout.range(0)]
    }

    pub fn chroma_u(&self) -> &'a [u8] {
        &self.data[self.layout.range(1)]
    }

    pub fn chroma_v(&self) -> &'a [u8] {
        &self.data[self.layout.range(2)]
    }

    /// The whole planar frame, planes back to back
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// One converted frame as seen by the encoder
#[derive(Debug, Clone, Copy)]
pub struct Picture<'a> {
    /// Y, U and V planes, borrowed from the output mapping
    pub planes: [&'a [u8]; 3],
    pub strides: [u32; 3],
    pub color_space: ColorSpace,
    pub width: u32,
    pub height: u32,
    /// Presentation index, starting at 0 and increasing by one per frame
    pub index: u64,
}

impl Picture<'_> {
    /// Total payload size across all planes
    pub fn len(&self) -> usize {
        self.planes.iter().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_rejects_short_mapping() {
        let g = Geometry::new(16, 2).unwrap();
        let data = vec![0u8; g.output_len() - 1];
        assert!(matches!(
            OutputPlanarView::new(&data, &g),
            Err(ConvertError::MappingFailed {
                buffer: MappedBuffer::Output,
                ..
            })
        ));
    }

    #[test]
    fn test_bound_picture_planes_are_disjoint() {
        let g = Geometry::new(32, 4).unwrap();
        let data: Vec<u8> = (0..g.output_len()).map(|i| i as u8).collect();
        let view = OutputPlanarView::new(&data, &g).unwrap();
        let picture = PictureFormat::for_geometry(&g).bind(&view, 7);

        assert_eq!(picture.index, 7);
        assert_eq!(picture.strides, [32, 16, 16]);
        assert_eq!(picture.planes[0].len(), 128);
        assert_eq!(picture.planes[1][0], 128);
        assert_eq!(picture.planes[2][0], 160);
        assert_eq!(picture.len(), g.output_len());
    }

    #[test]
    fn test_view_ignores_trailing_padding() {
        let g = Geometry::new(16, 2).unwrap();
        let data = vec![1u8; g.output_len() + 256];
        let view = OutputPlanarView::new(&data, &g).unwrap();
        assert_eq!(view.as_bytes().len(), g.output_len());
    }
}
