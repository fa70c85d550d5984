// SPDX-License-Identifier: GPL-3.0-only

//! CPU implementation of the YUYV to I420 conversion
//!
//! Produces byte-identical output to the compute shader. Used as the
//! reference in GPU tests and as a fallback device when no GPU is usable.

use super::ComputeDevice;
use super::geometry::Geometry;
use crate::errors::{ConvertError, ConvertResult, MappedBuffer};
use tracing::debug;

/// Convert one packed YUYV frame into planar I420.
///
/// Luma is copied as-is. Each chroma sample is the rounded average of the
/// two vertically adjacent samples of a row pair.
///
/// `packed` must hold at least `geometry.input_len()` bytes and `planar` at
/// least `geometry.output_len()` bytes.
pub fn yuyv_to_i420(packed: &[u8], geometry: &Geometry, planar: &mut [u8]) {
    let width = geometry.width() as usize;
    let height = geometry.height() as usize;
    let row_bytes = width * 2;
    let chroma_width = width / 2;

    let layout = geometry.plane_layout();
    let (luma, chroma) = planar[..geometry.output_len()].split_at_mut(layout.lens[0]);
    let (plane_u, plane_v) = chroma.split_at_mut(layout.lens[1]);

    for pair in 0..height / 2 {
        let y = pair * 2;
        let top = &packed[y * row_bytes..(y + 1) * row_bytes];
        let bottom = &packed[(y + 1) * row_bytes..(y + 2) * row_bytes];

        let (luma_top, luma_bottom) = luma[y * width..(y + 2) * width].split_at_mut(width);
        let chroma_row = pair * chroma_width;

        for (i, (t, b)) in top.chunks_exact(4).zip(bottom.chunks_exact(4)).enumerate() {
            luma_top[2 * i] = t[0];
            luma_top[2 * i + 1] = t[2];
            luma_bottom[2 * i] = b[0];
            luma_bottom[2 * i + 1] = b[2];
            plane_u[chroma_row + i] = average(t[1], b[1]);
            plane_v[chroma_row + i] = average(t[3], b[3]);
        }
    }
}

#[inline]
fn average(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16 + 1) >> 1) as u8
}

/// Compute device backed by host memory
pub struct SoftwareDevice {
    geometry: Geometry,
    input: Vec<u8>,
    output: Vec<u8>,
}

impl SoftwareDevice {
    pub fn new(geometry: Geometry) -> Self {
        debug!(
            width = geometry.width(),
            height = geometry.height(),
            "Allocating software conversion buffers"
        );
        Self {
            geometry,
            input: vec![0; geometry.input_len()],
            output: vec![0; geometry.output_len()],
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
}

impl ComputeDevice for SoftwareDevice {
    fn input_capacity(&self) -> usize {
        self.input.len()
    }

    fn output_capacity(&self) -> usize {
        self.output.len()
    }

    fn upload(&mut self, packed: &[u8]) -> ConvertResult<()> {
        let dst = self
            .input
            .get_mut(..packed.len())
            .ok_or_else(|| ConvertError::MappingFailed {
                buffer: MappedBuffer::Input,
                reason: format!("{} bytes exceed input buffer", packed.len()),
            })?;
        dst.copy_from_slice(packed);
        Ok(())
    }

    fn dispatch(&mut self, grid: [u32; 3]) -> ConvertResult<()> {
        if grid != self.geometry.dispatch_grid() {
            return Err(ConvertError::DispatchFailed(format!(
                "grid {:?} does not cover a {}x{} frame",
                grid,
                self.geometry.width(),
                self.geometry.height()
            )));
        }
        yuyv_to_i420(&self.input, &self.geometry, &mut self.output);
        Ok(())
    }

    fn read_output<R>(&mut self, consume: impl FnOnce(&[u8]) -> R) -> ConvertResult<R> {
        Ok(consume(&self.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a packed frame where every pixel pair has the given Y0, U, Y1, V
    fn uniform_frame(g: &Geometry, px: [u8; 4]) -> Vec<u8> {
        px.iter().copied().cycle().take(g.input_len()).collect()
    }

    #[test]
    fn test_uniform_frame() {
        let g = Geometry::new(16, 2).unwrap();
        let packed = uniform_frame(&g, [10, 20, 30, 40]);
        let mut planar = vec![0u8; g.output_len()];
        yuyv_to_i420(&packed, &g, &mut planar);

        let layout = g.plane_layout();
        assert!(planar[layout.range(0)].chunks(2).all(|p| p == [10, 30]));
        assert!(planar[layout.range(1)].iter().all(|&u| u == 20));
        assert!(planar[layout.range(2)].iter().all(|&v| v == 40));
    }

    #[test]
    fn test_chroma_is_rounded_vertical_average() {
        let g = Geometry::new(16, 2).unwrap();
        let mut packed = uniform_frame(&g, [0, 100, 0, 200]);
        // Bottom row: U = 101, V = 0
        for chunk in packed[32..].chunks_exact_mut(4) {
            chunk[1] = 101;
            chunk[3] = 0;
        }
        let mut planar = vec![0u8; g.output_len()];
        yuyv_to_i420(&packed, &g, &mut planar);

        let layout = g.plane_layout();
        assert!(planar[layout.range(1)].iter().all(|&u| u == 101));
        assert!(planar[layout.range(2)].iter().all(|&v| v == 100));
    }

    #[test]
    fn test_luma_rows_keep_order() {
        let g = Geometry::new(16, 4).unwrap();
        let packed: Vec<u8> = (0..g.input_len())
            .map(|i| if i % 2 == 0 { (i / 2) as u8 } else { 128 })
            .collect();
        let mut planar = vec![0u8; g.output_len()];
        yuyv_to_i420(&packed, &g, &mut planar);

        let expected: Vec<u8> = (0..g.luma_len()).map(|i| i as u8).collect();
        assert_eq!(&planar[..g.luma_len()], expected.as_slice());
    }

    #[test]
    fn test_device_rejects_wrong_grid() {
        let g = Geometry::new(32, 2).unwrap();
        let mut device = SoftwareDevice::new(g);
        assert!(matches!(
            device.dispatch([1, 1, 1]),
            Err(ConvertError::DispatchFailed(_))
        ));
        assert!(device.dispatch(g.dispatch_grid()).is_ok());
    }
}
