// SPDX-License-Identifier: GPL-3.0-only

//! Runtime choice between the GPU and the CPU conversion device

use super::ComputeDevice;
use super::geometry::Geometry;
use super::software::SoftwareDevice;
use crate::errors::ConvertResult;
use crate::gpu::context::{ComputeContext, ContextOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Which device performs the conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Compute shader on the GPU behind the render node
    #[default]
    Gpu,
    /// Scalar conversion on the CPU
    Software,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gpu => write!(f, "gpu"),
            BackendKind::Software => write!(f, "software"),
        }
    }
}

/// Conversion device selected at startup
pub enum ConversionBackend {
    Gpu(ComputeContext),
    Software(SoftwareDevice),
}

impl ConversionBackend {
    pub fn open(
        kind: BackendKind,
        geometry: Geometry,
        render_node: &str,
        options: ContextOptions,
    ) -> ConvertResult<Self> {
        info!(backend = %kind, "Opening conversion backend");
        match kind {
            BackendKind::Gpu => Ok(Self::Gpu(ComputeContext::open(
                geometry,
                render_node,
                options,
            )?)),
            BackendKind::Software => Ok(Self::Software(SoftwareDevice::new(geometry))),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Gpu(_) => BackendKind::Gpu,
            Self::Software(_) => BackendKind::Software,
        }
    }
}

impl ComputeDevice for ConversionBackend {
    fn input_capacity(&self) -> usize {
        match self {
            Self::Gpu(ctx) => ctx.input_capacity(),
            Self::Software(dev) => dev.input_capacity(),
        }
    }

    fn output_capacity(&self) -> usize {
        match self {
            Self::Gpu(ctx) => ctx.output_capacity(),
            Self::Software(dev) => dev.output_capacity(),
        }
    }

    fn upload(&mut self, packed: &[u8]) -> ConvertResult<()> {
        match self {
            Self::Gpu(ctx) => ctx.upload(packed),
            Self::Software(dev) => dev.upload(packed),
        }
    }

    fn dispatch(&mut self, grid: [u32; 3]) -> ConvertResult<()> {
        match self {
            Self::Gpu(ctx) => ctx.dispatch(grid),
            Self::Software(dev) => dev.dispatch(grid),
        }
    }

    fn read_output<R>(&mut self, consume: impl FnOnce(&[u8]) -> R) -> ConvertResult<R> {
        match self {
            Self::Gpu(ctx) => ctx.read_output(consume),
            Self::Software(dev) => dev.read_output(consume),
        }
    }
}
