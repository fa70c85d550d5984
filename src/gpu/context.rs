// SPDX-License-Identifier: GPL-3.0-only

//! Headless compute context running the YUYV to I420 shader
//!
//! Resources are acquired in a fixed order (device node, adapter, logical
//! device, program, buffers) and every successful step is recorded in an
//! [`AcquisitionLog`]. A failing step, or dropping the context, releases
//! exactly the recorded steps in reverse order.

use super::lifecycle::{AcquisitionLog, Stage, StageRelease};
use super::{DrmNode, GpuConnection, wgpu};
use crate::constants::binding;
use crate::convert::{ComputeDevice, Geometry};
use crate::errors::{ConvertError, ConvertResult, MappedBuffer};
use crate::shaders::{ConvertParams, YUYV_TO_I420};
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

/// Construction options for [`ComputeContext`]
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    /// Map the output storage buffer directly when the adapter allows it,
    /// instead of copying it into a readback buffer
    pub allow_direct_mapping: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            allow_direct_mapping: true,
        }
    }
}

/// Compiled conversion pipeline
struct Program {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl Program {
    fn compile(device: &wgpu::Device) -> ConvertResult<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("YUYV to I420 Shader"),
            source: wgpu::ShaderSource::Wgsl(YUYV_TO_I420.into()),
        });

        let storage = |read_only: bool, slot: u32| wgpu::BindGroupLayoutEntry {
            binding: slot,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("YUYV to I420 Bind Group Layout"),
            entries: &[
                // Packed input
                storage(true, binding::INPUT),
                // Planar output
                storage(false, binding::OUTPUT),
                // Geometry uniform
                wgpu::BindGroupLayoutEntry {
                    binding: binding::PARAMS,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("YUYV to I420 Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("YUYV to I420 Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ConvertError::ShaderCompileFailed(err.to_string()));
        }

        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }
}

/// The buffers bound at the fixed slots, plus an optional readback buffer
struct BufferBindings {
    input: wgpu::Buffer,
    output: wgpu::Buffer,
    params: wgpu::Buffer,
    /// Present when the output buffer cannot be mapped directly
    readback: Option<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
}

impl BufferBindings {
    fn allocate(
        device: &wgpu::Device,
        program: &Program,
        geometry: &Geometry,
        direct_mapping: bool,
    ) -> ConvertResult<Self> {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let input = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("YUYV Input Buffer"),
            size: geometry.input_len() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let output_usage = if direct_mapping {
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::MAP_READ
        } else {
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC
        };
        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("I420 Output Buffer"),
            size: geometry.output_len() as u64,
            usage: output_usage,
            mapped_at_creation: false,
        });

        let readback = (!direct_mapping).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("I420 Readback Buffer"),
                size: geometry.output_len() as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("YUYV to I420 Params"),
            contents: bytemuck::bytes_of(&ConvertParams::new(geometry)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("YUYV to I420 Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: binding::INPUT,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: binding::OUTPUT,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: binding::PARAMS,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            return Err(ConvertError::ContextCreationFailed(format!(
                "failed to allocate conversion buffers: {}",
                err
            )));
        }

        Ok(Self {
            input,
            output,
            params,
            readback,
            bind_group,
        })
    }

    /// Buffer the host maps to read the planar frame
    fn host_visible(&self) -> &wgpu::Buffer {
        self.readback.as_ref().unwrap_or(&self.output)
    }

    fn destroy(self) {
        self.input.destroy();
        self.output.destroy();
        self.params.destroy();
        if let Some(readback) = self.readback {
            readback.destroy();
        }
    }
}

/// Everything the context may hold, each slot filled by one stage
#[derive(Default)]
struct GpuResources {
    node: Option<DrmNode>,
    display: Option<GpuConnection>,
    context: Option<(wgpu::Device, wgpu::Queue)>,
    program: Option<Program>,
    buffers: Option<BufferBindings>,
}

impl StageRelease for GpuResources {
    fn release(&mut self, stage: Stage) -> Result<(), String> {
        let missing = || format!("{} was recorded but not held", stage);
        match stage {
            Stage::Buffers => {
                self.buffers.take().ok_or_else(missing)?.destroy();
                Ok(())
            }
            Stage::Program => self.program.take().map(drop).ok_or_else(missing),
            Stage::Context => {
                let (device, queue) = self.context.take().ok_or_else(missing)?;
                let idle = device.poll(wgpu::PollType::wait_indefinitely());
                drop(queue);
                device.destroy();
                idle.map(|_| ()).map_err(|e| format!("device did not go idle: {:?}", e))
            }
            Stage::Display => self.display.take().map(drop).ok_or_else(missing),
            Stage::Device => self.node.take().ok_or_else(missing)?.close(),
        }
    }
}

/// Headless GPU context converting one frame at a time
pub struct ComputeContext {
    geometry: Geometry,
    direct_mapping: bool,
    resources: GpuResources,
    log: AcquisitionLog,
}

impl ComputeContext {
    /// Acquire every resource needed to convert frames of `geometry` on the
    /// GPU behind `render_node`.
    ///
    /// On failure, the resources acquired so far are released before the
    /// error is returned.
    pub fn open(
        geometry: Geometry,
        render_node: &str,
        options: ContextOptions,
    ) -> ConvertResult<Self> {
        let mut ctx = Self {
            geometry,
            direct_mapping: false,
            resources: GpuResources::default(),
            log: AcquisitionLog::new(),
        };

        match ctx.acquire(render_node, options) {
            Ok(()) => {
                info!(
                    render_node,
                    width = geometry.width(),
                    height = geometry.height(),
                    direct_mapping = ctx.direct_mapping,
                    "GPU compute context ready"
                );
                Ok(ctx)
            }
            Err(err) => {
                warn!(stage = err.stage(), error = %err, "Compute context construction failed");
                ctx.release_all();
                Err(err)
            }
        }
    }

    fn acquire(&mut self, render_node: &str, options: ContextOptions) -> ConvertResult<()> {
        let node = self.resources.node.insert(DrmNode::open(render_node)?);
        let pci_ids = node.pci_ids();
        self.log.record(Stage::Device);

        let connection = self.resources.display.insert(GpuConnection::connect(pci_ids)?);
        self.log.record(Stage::Display);

        connection.check_capabilities(
            self.geometry.input_len(),
            self.geometry.output_len(),
            self.geometry.dispatch_grid(),
        )?;
        let direct_mapping = options.allow_direct_mapping && connection.supports_direct_mapping();

        let (device, queue) = connection.create_compute_device("YUYV to I420", direct_mapping)?;
        let (device, _) = self.resources.context.insert((device, queue));
        self.log.record(Stage::Context);

        let program = self.resources.program.insert(Program::compile(device)?);
        self.log.record(Stage::Program);

        let buffers = BufferBindings::allocate(device, program, &self.geometry, direct_mapping)?;
        self.resources.buffers = Some(buffers);
        self.log.record(Stage::Buffers);

        self.direct_mapping = direct_mapping;
        debug!(direct_mapping, "Conversion buffers bound");
        Ok(())
    }

    /// Release every recorded stage in reverse acquisition order
    fn release_all(&mut self) {
        let failures = self.log.unwind(&mut self.resources);
        if !failures.is_empty() {
            warn!(count = failures.len(), "Compute context teardown finished with errors");
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Whether the output buffer is mapped without a readback copy
    pub fn uses_direct_mapping(&self) -> bool {
        self.direct_mapping
    }

    /// Stages currently held, in acquisition order
    pub fn acquired(&self) -> &[Stage] {
        self.log.acquired()
    }

    fn live(&self) -> Option<(&wgpu::Device, &wgpu::Queue, &Program, &BufferBindings)> {
        let (device, queue) = self.resources.context.as_ref()?;
        Some((
            device,
            queue,
            self.resources.program.as_ref()?,
            self.resources.buffers.as_ref()?,
        ))
    }
}

impl ComputeDevice for ComputeContext {
    fn input_capacity(&self) -> usize {
        self.resources
            .buffers
            .as_ref()
            .map_or(0, |b| b.input.size() as usize)
    }

    fn output_capacity(&self) -> usize {
        self.resources
            .buffers
            .as_ref()
            .map_or(0, |b| b.output.size() as usize)
    }

    fn upload(&mut self, packed: &[u8]) -> ConvertResult<()> {
        let mapping_failed = |reason: String| ConvertError::MappingFailed {
            buffer: MappedBuffer::Input,
            reason,
        };
        let (_, queue, _, buffers) = self
            .live()
            .ok_or_else(|| mapping_failed("context released".to_string()))?;
        if packed.len() as u64 > buffers.input.size() {
            return Err(mapping_failed(format!(
                "{} bytes exceed input buffer of {}",
                packed.len(),
                buffers.input.size()
            )));
        }

        // Staged write replaces the whole range, previous contents are discarded
        queue.write_buffer(&buffers.input, 0, packed);
        Ok(())
    }

    fn dispatch(&mut self, grid: [u32; 3]) -> ConvertResult<()> {
        let (device, queue, program, buffers) = self
            .live()
            .ok_or_else(|| ConvertError::DispatchFailed("context released".to_string()))?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("YUYV to I420 Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("YUYV to I420 Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(grid[0], grid[1], grid[2]);
        }
        if let Some(readback) = &buffers.readback {
            encoder.copy_buffer_to_buffer(&buffers.output, 0, readback, 0, buffers.output.size());
        }
        queue.submit(std::iter::once(encoder.finish()));

        // Block until the shader's writes have landed
        let polled = device.poll(wgpu::PollType::wait_indefinitely());

        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            return Err(ConvertError::DispatchFailed(err.to_string()));
        }
        polled.map(|_| ()).map_err(|e| {
            ConvertError::DispatchFailed(format!("wait for completion failed: {:?}", e))
        })
    }

    fn read_output<R>(&mut self, consume: impl FnOnce(&[u8]) -> R) -> ConvertResult<R> {
        let mapping_failed = |reason: String| ConvertError::MappingFailed {
            buffer: MappedBuffer::Output,
            reason,
        };
        let (device, _, _, buffers) = self
            .live()
            .ok_or_else(|| mapping_failed("context released".to_string()))?;

        let buffer = buffers.host_visible();
        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        let _ = device.poll(wgpu::PollType::wait_indefinitely());

        pollster::block_on(receiver)
            .map_err(|_| mapping_failed("mapping callback dropped".to_string()))?
            .map_err(|e| mapping_failed(e.to_string()))?;

        let data = slice.get_mapped_range();
        let result = consume(&data);
        drop(data);
        buffer.unmap();

        Ok(result)
    }
}

impl Drop for ComputeContext {
    fn drop(&mut self) {
        if !self.log.is_empty() {
            debug!("Tearing down GPU compute context");
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resources of a context whose adapter lookup failed
    fn node_only() -> GpuResources {
        GpuResources {
            node: Some(DrmNode::open("/dev/null").unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_unwind_releases_only_the_held_node() {
        let mut resources = node_only();
        let mut log = AcquisitionLog::new();
        log.record(Stage::Device);

        let failures = log.unwind(&mut resources);
        assert!(failures.is_empty(), "unexpected failures: {:?}", failures);
        assert!(resources.node.is_none());
        assert!(resources.display.is_none());
        assert!(resources.context.is_none());
    }

    #[test]
    fn test_releasing_unheld_stage_reports_instead_of_panicking() {
        let mut resources = node_only();
        let err = resources.release(Stage::Display).unwrap_err();
        assert!(err.contains("display"), "{}", err);
        assert!(resources.release(Stage::Buffers).is_err());

        // The node is untouched until its own stage is released
        assert!(resources.node.is_some());
        assert!(resources.release(Stage::Device).is_ok());
        assert!(resources.node.is_none());
    }
}
