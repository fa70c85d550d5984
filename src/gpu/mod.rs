// SPDX-License-Identifier: GPL-3.0-only

//! GPU device access for the headless conversion context.
//!
//! The render node named on the command line is opened first, then the wgpu
//! adapter driving that node is picked by its PCI ids. No surface is ever
//! created; all work goes through compute pipelines and storage buffers.

pub mod context;
pub mod lifecycle;

pub use wgpu;

use crate::errors::{ConvertError, ConvertResult};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;
use tracing::{debug, info, warn};

/// Backends able to run compute without a window system
const HEADLESS_BACKENDS: wgpu::Backends = wgpu::Backends::VULKAN.union(wgpu::Backends::GL);

/// Minimum storage buffers the conversion binds in one shader stage
const REQUIRED_STORAGE_BUFFERS: u32 = 2;

/// Open handle on a DRM device node
#[derive(Debug)]
pub struct DrmNode {
    path: String,
    fd: RawFd,
}

impl DrmNode {
    pub fn open(path: &str) -> ConvertResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| ConvertError::DeviceOpenFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        debug!(path, "Opened GPU device node");
        Ok(Self {
            path: path.to_string(),
            fd: file.into_raw_fd(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// PCI vendor and device ids of the node, when it sits on a PCI bus
    pub fn pci_ids(&self) -> Option<(u32, u32)> {
        let name = Path::new(&self.path).file_name()?.to_str()?;
        let device_dir = Path::new("/sys/class/drm").join(name).join("device");
        let read_hex = |file: &str| -> Option<u32> {
            let raw = std::fs::read_to_string(device_dir.join(file)).ok()?;
            u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok()
        };
        Some((read_hex("vendor")?, read_hex("device")?))
    }

    /// Close the handle, reporting the close error if any
    pub fn close(&mut self) -> Result<(), String> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = std::mem::replace(&mut self.fd, -1);
        // SAFETY: fd came from into_raw_fd and is closed exactly once
        let result = unsafe { libc::close(fd) };
        if result < 0 {
            Err(std::io::Error::last_os_error().to_string())
        } else {
            Ok(())
        }
    }
}

impl Drop for DrmNode {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path, error = %e, "Failed to close GPU device node");
        }
    }
}

/// Instance and adapter bound to one GPU
pub struct GpuConnection {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuConnection {
    /// Connect to the adapter matching `pci_ids`, or the first hardware adapter
    pub fn connect(pci_ids: Option<(u32, u32)>) -> ConvertResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: HEADLESS_BACKENDS,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(HEADLESS_BACKENDS);
        if adapters.is_empty() {
            return Err(ConvertError::DisplayInitFailed(
                "no Vulkan or GL adapter available".to_string(),
            ));
        }

        let matching = pci_ids.and_then(|(vendor, device)| {
            adapters.iter().position(|a| {
                let info = a.get_info();
                info.vendor == vendor && info.device == device
            })
        });

        let position = match matching {
            Some(position) => position,
            None => {
                let position = adapters
                    .iter()
                    .position(|a| a.get_info().device_type != wgpu::DeviceType::Cpu)
                    .ok_or_else(|| {
                        ConvertError::DisplayInitFailed(
                            "only software adapters are available".to_string(),
                        )
                    })?;
                warn!(
                    pci_ids = ?pci_ids,
                    adapter = %adapters[position].get_info().name,
                    "No adapter matches the device node, using first hardware adapter"
                );
                position
            }
        };

        let adapter = adapters.swap_remove(position);
        let info = adapter.get_info();
        info!(
            adapter = %info.name,
            backend = ?info.backend,
            driver = %info.driver,
            "GPU adapter selected for conversion"
        );

        Ok(Self { instance, adapter })
    }

    /// Check the adapter can run the conversion for buffers of the given sizes
    pub fn check_capabilities(
        &self,
        input_len: usize,
        output_len: usize,
        grid: [u32; 3],
    ) -> ConvertResult<()> {
        let downlevel = self.adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(ConvertError::UnsupportedDevice(
                "adapter does not support compute shaders".to_string(),
            ));
        }

        let limits = self.adapter.limits();
        if limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
            return Err(ConvertError::UnsupportedDevice(format!(
                "adapter exposes {} storage buffers per stage, {} required",
                limits.max_storage_buffers_per_shader_stage, REQUIRED_STORAGE_BUFFERS
            )));
        }

        let largest = input_len.max(output_len) as u64;
        if largest > limits.max_storage_buffer_binding_size as u64
            || largest > limits.max_buffer_size
        {
            return Err(ConvertError::UnsupportedDevice(format!(
                "frame buffers of {} bytes exceed adapter limits",
                largest
            )));
        }

        if grid.iter().any(|&n| n > limits.max_compute_workgroups_per_dimension) {
            return Err(ConvertError::UnsupportedDevice(format!(
                "dispatch grid {:?} exceeds {} workgroups per dimension",
                grid, limits.max_compute_workgroups_per_dimension
            )));
        }

        Ok(())
    }

    /// Whether the output buffer can be mapped directly, without a readback copy
    pub fn supports_direct_mapping(&self) -> bool {
        self.adapter
            .features()
            .contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS)
            && self.adapter.get_info().device_type == wgpu::DeviceType::IntegratedGpu
    }

    /// Create the logical device and queue used for conversion
    pub fn create_compute_device(
        &self,
        label: &str,
        direct_mapping: bool,
    ) -> ConvertResult<(wgpu::Device, wgpu::Queue)> {
        let required_features = if direct_mapping {
            wgpu::Features::MAPPABLE_PRIMARY_BUFFERS
        } else {
            wgpu::Features::empty()
        };

        pollster::block_on(self.adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features,
            required_limits: self.adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| {
            ConvertError::ContextCreationFailed(format!("failed to create GPU device: {}", e))
        })
    }
}

/// Summary of one adapter, as printed by `--probe`
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub vendor: u32,
    pub device: u32,
    pub compute: bool,
    pub direct_mapping: bool,
}

/// List every adapter reachable without a window system
pub fn list_adapters() -> Vec<AdapterSummary> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: HEADLESS_BACKENDS,
        ..Default::default()
    });

    instance
        .enumerate_adapters(HEADLESS_BACKENDS)
        .into_iter()
        .map(|adapter| {
            let info = adapter.get_info();
            AdapterSummary {
                name: info.name,
                backend: info.backend,
                device_type: info.device_type,
                vendor: info.vendor,
                device: info.device,
                compute: adapter
                    .get_downlevel_capabilities()
                    .flags
                    .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
                direct_mapping: adapter
                    .features()
                    .contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_node_is_device_open_failure() {
        match DrmNode::open("/dev/dri/does-not-exist") {
            Err(ConvertError::DeviceOpenFailed { path, .. }) => {
                assert_eq!(path, "/dev/dri/does-not-exist");
            }
            other => panic!("unexpected result: {:?}", other.map(|n| n.path().to_string())),
        }
    }

    #[test]
    fn test_list_adapters() {
        // Requires a GPU driver; an empty list is fine in CI
        let adapters = list_adapters();
        if adapters.is_empty() {
            println!("Skipping test (no GPU adapters)");
        }
        for adapter in &adapters {
            println!("{:?}", adapter);
        }
    }
}
