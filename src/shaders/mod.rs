// SPDX-License-Identifier: GPL-3.0-only
//! Compute shader sources and their uniform layouts

use crate::convert::Geometry;

/// YUYV to I420 conversion, bound at the slots in [`crate::constants::binding`]
pub const YUYV_TO_I420: &str = include_str!("yuyv_to_i420.wgsl");

/// Uniform buffer for the conversion shader
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ConvertParams {
    pub width: u32,
    pub height: u32,
    _pad: [u32; 2],
}

impl ConvertParams {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            width: geometry.width(),
            height: geometry.height(),
            _pad: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::binding;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) -> naga::Module {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(e) => panic!("Shader '{}' parse failed: {:?}", name, e),
        };

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module);

        if let Err(e) = info {
            panic!("Shader '{}' validation failed: {:?}", name, e);
        }
        module
    }

    #[test]
    fn test_yuyv_to_i420_shader_validates() {
        validate_shader("yuyv_to_i420", YUYV_TO_I420);
    }

    #[test]
    fn test_shader_bindings_match_slots() {
        let module = validate_shader("yuyv_to_i420", YUYV_TO_I420);
        let mut slots: Vec<u32> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| var.binding.as_ref().map(|b| b.binding))
            .collect();
        slots.sort_unstable();
        assert_eq!(slots, [binding::INPUT, binding::OUTPUT, binding::PARAMS]);
    }

    #[test]
    fn test_workgroup_covers_half_block() {
        let module = validate_shader("yuyv_to_i420", YUYV_TO_I420);
        let entry = module
            .entry_points
            .iter()
            .find(|e| e.name == "main")
            .expect("main entry point");
        assert_eq!(entry.workgroup_size, [2, 1, 1]);
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ConvertParams>(), 16);
        let params = ConvertParams::new(&Geometry::new(1280, 720).unwrap());
        let bytes = bytemuck::bytes_of(&params);
        assert_eq!(&bytes[0..4], &1280u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &720u32.to_ne_bytes());
    }
}
