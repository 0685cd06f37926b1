//! Device capabilities and the compile interface programs are built against.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Capability limits that shader generation and dispatch depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLimits {
    pub max_compute_workgroup_size_x: u32,
    pub max_compute_workgroup_size_y: u32,
    pub max_compute_workgroup_size_z: u32,
    pub max_compute_invocations_per_workgroup: u32,
    pub max_storage_buffers_per_shader_stage: u32,
    pub max_compute_workgroups_per_dimension: u32,
    /// Whether `enable f16;` is available.
    pub shader_f16: bool,
}

/// The WebGPU default limits, without f16.
impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_invocations_per_workgroup: 256,
            max_storage_buffers_per_shader_stage: 8,
            max_compute_workgroups_per_dimension: 65535,
            shader_f16: false,
        }
    }
}

#[cfg(feature = "wgpu")]
impl DeviceLimits {
    /// Limits of a wgpu device created with `limits` and `features`.
    pub fn from_wgpu(limits: &wgpu::Limits, features: wgpu::Features) -> Self {
        Self {
            max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
            max_compute_workgroup_size_y: limits.max_compute_workgroup_size_y,
            max_compute_workgroup_size_z: limits.max_compute_workgroup_size_z,
            max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_storage_buffers_per_shader_stage: limits.max_storage_buffers_per_shader_stage,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            shader_f16: features.contains(wgpu::Features::SHADER_F16),
        }
    }
}

/// What a device needs to create a compute pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRequest<'a> {
    /// Program name, used as the pipeline label.
    pub label: &'a str,
    /// Complete WGSL source.
    pub source: &'a str,
    pub entry_point: &'a str,
    /// Values for the `override` declarations in `source`.
    pub constants: &'a [(String, f64)],
}

/// A device that can compile WGSL into compute pipelines.
///
/// Compilation may block; the program cache never calls it while holding
/// its map lock.
pub trait ComputeDevice {
    /// Compiled pipeline handle.
    type Pipeline: Send + Sync;

    fn limits(&self) -> &DeviceLimits;

    /// Create a shader module and compute pipeline.
    fn create_pipeline(&self, request: &PipelineRequest<'_>) -> Result<Self::Pipeline>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_webgpu() {
        let limits = DeviceLimits::default();
        assert_eq!(limits.max_compute_workgroups_per_dimension, 65535);
        assert_eq!(limits.max_compute_invocations_per_workgroup, 256);
        assert!(!limits.shader_f16);
    }

    #[cfg(feature = "wgpu")]
    #[test]
    fn from_wgpu_limits() {
        let limits = DeviceLimits::from_wgpu(&wgpu::Limits::default(), wgpu::Features::SHADER_F16);
        assert_eq!(limits.max_compute_workgroup_size_z, 64);
        assert_eq!(limits.max_storage_buffers_per_shader_stage, 8);
        assert!(limits.shader_f16);
    }
}
