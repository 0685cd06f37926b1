//! wgpu-backed [`ComputeDevice`].

use std::collections::HashMap;
use std::fmt;

use tracing::info;

use crate::device::{ComputeDevice, DeviceLimits, PipelineRequest};
use crate::error::{ProgramError, Result};

/// Whether the device must support `shader-f16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum F16Support {
    /// Enable f16 when the adapter has it; f16 kernels fail to build otherwise.
    #[default]
    Optional,
    /// Refuse adapters without f16.
    Required,
}

/// Error creating a wgpu device.
#[derive(Debug)]
pub enum DeviceError {
    /// No adapter matched the requested power preference.
    NoAdapter(wgpu::PowerPreference),
    /// f16 was required but the adapter does not expose `shader-f16`.
    MissingF16 { adapter: String },
    /// The adapter refused the device request.
    RequestDevice(wgpu::RequestDeviceError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAdapter(preference) => {
                write!(f, "no WebGPU adapter for power preference {preference:?}")
            }
            Self::MissingF16 { adapter } => {
                write!(f, "adapter {adapter} does not support shader-f16")
            }
            Self::RequestDevice(e) => write!(f, "WebGPU device request failed: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RequestDevice(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for DeviceError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        Self::RequestDevice(e)
    }
}

/// Features to request from an adapter offering `available`.
fn required_features(
    adapter: &str,
    available: wgpu::Features,
    f16: F16Support,
) -> Result<wgpu::Features, DeviceError> {
    let features = available & wgpu::Features::SHADER_F16;
    if f16 == F16Support::Required && features.is_empty() {
        return Err(DeviceError::MissingF16 {
            adapter: adapter.to_string(),
        });
    }
    Ok(features)
}

/// GPU device wrapping wgpu `Device` and `Queue`.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: DeviceLimits,
}

impl WgpuDevice {
    /// Create a device on the default high-performance adapter, requesting
    /// the adapter's full limits and f16 when available.
    pub async fn new() -> Result<Self, DeviceError> {
        Self::with_f16(F16Support::Optional).await
    }

    /// Like [`new`](Self::new), with control over the f16 requirement.
    pub async fn with_f16(f16: F16Support) -> Result<Self, DeviceError> {
        let power_preference = wgpu::PowerPreference::HighPerformance;
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(DeviceError::NoAdapter(power_preference))?;

        let info = adapter.get_info();
        let features = required_features(&info.name, adapter.features(), f16)?;
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tang-webgpu"),
                    required_features: features,
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;
        info!(
            "WebGPU device on {} ({:?}), shader-f16: {}",
            info.name,
            info.backend,
            !features.is_empty()
        );

        Ok(Self::from_parts(device, queue))
    }

    /// Create a device synchronously (blocks on async).
    pub fn new_sync(f16: F16Support) -> Result<Self, DeviceError> {
        pollster::block_on(Self::with_f16(f16))
    }

    /// Wrap a device the caller already created.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let limits = DeviceLimits::from_wgpu(&device.limits(), device.features());
        Self {
            device,
            queue,
            limits,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl ComputeDevice for WgpuDevice {
    type Pipeline = wgpu::ComputePipeline;

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn create_pipeline(&self, request: &PipelineRequest<'_>) -> Result<wgpu::ComputePipeline> {
        let constants: HashMap<String, f64> = request.constants.iter().cloned().collect();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(request.label),
                source: wgpu::ShaderSource::Wgsl(request.source.into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(request.label),
                layout: None,
                module: &module,
                entry_point: Some(request.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    zero_initialize_workgroup_memory: true,
                },
                cache: None,
            });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(ProgramError::Compilation {
                program: request.label.to_string(),
                message: err.to_string(),
            }),
            None => Ok(pipeline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_requested_only_when_offered() {
        let offered = wgpu::Features::SHADER_F16 | wgpu::Features::TIMESTAMP_QUERY;
        assert_eq!(
            required_features("gpu", offered, F16Support::Optional).unwrap(),
            wgpu::Features::SHADER_F16
        );
        assert_eq!(
            required_features("gpu", wgpu::Features::empty(), F16Support::Optional).unwrap(),
            wgpu::Features::empty()
        );
    }

    #[test]
    fn required_f16_missing() {
        let err = required_features("llvmpipe", wgpu::Features::empty(), F16Support::Required)
            .unwrap_err();
        assert!(matches!(&err, DeviceError::MissingF16 { adapter } if adapter == "llvmpipe"));
        assert_eq!(err.to_string(), "adapter llvmpipe does not support shader-f16");

        let err = DeviceError::NoAdapter(wgpu::PowerPreference::HighPerformance);
        assert_eq!(
            err.to_string(),
            "no WebGPU adapter for power preference HighPerformance"
        );
    }
}
