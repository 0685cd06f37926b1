//! WGSL compute program generation and pipeline caching.
//!
//! A kernel family implements [`Program`]: it declares its constants and
//! uniforms and writes its shader through a [`ShaderHelper`]. Each call site
//! describes one invocation with a [`ProgramDescriptor`], and a
//! [`ProgramManager`] turns that into a compiled pipeline, generating and
//! compiling each distinct shader only once.
//!
//! Enable the `wgpu` feature (on by default) for [`WgpuDevice`]. Without it,
//! any [`ComputeDevice`] implementation can be used.

pub mod cache;
pub mod cache_key;
pub mod config;
pub mod context;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod kernels;
pub mod program;
pub mod shader;
pub mod tensor;
pub mod types;
pub mod uniform;
#[cfg(feature = "wgpu")]
pub mod wgpu_device;

pub use cache::{ProgramArtifact, ProgramManager, ResolvedProgram};
pub use cache_key::program_cache_key;
pub use config::{BufferCacheMode, DataLayout, ProviderOptions};
pub use context::{ContextRegistry, GpuContext};
pub use device::{ComputeDevice, DeviceLimits, PipelineRequest};
pub use dispatch::normalize_dispatch;
pub use error::{ConfigError, HandleParseError, ProgramError, Result};
pub use handle::OpaqueHandle;
pub use program::{
    DependencyFlags, DispatchSize, OverridableConstantDefinition, Program, ProgramBuilder,
    ProgramConstant, ProgramDescriptor, ProgramInput, ProgramMetadata, UniformDefinition,
    UniformScalar, UniformValue, WORKGROUP_SIZE,
};
pub use shader::{GeneratedShader, ShaderHelper, ShaderVariable, VariableScope};
pub use tensor::{TensorInfo, TensorMeta, TensorShape};
pub use types::{ConstantDataType, ConstantValue, ElementType, UniformDataType, VariableDataType};
pub use uniform::{UniformLayout, UniformLayoutEntry};
#[cfg(feature = "wgpu")]
pub use wgpu_device::{DeviceError, F16Support, WgpuDevice};
