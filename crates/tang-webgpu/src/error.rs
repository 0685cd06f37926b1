//! Error types for program generation and pipeline caching.

use std::fmt;

/// Errors that can occur while building a GPU program.
///
/// Every variant is fatal to the current build attempt: no shader text or
/// pipeline is produced and the program cache is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// The program descriptor or its metadata is malformed.
    InvalidDescriptor(String),
    /// A workgroup size dimension is zero.
    InvalidWorkgroupSize { x: u32, y: u32, z: u32 },
    /// A workgroup size dimension exceeds the device's per-dimension maximum.
    WorkgroupSizeExceedsLimit {
        size: [u32; 3],
        max: [u32; 3],
    },
    /// The workgroup volume exceeds the device's invocation maximum.
    TooManyInvocations { invocations: u64, max: u32 },
    /// More storage buffers than the device allows per shader stage.
    TooManyStorageBuffers { max: u32 },
    /// The dispatch cannot be redistributed within the per-dimension limit.
    DispatchTooLarge { dispatch: [u32; 3], max: u32 },
    /// The program needs a device feature that is not available.
    UnsupportedFeature { program: String, feature: &'static str },
    /// The kernel's shader code generation failed.
    ShaderGeneration(String),
    /// The device rejected the shader module or pipeline.
    Compilation { program: String, message: String },
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDescriptor(msg) => write!(f, "invalid program descriptor: {msg}"),
            Self::InvalidWorkgroupSize { x, y, z } => {
                write!(f, "workgroup size must be greater than 0, got ({x}, {y}, {z})")
            }
            Self::WorkgroupSizeExceedsLimit { size, max } => write!(
                f,
                "workgroup size ({}, {}, {}) exceeds the maximum allowed size [{}, {}, {}]",
                size[0], size[1], size[2], max[0], max[1], max[2]
            ),
            Self::TooManyInvocations { invocations, max } => write!(
                f,
                "workgroup size has {invocations} invocations, exceeds the maximum allowed {max}"
            ),
            Self::TooManyStorageBuffers { max } => {
                write!(f, "too many storage buffers in shader, max is {max}")
            }
            Self::DispatchTooLarge { dispatch, max } => write!(
                f,
                "dispatch group size ({}, {}, {}) exceeds the per-dimension maximum {max}",
                dispatch[0], dispatch[1], dispatch[2]
            ),
            Self::UnsupportedFeature { program, feature } => write!(
                f,
                "program {program} requires {feature} but the device does not support it"
            ),
            Self::ShaderGeneration(msg) => write!(f, "shader generation failed: {msg}"),
            Self::Compilation { program, message } => {
                write!(f, "failed to compile program {program}: {message}")
            }
        }
    }
}

impl std::error::Error for ProgramError {}

/// Result alias used throughout the crate.
pub type Result<T, E = ProgramError> = std::result::Result<T, E>;

/// Errors from parsing provider options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A known option carried a value it cannot take.
    InvalidValue { key: String, value: String },
    /// An opaque handle option could not be parsed.
    Handle { key: String, source: HandleParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            Self::Handle { key, source } => write!(f, "invalid handle for {key}: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handle { source, .. } => Some(source),
            Self::InvalidValue { .. } => None,
        }
    }
}

/// Error from parsing an [`OpaqueHandle`](crate::handle::OpaqueHandle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleParseError {
    /// The input was empty.
    Empty,
    /// The input is not an unsigned 64-bit integer.
    Malformed(String),
    /// Zero is reserved for "no handle".
    Null,
}

impl fmt::Display for HandleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty handle string"),
            Self::Malformed(s) => write!(f, "malformed handle {s:?}"),
            Self::Null => write!(f, "handle must be non-zero"),
        }
    }
}

impl std::error::Error for HandleParseError {}
