//! Scalar and variable data types used in generated WGSL.

use std::fmt;

use half::f16;
use serde::{Deserialize, Serialize};

/// Data type of a uniform variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformDataType {
    F32,
    F16,
    U32,
    I32,
}

impl UniformDataType {
    /// Size of one scalar in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::U32 | Self::I32 => 4,
            Self::F16 => 2,
        }
    }

    /// WGSL scalar type name.
    pub fn wgsl(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::U32 => "u32",
            Self::I32 => "i32",
        }
    }
}

/// Data type of a constant or overridable constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstantDataType {
    F32,
    F16,
    U32,
    I32,
    Bool,
}

impl ConstantDataType {
    /// WGSL type name.
    pub fn wgsl(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::Bool => "bool",
        }
    }
}

/// A typed constant value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstantValue {
    F32(f32),
    F16(f16),
    U32(u32),
    I32(i32),
    Bool(bool),
}

impl ConstantValue {
    pub fn data_type(self) -> ConstantDataType {
        match self {
            Self::F32(_) => ConstantDataType::F32,
            Self::F16(_) => ConstantDataType::F16,
            Self::U32(_) => ConstantDataType::U32,
            Self::I32(_) => ConstantDataType::I32,
            Self::Bool(_) => ConstantDataType::Bool,
        }
    }

    /// Whether the value has a WGSL literal. NaN and infinities do not.
    pub fn is_finite(self) -> bool {
        match self {
            Self::F32(v) => v.is_finite(),
            Self::F16(v) => v.is_finite(),
            _ => true,
        }
    }

    /// Value as passed to pipeline creation, where every override is an f64.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::F32(v) => v as f64,
            Self::F16(v) => v.to_f64(),
            Self::U32(v) => v as f64,
            Self::I32(v) => v as f64,
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Renders the value as a WGSL literal of its own type.
impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32(v) => write!(f, "{v:?}"),
            Self::F16(v) => write!(f, "{:?}h", v.to_f32()),
            Self::U32(v) => write!(f, "{v}u"),
            Self::I32(v) => write!(f, "{v}i"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<f32> for ConstantValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f16> for ConstantValue {
    fn from(v: f16) -> Self {
        Self::F16(v)
    }
}

impl From<u32> for ConstantValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i32> for ConstantValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<bool> for ConstantValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Tensor element type, numbered like the ONNX `TensorProto.DataType` enum.
///
/// The numeric code is what appears in program cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ElementType {
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
    BFloat16 = 16,
}

impl ElementType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Data type of a storage-buffer variable in a shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableDataType {
    Invalid,
    F32,
    Vec2F32,
    Vec4F32,
    F16,
    Vec2F16,
    Vec4F16,
    I32,
    Vec2I32,
    Vec4I32,
    U32,
    Vec2U32,
    Vec4U32,
    Int64,
    Uint64,
    Vec4Bool,
}

impl VariableDataType {
    /// Map a tensor element type to the variable type that holds
    /// `components` elements per storage slot.
    ///
    /// Unsupported combinations yield [`VariableDataType::Invalid`].
    pub fn from_element(element: ElementType, components: u32) -> Self {
        match (element, components) {
            (ElementType::Float, 1) => Self::F32,
            (ElementType::Float, 2) => Self::Vec2F32,
            (ElementType::Float, 4) => Self::Vec4F32,
            (ElementType::Float16, 1) => Self::F16,
            (ElementType::Float16, 2) => Self::Vec2F16,
            (ElementType::Float16, 4) => Self::Vec4F16,
            (ElementType::Int32, 1) => Self::I32,
            (ElementType::Int32, 2) => Self::Vec2I32,
            (ElementType::Int32, 4) => Self::Vec4I32,
            (ElementType::Uint32, 1) => Self::U32,
            (ElementType::Uint32, 2) => Self::Vec2U32,
            (ElementType::Uint32, 4) => Self::Vec4U32,
            (ElementType::Int64, 1) => Self::Int64,
            (ElementType::Uint64, 1) => Self::Uint64,
            (ElementType::Bool, 4) => Self::Vec4Bool,
            _ => Self::Invalid,
        }
    }

    /// Whether the type needs `enable f16;`.
    pub fn is_f16(self) -> bool {
        matches!(self, Self::F16 | Self::Vec2F16 | Self::Vec4F16)
    }

    /// WGSL element type of the backing `array<...>`.
    ///
    /// 64-bit integers are stored as `vec2<u32>` and four packed booleans
    /// as one `u32`. `None` for [`VariableDataType::Invalid`].
    pub fn storage_type(self) -> Option<&'static str> {
        Some(match self {
            Self::Invalid => return None,
            Self::F32 => "f32",
            Self::Vec2F32 => "vec2<f32>",
            Self::Vec4F32 => "vec4<f32>",
            Self::F16 => "f16",
            Self::Vec2F16 => "vec2<f16>",
            Self::Vec4F16 => "vec4<f16>",
            Self::I32 => "i32",
            Self::Vec2I32 => "vec2<i32>",
            Self::Vec4I32 => "vec4<i32>",
            Self::U32 => "u32",
            Self::Vec2U32 => "vec2<u32>",
            Self::Vec4U32 => "vec4<u32>",
            Self::Int64 | Self::Uint64 => "vec2<u32>",
            Self::Vec4Bool => "u32",
        })
    }
}
