//! Program descriptors: what a kernel asks the GPU to run.
//!
//! A kernel builds one [`ProgramDescriptor`] per invocation through
//! [`ProgramBuilder`], and implements [`Program`] once per kernel family to
//! generate the shader code and declare its constants and uniforms.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::error::{ProgramError, Result};
use crate::shader::ShaderHelper;
use crate::tensor::{TensorInfo, TensorMeta};
use crate::types::{ConstantDataType, ConstantValue, UniformDataType};

/// Default workgroup size along x.
pub const WORKGROUP_SIZE: u32 = 64;

/// Which facts about an input tensor the generated shader depends on.
///
/// Only the selected facts participate in the program cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct DependencyFlags(u8);

impl DependencyFlags {
    pub const NONE: Self = Self(0);
    pub const TYPE: Self = Self(1);
    pub const RANK: Self = Self(2);
    pub const SHAPE: Self = Self(4);
    pub const TYPE_AND_RANK: Self = Self(1 | 2);
    pub const TYPE_AND_SHAPE: Self = Self(1 | 4);

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DependencyFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DependencyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DependencyFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// An input tensor and the facts the shader depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInput {
    pub tensor: TensorMeta,
    pub dependency: DependencyFlags,
}

/// Scalars that can be passed as uniforms.
pub trait UniformScalar: bytemuck::Pod {
    const DATA_TYPE: UniformDataType;
}

impl UniformScalar for f32 {
    const DATA_TYPE: UniformDataType = UniformDataType::F32;
}

impl UniformScalar for half::f16 {
    const DATA_TYPE: UniformDataType = UniformDataType::F16;
}

impl UniformScalar for u32 {
    const DATA_TYPE: UniformDataType = UniformDataType::U32;
}

impl UniformScalar for i32 {
    const DATA_TYPE: UniformDataType = UniformDataType::I32;
}

/// Runtime value of a uniform variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformValue {
    name: String,
    data_type: UniformDataType,
    length: usize,
    data: Vec<u8>,
}

impl UniformValue {
    /// A single scalar.
    pub fn scalar<T: UniformScalar>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            data_type: T::DATA_TYPE,
            length: 1,
            data: bytemuck::bytes_of(&value).to_vec(),
        }
    }

    /// A vector or array of scalars. Zero-length arrays are rejected.
    pub fn array<T: UniformScalar>(name: impl Into<String>, values: &[T]) -> Result<Self> {
        let name = name.into();
        if values.is_empty() {
            return Err(ProgramError::InvalidDescriptor(format!(
                "uniform {name} has zero elements"
            )));
        }
        Ok(Self {
            name,
            data_type: T::DATA_TYPE,
            length: values.len(),
            data: bytemuck::cast_slice(values).to_vec(),
        })
    }

    /// A placeholder that keeps its position but occupies no storage.
    pub fn empty(name: impl Into<String>, data_type: UniformDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            length: 0,
            data: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> UniformDataType {
        self.data_type
    }

    /// Number of scalar elements; 0 for a placeholder.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Raw little-endian bytes, `len() * data_type().size()` long.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Number of workgroups to dispatch along each dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DispatchSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Whether only the x dimension is used.
    pub fn is_1d(self) -> bool {
        self.y == 1 && self.z == 1
    }

    /// Total number of workgroups.
    pub fn total(self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    pub fn as_array(self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for DispatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// An immutable description of one kernel invocation.
///
/// Only [`ProgramBuilder::build`] creates descriptors, so every descriptor
/// has a valid name, at least one workgroup in each dispatch dimension, and
/// no zero-length uniforms other than explicit placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDescriptor {
    name: String,
    cache_hint: String,
    inputs: Vec<ProgramInput>,
    outputs: Vec<TensorMeta>,
    uniforms: Vec<UniformValue>,
    overridable_constants: Vec<Option<ConstantValue>>,
    dispatch: DispatchSize,
}

impl ProgramDescriptor {
    pub fn builder(name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_hint(&self) -> &str {
        &self.cache_hint
    }

    pub fn inputs(&self) -> &[ProgramInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorMeta] {
        &self.outputs
    }

    pub fn uniforms(&self) -> &[UniformValue] {
        &self.uniforms
    }

    /// Overridable constant values; `None` keeps the declared default.
    pub fn overridable_constants(&self) -> &[Option<ConstantValue>] {
        &self.overridable_constants
    }

    /// Requested dispatch size, before normalization to device limits.
    pub fn dispatch(&self) -> DispatchSize {
        self.dispatch
    }
}

/// Characters that separate cache-key fields.
const NAME_RESERVED: &[char] = &['[', ']', ':', '|', ';'];
const HINT_RESERVED: &[char] = &['[', ']', ':'];

/// Accumulates the fields of a [`ProgramDescriptor`].
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    name: String,
    cache_hint: String,
    inputs: Vec<ProgramInput>,
    outputs: Vec<TensorMeta>,
    uniforms: Vec<UniformValue>,
    overridable_constants: Vec<Option<ConstantValue>>,
    dispatch: Option<DispatchSize>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_hint: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            uniforms: Vec::new(),
            overridable_constants: Vec::new(),
            dispatch: None,
        }
    }

    /// Set the cache hint from parts joined with `|`.
    pub fn cache_hint<I>(mut self, parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        self.cache_hint = parts
            .into_iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("|");
        self
    }

    pub fn input(mut self, tensor: &(impl TensorInfo + ?Sized), dependency: DependencyFlags) -> Self {
        self.inputs.push(ProgramInput {
            tensor: TensorMeta::of(tensor),
            dependency,
        });
        self
    }

    pub fn output(mut self, tensor: &(impl TensorInfo + ?Sized)) -> Self {
        self.outputs.push(TensorMeta::of(tensor));
        self
    }

    pub fn uniform(mut self, value: UniformValue) -> Self {
        self.uniforms.push(value);
        self
    }

    pub fn uniforms(mut self, values: impl IntoIterator<Item = UniformValue>) -> Self {
        self.uniforms.extend(values);
        self
    }

    /// Append an overridable constant value; `None` keeps the default.
    pub fn overridable_constant(mut self, value: Option<ConstantValue>) -> Self {
        self.overridable_constants.push(value);
        self
    }

    pub fn dispatch(self, x: u32) -> Self {
        self.dispatch_3d(x, 1, 1)
    }

    pub fn dispatch_2d(self, x: u32, y: u32) -> Self {
        self.dispatch_3d(x, y, 1)
    }

    pub fn dispatch_3d(mut self, x: u32, y: u32, z: u32) -> Self {
        self.dispatch = Some(DispatchSize::new(x, y, z));
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> Result<ProgramDescriptor> {
        let invalid =
            |msg: String| -> Result<ProgramDescriptor> { Err(ProgramError::InvalidDescriptor(msg)) };

        if self.name.is_empty() {
            return invalid("program name is empty".into());
        }
        if self.name.contains(NAME_RESERVED) {
            return invalid(format!("program name {:?} contains a reserved character", self.name));
        }
        if self.cache_hint.contains(HINT_RESERVED) {
            return invalid(format!(
                "cache hint {:?} of program {} contains a reserved character",
                self.cache_hint, self.name
            ));
        }

        let Some(dispatch) = self.dispatch else {
            return invalid(format!("program {} has no dispatch size", self.name));
        };
        if dispatch.x == 0 || dispatch.y == 0 || dispatch.z == 0 {
            return invalid(format!(
                "program {} has an empty dispatch size {dispatch}",
                self.name
            ));
        }

        for u in &self.uniforms {
            if u.data.len() != u.length * u.data_type.size() {
                return invalid(format!(
                    "uniform {} carries {} bytes for {} {} elements",
                    u.name,
                    u.data.len(),
                    u.length,
                    u.data_type.wgsl()
                ));
            }
        }

        Ok(ProgramDescriptor {
            name: self.name,
            cache_hint: self.cache_hint,
            inputs: self.inputs,
            outputs: self.outputs,
            uniforms: self.uniforms,
            overridable_constants: self.overridable_constants,
            dispatch,
        })
    }
}

/// A named compile-time constant, emitted as `const name: type = value;`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramConstant {
    pub name: &'static str,
    pub value: ConstantValue,
}

/// Declaration of an overridable constant, with or without a default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverridableConstantDefinition {
    pub name: &'static str,
    pub data_type: ConstantDataType,
    pub default: Option<ConstantValue>,
}

impl OverridableConstantDefinition {
    /// A constant every descriptor must supply a value for.
    pub const fn required(name: &'static str, data_type: ConstantDataType) -> Self {
        Self {
            name,
            data_type,
            default: None,
        }
    }

    pub const fn with_default(name: &'static str, value: ConstantValue) -> Self {
        let data_type = match value {
            ConstantValue::F32(_) => ConstantDataType::F32,
            ConstantValue::F16(_) => ConstantDataType::F16,
            ConstantValue::U32(_) => ConstantDataType::U32,
            ConstantValue::I32(_) => ConstantDataType::I32,
            ConstantValue::Bool(_) => ConstantDataType::Bool,
        };
        Self {
            name,
            data_type,
            default: Some(value),
        }
    }
}

/// Declaration of a uniform variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDefinition {
    pub name: &'static str,
    pub data_type: UniformDataType,
}

/// Everything a kernel family declares about its shader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramMetadata<'a> {
    pub constants: &'a [ProgramConstant],
    pub overridable_constants: &'a [OverridableConstantDefinition],
    pub uniform_variables: &'a [UniformDefinition],
}

impl ProgramMetadata<'_> {
    /// Check the descriptor's uniforms against the declared uniforms.
    ///
    /// The cache key only records uniform lengths, so names and types must
    /// come from the kernel's declaration. A kernel that declares no
    /// uniforms accepts only placeholders.
    pub fn check_uniforms(&self, descriptor: &ProgramDescriptor) -> Result<()> {
        if self.uniform_variables.is_empty() {
            return match descriptor.uniforms().iter().find(|u| !u.is_empty()) {
                Some(u) => Err(ProgramError::InvalidDescriptor(format!(
                    "program {} declares no uniforms but was given uniform {}",
                    descriptor.name(),
                    u.name()
                ))),
                None => Ok(()),
            };
        }
        let values = descriptor.uniforms();
        if values.len() != self.uniform_variables.len() {
            return Err(ProgramError::InvalidDescriptor(format!(
                "program {} declares {} uniforms but {} were given",
                descriptor.name(),
                self.uniform_variables.len(),
                values.len()
            )));
        }
        for (def, value) in self.uniform_variables.iter().zip(values) {
            if def.name != value.name() || def.data_type != value.data_type() {
                return Err(ProgramError::InvalidDescriptor(format!(
                    "program {} expects uniform {}: {}, got {}: {}",
                    descriptor.name(),
                    def.name,
                    def.data_type.wgsl(),
                    value.name(),
                    value.data_type().wgsl()
                )));
            }
        }
        Ok(())
    }

    /// Pair every overridable constant definition with its effective value.
    pub fn resolve_overridable_constants(
        &self,
        descriptor: &ProgramDescriptor,
    ) -> Result<Vec<(&'static str, ConstantValue)>> {
        let values = descriptor.overridable_constants();
        if values.len() > self.overridable_constants.len() {
            return Err(ProgramError::InvalidDescriptor(format!(
                "program {} declares {} overridable constants but {} values were given",
                descriptor.name(),
                self.overridable_constants.len(),
                values.len()
            )));
        }

        self.overridable_constants
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let value = values.get(i).copied().flatten().or(def.default).ok_or_else(|| {
                    ProgramError::InvalidDescriptor(format!(
                        "overridable constant {} of program {} has no value",
                        def.name,
                        descriptor.name()
                    ))
                })?;
                if value.data_type() != def.data_type {
                    return Err(ProgramError::InvalidDescriptor(format!(
                        "overridable constant {} is {} but the value is {}",
                        def.name,
                        def.data_type.wgsl(),
                        value.data_type().wgsl()
                    )));
                }
                if !value.is_finite() {
                    return Err(ProgramError::InvalidDescriptor(format!(
                        "overridable constant {} of program {} is not finite: {value:?}",
                        def.name,
                        descriptor.name()
                    )));
                }
                Ok((def.name, value))
            })
            .collect()
    }
}

/// A kernel family: declares its metadata and writes its shader.
///
/// Metadata methods default to empty, so a kernel only overrides what it
/// actually declares.
pub trait Program {
    fn constants(&self) -> &[ProgramConstant] {
        &[]
    }

    fn overridable_constants(&self) -> &[OverridableConstantDefinition] {
        &[]
    }

    fn uniform_variables(&self) -> &[UniformDefinition] {
        &[]
    }

    /// Declare variables, helper code and the main body on `sh`.
    fn generate_shader_code(&self, sh: &mut ShaderHelper<'_>) -> Result<()>;

    fn metadata(&self) -> ProgramMetadata<'_> {
        ProgramMetadata {
            constants: self.constants(),
            overridable_constants: self.overridable_constants(),
            uniform_variables: self.uniform_variables(),
        }
    }
}
