//! WGSL source generation for one program.
//!
//! A [`Program`](crate::program::Program) declares its storage variables,
//! helper code and main body on a [`ShaderHelper`]; [`ShaderHelper::finalize`]
//! then assembles the complete source in a fixed order:
//!
//! 1. `enable f16;` when any declaration uses f16
//! 2. workgroup size constant and overrides, overridable constants, constants
//! 3. storage bindings: inputs, then outputs
//! 4. the `Uniforms` struct and its binding
//! 5. helper code, in append order
//! 6. the `main` entry point

use std::fmt::Write;

use crate::device::DeviceLimits;
use crate::error::{ProgramError, Result};
use crate::program::{DispatchSize, ProgramDescriptor, ProgramMetadata, WORKGROUP_SIZE};
use crate::types::{ConstantDataType, UniformDataType, VariableDataType};
use crate::uniform::UniformRepr;

/// Entry point name of every generated shader.
pub const ENTRY_POINT: &str = "main";

/// Whether a storage variable is read or written by the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableScope {
    /// `var<storage, read>`
    Input,
    /// `var<storage, read_write>`
    Output,
}

/// A storage-buffer variable declared in a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderVariable {
    name: String,
    data_type: VariableDataType,
}

impl ShaderVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> VariableDataType {
        self.data_type
    }

    /// Expression reading the element at `offset`, unpacked to its logical type.
    pub fn get_by_offset(&self, offset: &str) -> String {
        let name = &self.name;
        match self.data_type {
            VariableDataType::Int64 => format!("i32({name}[{offset}].x)"),
            VariableDataType::Uint64 => format!("u32({name}[{offset}].x)"),
            VariableDataType::Vec4Bool => format!(
                "vec4<bool>(bool({name}[{offset}] & 0xFFu), bool({name}[{offset}] & 0xFF00u), \
                 bool({name}[{offset}] & 0xFF0000u), bool({name}[{offset}] & 0xFF000000u))"
            ),
            _ => format!("{name}[{offset}]"),
        }
    }

    /// Statement writing `value` to the element at `offset`, packed to its storage type.
    pub fn set_by_offset(&self, offset: &str, value: &str) -> String {
        let name = &self.name;
        match self.data_type {
            VariableDataType::Int64 => format!(
                "{name}[{offset}]=vec2<u32>(u32({value}), select(0u, 0xFFFFFFFFu, {value} < 0));"
            ),
            VariableDataType::Uint64 => format!("{name}[{offset}]=vec2<u32>(u32({value}), 0u);"),
            VariableDataType::Vec4Bool => format!(
                "{name}[{offset}]=dot(vec4<u32>(0x1, 0x100, 0x10000, 0x1000000), vec4<u32>({value}));"
            ),
            _ => format!("{name}[{offset}]={value};"),
        }
    }

    fn storage_type(&self) -> &'static str {
        // Invalid types are rejected by `ShaderHelper::add_variable`.
        self.data_type.storage_type().unwrap_or("u32")
    }
}

/// Output of shader generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedShader {
    pub source: String,
    pub workgroup_size: [u32; 3],
    /// Pipeline-creation values for every `override` in the source.
    pub constants: Vec<(String, f64)>,
}

/// Collects the pieces of a shader while a program generates its code.
pub struct ShaderHelper<'a> {
    program: &'a ProgramDescriptor,
    metadata: ProgramMetadata<'a>,
    limits: &'a DeviceLimits,
    dispatch: DispatchSize,
    inputs: Vec<ShaderVariable>,
    outputs: Vec<ShaderVariable>,
    implementation: Vec<String>,
    body: Option<String>,
    workgroup_size: [u32; 3],
    use_f16: bool,
}

impl<'a> ShaderHelper<'a> {
    /// `dispatch` is the normalized dispatch size the program will run with.
    pub fn new(
        program: &'a ProgramDescriptor,
        metadata: ProgramMetadata<'a>,
        limits: &'a DeviceLimits,
        dispatch: DispatchSize,
    ) -> Result<Self> {
        if dispatch.x == 0 || dispatch.y == 0 || dispatch.z == 0 {
            return Err(ProgramError::InvalidDescriptor(format!(
                "invalid dispatch group size {dispatch} for program {}",
                program.name()
            )));
        }
        Ok(Self {
            program,
            metadata,
            limits,
            dispatch,
            inputs: Vec::new(),
            outputs: Vec::new(),
            implementation: Vec::new(),
            body: None,
            workgroup_size: [WORKGROUP_SIZE, 1, 1],
            use_f16: false,
        })
    }

    pub fn program(&self) -> &'a ProgramDescriptor {
        self.program
    }

    pub fn limits(&self) -> &'a DeviceLimits {
        self.limits
    }

    pub fn dispatch(&self) -> DispatchSize {
        self.dispatch
    }

    /// Declare a storage buffer variable. Bindings are assigned in
    /// declaration order, all inputs before all outputs.
    pub fn add_variable(
        &mut self,
        scope: VariableScope,
        name: &str,
        data_type: VariableDataType,
    ) -> Result<ShaderVariable> {
        if data_type == VariableDataType::Invalid {
            return Err(ProgramError::InvalidDescriptor(format!(
                "invalid type for variable {name} of program {}",
                self.program.name()
            )));
        }
        let max = self.limits.max_storage_buffers_per_shader_stage;
        if self.inputs.len() + self.outputs.len() >= max as usize {
            return Err(ProgramError::TooManyStorageBuffers { max });
        }
        if data_type.is_f16() {
            self.use_f16 = true;
        }

        let var = ShaderVariable {
            name: name.to_string(),
            data_type,
        };
        match scope {
            VariableScope::Input => self.inputs.push(var.clone()),
            VariableScope::Output => self.outputs.push(var.clone()),
        }
        Ok(var)
    }

    pub fn add_input(&mut self, name: &str, data_type: VariableDataType) -> Result<ShaderVariable> {
        self.add_variable(VariableScope::Input, name, data_type)
    }

    pub fn add_output(&mut self, name: &str, data_type: VariableDataType) -> Result<ShaderVariable> {
        self.add_variable(VariableScope::Output, name, data_type)
    }

    /// Append helper functions placed before the entry point.
    pub fn append_implementation(&mut self, code: impl Into<String>) {
        self.implementation.push(code.into());
    }

    /// Set the main function body with the default workgroup size
    /// `(WORKGROUP_SIZE, 1, 1)`.
    pub fn main_function_body(&mut self, body: &str) -> Result<()> {
        self.main_function_body_with_workgroup_size([WORKGROUP_SIZE, 1, 1], body)
    }

    /// Set the main function body. `global_idx` and `local_idx` are in
    /// scope for `body`.
    pub fn main_function_body_with_workgroup_size(
        &mut self,
        workgroup_size: [u32; 3],
        body: &str,
    ) -> Result<()> {
        if self.body.is_some() {
            return Err(ProgramError::ShaderGeneration(format!(
                "main function body of program {} has already been set",
                self.program.name()
            )));
        }
        self.check_workgroup_size(workgroup_size)?;
        self.workgroup_size = workgroup_size;

        let [_, y, z] = workgroup_size;
        let linear = self.dispatch.is_1d() && y == 1 && z == 1;

        let mut src = String::with_capacity(512 + body.len());
        src.push_str(
            "@compute @workgroup_size(workgroup_size_x, workgroup_size_y, workgroup_size_z)\n\
             fn main(@builtin(global_invocation_id) global_id : vec3<u32>,\n        \
             @builtin(workgroup_id) workgroup_id : vec3<u32>,\n        \
             @builtin(local_invocation_id) local_id : vec3<u32>",
        );
        if !linear {
            src.push_str(
                ",\n        @builtin(local_invocation_index) local_idx : u32,\n        \
                 @builtin(num_workgroups) num_workgroups : vec3<u32>",
            );
        }
        src.push_str(") {\n");
        if linear {
            src.push_str("  let global_idx = global_id.x;\n  let local_idx = local_id.x;\n");
        } else {
            src.push_str(
                "  let global_idx = (workgroup_id.z * num_workgroups.x * num_workgroups.y \
                 + workgroup_id.y * num_workgroups.x + workgroup_id.x)\n                     \
                 * (workgroup_size_x * workgroup_size_y * workgroup_size_z) + local_idx;\n",
            );
        }
        src.push_str(body);
        src.push_str("\n}\n");

        self.body = Some(src);
        Ok(())
    }

    /// Statement returning early for invocations past `size`.
    ///
    /// Callers put this first in the body when the invocation count is not
    /// a multiple of the workgroup volume.
    pub fn guard_against_out_of_bounds(&self, size: &str) -> String {
        format!("  if (global_idx >= {size}) {{ return; }}\n")
    }

    fn check_workgroup_size(&self, size: [u32; 3]) -> Result<()> {
        let [x, y, z] = size;
        if x == 0 || y == 0 || z == 0 {
            return Err(ProgramError::InvalidWorkgroupSize { x, y, z });
        }
        let max = [
            self.limits.max_compute_workgroup_size_x,
            self.limits.max_compute_workgroup_size_y,
            self.limits.max_compute_workgroup_size_z,
        ];
        if x > max[0] || y > max[1] || z > max[2] {
            return Err(ProgramError::WorkgroupSizeExceedsLimit { size, max });
        }
        let invocations = x as u64 * y as u64 * z as u64;
        let max_invocations = self.limits.max_compute_invocations_per_workgroup;
        if invocations > max_invocations as u64 {
            return Err(ProgramError::TooManyInvocations {
                invocations,
                max: max_invocations,
            });
        }
        Ok(())
    }

    fn uses_f16(&self) -> bool {
        self.use_f16
            || self
                .program
                .uniforms()
                .iter()
                .any(|u| !u.is_empty() && u.data_type() == UniformDataType::F16)
            || self.metadata.constants.iter().any(|c| c.value.data_type() == ConstantDataType::F16)
            || self
                .metadata
                .overridable_constants
                .iter()
                .any(|c| c.data_type == ConstantDataType::F16)
    }

    /// Assemble the final source code.
    pub fn finalize(self) -> Result<GeneratedShader> {
        let name = self.program.name();
        let Some(body) = self.body.as_deref() else {
            return Err(ProgramError::ShaderGeneration(format!(
                "program {name} did not set a main function body"
            )));
        };
        let overrides = self.metadata.resolve_overridable_constants(self.program)?;
        let non_finite = self
            .metadata
            .constants
            .iter()
            .map(|c| (c.name, Some(c.value)))
            .chain(self.metadata.overridable_constants.iter().map(|d| (d.name, d.default)))
            .find(|(_, v)| v.is_some_and(|v| !v.is_finite()));
        if let Some((constant, _)) = non_finite {
            return Err(ProgramError::InvalidDescriptor(format!(
                "constant {constant} of program {name} has no WGSL literal"
            )));
        }

        let mut src = String::with_capacity(2048);

        // Feature enabling
        if self.uses_f16() {
            if !self.limits.shader_f16 {
                return Err(ProgramError::UnsupportedFeature {
                    program: name.to_string(),
                    feature: "f16",
                });
            }
            src.push_str("enable f16;\n\n");
        }

        // Constants
        let _ = writeln!(src, "const WORKGROUP_SIZE: u32 = {WORKGROUP_SIZE};");
        src.push_str(
            "override workgroup_size_x: u32 = WORKGROUP_SIZE;\n\
             override workgroup_size_y: u32 = 1;\n\
             override workgroup_size_z: u32 = 1;\n",
        );
        for def in self.metadata.overridable_constants {
            let _ = write!(src, "override {}: {}", def.name, def.data_type.wgsl());
            if let Some(default) = def.default {
                let _ = write!(src, " = {default}");
            }
            src.push_str(";\n");
        }
        for c in self.metadata.constants {
            let _ = writeln!(
                src,
                "const {}: {} = {};",
                c.name,
                c.value.data_type().wgsl(),
                c.value
            );
        }
        src.push('\n');

        // Storage bindings
        let mut binding = 0u32;
        for var in &self.inputs {
            let _ = writeln!(
                src,
                "@group(0) @binding({binding}) var<storage, read> {}: array<{}>;",
                var.name,
                var.storage_type()
            );
            binding += 1;
        }
        for var in &self.outputs {
            let _ = writeln!(
                src,
                "@group(0) @binding({binding}) var<storage, read_write> {}: array<{}>;",
                var.name,
                var.storage_type()
            );
            binding += 1;
        }

        // Uniforms
        let fields: Vec<String> = self
            .program
            .uniforms()
            .iter()
            .filter_map(|u| {
                let ty = u.data_type().wgsl();
                let decl = match UniformRepr::of(u.data_type(), u.len()) {
                    UniformRepr::Omitted => return None,
                    UniformRepr::Scalar => ty.to_string(),
                    UniformRepr::Vector(n) => format!("vec{n}<{ty}>"),
                    UniformRepr::Array(n) if u.data_type() == UniformDataType::F16 => {
                        return Some(format!("  @align(16) {}: array<mat2x4<{ty}>, {n}>", u.name()));
                    }
                    UniformRepr::Array(n) => format!("array<vec4<{ty}>, {n}>"),
                };
                Some(format!("  {}: {decl}", u.name()))
            })
            .collect();
        if !fields.is_empty() {
            src.push_str("struct Uniforms {\n");
            src.push_str(&fields.join(",\n"));
            src.push_str("\n};\n");
            let _ = writeln!(src, "@group(0) @binding({binding}) var<uniform> uniforms: Uniforms;");
        }
        src.push('\n');

        // Helper code
        for imp in &self.implementation {
            src.push_str(imp);
            src.push('\n');
        }

        // Entry point
        src.push_str(body);

        let [x, y, z] = self.workgroup_size;
        let mut constants = vec![
            ("workgroup_size_x".to_string(), x as f64),
            ("workgroup_size_y".to_string(), y as f64),
            ("workgroup_size_z".to_string(), z as f64),
        ];
        constants.extend(overrides.into_iter().map(|(n, v)| (n.to_string(), v.as_f64())));

        Ok(GeneratedShader {
            source: src,
            workgroup_size: self.workgroup_size,
            constants,
        })
    }
}
