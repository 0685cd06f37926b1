//! Elementwise unary operators.
//!
//! Input and output are processed four elements at a time as `vec4`, so
//! the expression sees `a` as a vector and must be valid WGSL for one.

use std::borrow::Cow;

use crate::error::{ProgramError, Result};
use crate::program::{
    DependencyFlags, Program, ProgramDescriptor, UniformDefinition, UniformValue, WORKGROUP_SIZE,
};
use crate::shader::ShaderHelper;
use crate::tensor::TensorInfo;
use crate::types::{UniformDataType, VariableDataType};

const UNIFORMS: &[UniformDefinition] = &[UniformDefinition {
    name: "vec_size",
    data_type: UniformDataType::U32,
}];

/// `y = f(x)` applied elementwise, with `f` given as a WGSL expression of `a`.
#[derive(Debug, Clone)]
pub struct UnaryElementwise {
    name: Cow<'static, str>,
    expression: Cow<'static, str>,
    additional_impl: Cow<'static, str>,
}

impl UnaryElementwise {
    pub fn new(name: impl Into<Cow<'static, str>>, expression: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            additional_impl: Cow::Borrowed(""),
        }
    }

    /// Helper functions the expression calls.
    pub fn with_impl(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.additional_impl = code.into();
        self
    }

    pub fn abs() -> Self {
        Self::new("Abs", "abs(a)")
    }

    pub fn neg() -> Self {
        Self::new("Neg", "-a")
    }

    pub fn floor() -> Self {
        Self::new("Floor", "floor(a)")
    }

    pub fn ceil() -> Self {
        Self::new("Ceil", "ceil(a)")
    }

    pub fn exp() -> Self {
        Self::new("Exp", "exp(a)")
    }

    pub fn sqrt() -> Self {
        Self::new("Sqrt", "sqrt(a)")
    }

    pub fn sigmoid() -> Self {
        Self::new("Sigmoid", "sigmoid_v(a)").with_impl(
            "fn sigmoid_v(v: vec4<x_element_t>) -> vec4<x_element_t> {\n  \
             return 1.0 / (1.0 + exp(-v));\n}\n",
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the descriptor for running this operator on `input`.
    ///
    /// One invocation handles one `vec4`, so the dispatch covers
    /// `ceil(numel / 4)` invocations.
    pub fn descriptor(
        &self,
        input: &(impl TensorInfo + ?Sized),
        output: &(impl TensorInfo + ?Sized),
    ) -> Result<ProgramDescriptor> {
        let vec_size = u32::try_from(input.shape().numel().div_ceil(4)).map_err(|_| {
            ProgramError::InvalidDescriptor(format!(
                "{} input has {} elements, too many for one dispatch",
                self.name,
                input.shape().numel()
            ))
        })?;
        ProgramDescriptor::builder(&*self.name)
            .input(input, DependencyFlags::TYPE)
            .output(output)
            .uniform(UniformValue::scalar("vec_size", vec_size))
            .dispatch(vec_size.div_ceil(WORKGROUP_SIZE).max(1))
            .build()
    }
}

impl Program for UnaryElementwise {
    fn uniform_variables(&self) -> &[UniformDefinition] {
        UNIFORMS
    }

    fn generate_shader_code(&self, sh: &mut ShaderHelper<'_>) -> Result<()> {
        let desc = sh.program();
        let (Some(input), Some(output)) = (desc.inputs().first(), desc.outputs().first()) else {
            return Err(ProgramError::InvalidDescriptor(format!(
                "{} needs one input and one output",
                desc.name()
            )));
        };

        let x = sh.add_input("x", VariableDataType::from_element(input.tensor.element_type, 4))?;
        let y = sh.add_output("y", VariableDataType::from_element(output.element_type, 4))?;
        if !self.additional_impl.is_empty() {
            sh.append_implementation(self.additional_impl.replace("x_element_t", element_wgsl(x.data_type())));
        }

        let body = format!(
            "{}  let a = {};\n  {}",
            sh.guard_against_out_of_bounds("uniforms.vec_size"),
            x.get_by_offset("global_idx"),
            y.set_by_offset("global_idx", &self.expression)
        );
        sh.main_function_body(&body)
    }
}

fn element_wgsl(data_type: VariableDataType) -> &'static str {
    match data_type {
        VariableDataType::Vec4F16 => "f16",
        VariableDataType::Vec4I32 => "i32",
        VariableDataType::Vec4U32 => "u32",
        _ => "f32",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceLimits;
    use crate::program::DispatchSize;
    use crate::tensor::TensorMeta;
    use crate::types::ElementType;

    fn generate(op: &UnaryElementwise, desc: &ProgramDescriptor, limits: &DeviceLimits) -> Result<String> {
        let mut sh = ShaderHelper::new(desc, op.metadata(), limits, desc.dispatch())?;
        op.generate_shader_code(&mut sh)?;
        Ok(sh.finalize()?.source)
    }

    #[test]
    fn descriptor_sizes() {
        let t = TensorMeta::new(ElementType::Float, &[100]);
        let desc = UnaryElementwise::abs().descriptor(&t, &t).unwrap();
        assert_eq!(desc.name(), "Abs");
        assert_eq!(desc.uniforms()[0].bytes(), &25u32.to_le_bytes());
        assert_eq!(desc.dispatch(), DispatchSize::new(1, 1, 1));

        let big = TensorMeta::new(ElementType::Float, &[1024, 1024]);
        let desc = UnaryElementwise::abs().descriptor(&big, &big).unwrap();
        assert_eq!(desc.dispatch(), DispatchSize::new(4096, 1, 1));

        let empty = TensorMeta::new(ElementType::Float, &[0]);
        let desc = UnaryElementwise::abs().descriptor(&empty, &empty).unwrap();
        assert_eq!(desc.dispatch(), DispatchSize::new(1, 1, 1));
    }

    #[test]
    fn abs_shader() {
        let t = TensorMeta::new(ElementType::Float, &[2, 3]);
        let op = UnaryElementwise::abs();
        let desc = op.descriptor(&t, &t).unwrap();
        let src = generate(&op, &desc, &DeviceLimits::default()).unwrap();
        assert!(src.contains("@group(0) @binding(0) var<storage, read> x: array<vec4<f32>>;"));
        assert!(src.contains("@group(0) @binding(1) var<storage, read_write> y: array<vec4<f32>>;"));
        assert!(src.contains("struct Uniforms {\n  vec_size: u32\n};"));
        assert!(src.contains(
            "  if (global_idx >= uniforms.vec_size) { return; }\n  \
             let a = x[global_idx];\n  y[global_idx]=abs(a);\n}\n"
        ));
    }

    #[test]
    fn helper_impl_is_typed() {
        let t = TensorMeta::new(ElementType::Float16, &[8]);
        let op = UnaryElementwise::sigmoid();
        let desc = op.descriptor(&t, &t).unwrap();
        let limits = DeviceLimits {
            shader_f16: true,
            ..DeviceLimits::default()
        };
        let src = generate(&op, &desc, &limits).unwrap();
        assert!(src.starts_with("enable f16;"));
        assert!(src.contains("fn sigmoid_v(v: vec4<f16>) -> vec4<f16>"));
        assert!(src.contains("y[global_idx]=sigmoid_v(a);"));

        assert!(matches!(
            generate(&op, &desc, &DeviceLimits::default()),
            Err(ProgramError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn unsupported_element_type() {
        let t = TensorMeta::new(ElementType::Double, &[4]);
        let op = UnaryElementwise::neg();
        let desc = op.descriptor(&t, &t).unwrap();
        assert!(matches!(
            generate(&op, &desc, &DeviceLimits::default()),
            Err(ProgramError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn missing_output() {
        let t = TensorMeta::new(ElementType::Float, &[4]);
        let desc = ProgramDescriptor::builder("Neg")
            .input(&t, DependencyFlags::TYPE)
            .uniform(UniformValue::scalar("vec_size", 1u32))
            .dispatch(1)
            .build()
            .unwrap();
        assert!(generate(&UnaryElementwise::neg(), &desc, &DeviceLimits::default()).is_err());
    }
}
