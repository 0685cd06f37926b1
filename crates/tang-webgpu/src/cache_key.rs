//! Program cache keys.
//!
//! Key format:
//!
//! ```text
//! <NAME>[<HINT>]:<IS_1D>:<UNIFORMS>:<INPUTS>[:<OVERRIDES>]
//!
//! <UNIFORMS>  = <LEN_0>|<LEN_1>|...|      one `|`-terminated token per uniform,
//!                                         empty for a placeholder
//! <INPUTS>    = <INPUT_0>|<INPUT_1>|...
//! <INPUT_i>   = <ELEMENT_TYPE_OR_EMPTY>;<SHAPE_OR_RANK_OR_EMPTY>
//! <OVERRIDES> = <VALUE_0>|<VALUE_1>|...   only when overridable constants are given,
//!                                         `_` for an unset value
//! ```
//!
//! The hint is omitted with its brackets when empty. Program names cannot
//! contain `[ ] : | ;` and hints cannot contain `[ ] :`, so fields never
//! bleed into each other.

use std::fmt::Write;

use crate::program::{DependencyFlags, ProgramDescriptor};

/// Compute the cache key of a program.
///
/// Two descriptors that generate the same shader text and pipeline get the
/// same key; anything that changes the text changes the key.
pub fn program_cache_key(program: &ProgramDescriptor, is_1d_dispatch: bool) -> String {
    let mut key = String::with_capacity(64);
    key.push_str(program.name());
    if !program.cache_hint().is_empty() {
        key.push('[');
        key.push_str(program.cache_hint());
        key.push(']');
    }
    let _ = write!(key, ":{}:", u8::from(is_1d_dispatch));

    for uniform in program.uniforms() {
        if !uniform.is_empty() {
            let _ = write!(key, "{}", uniform.len());
        }
        key.push('|');
    }
    key.push(':');

    for (i, input) in program.inputs().iter().enumerate() {
        if i > 0 {
            key.push('|');
        }
        if input.dependency.contains(DependencyFlags::TYPE) {
            let _ = write!(key, "{}", input.tensor.element_type.code());
        }
        key.push(';');
        if input.dependency.contains(DependencyFlags::SHAPE) {
            let _ = write!(key, "{}", input.tensor.shape);
        } else if input.dependency.contains(DependencyFlags::RANK) {
            let _ = write!(key, "{}", input.tensor.shape.ndim());
        }
    }

    let overrides = program.overridable_constants();
    if !overrides.is_empty() {
        key.push(':');
        for (i, value) in overrides.iter().enumerate() {
            if i > 0 {
                key.push('|');
            }
            match value {
                Some(v) => {
                    let _ = write!(key, "{v}");
                }
                None => key.push('_'),
            }
        }
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ProgramBuilder, UniformValue};
    use crate::tensor::TensorMeta;
    use crate::types::{ConstantValue, ElementType, UniformDataType};

    fn base() -> ProgramBuilder {
        ProgramDescriptor::builder("Abs")
            .input(&TensorMeta::new(ElementType::Float, &[2, 3]), DependencyFlags::TYPE)
            .uniform(UniformValue::scalar("vec_size", 6u32))
            .dispatch(1)
    }

    #[test]
    fn key_format() {
        let desc = base().build().unwrap();
        assert_eq!(program_cache_key(&desc, true), "Abs:1:1|:1;");
        assert_eq!(program_cache_key(&desc, false), "Abs:0:1|:1;");

        let hinted = base().cache_hint(["a", "b"]).build().unwrap();
        assert_eq!(program_cache_key(&hinted, true), "Abs[a|b]:1:1|:1;");
    }

    #[test]
    fn rank_and_shape_dependencies() {
        let t = TensorMeta::new(ElementType::Float16, &[2, 3, 4]);
        let desc = ProgramDescriptor::builder("Op")
            .input(&t, DependencyFlags::TYPE_AND_RANK)
            .input(&t, DependencyFlags::TYPE_AND_SHAPE)
            .input(&t, DependencyFlags::RANK | DependencyFlags::SHAPE)
            .input(&t, DependencyFlags::NONE)
            .dispatch(1)
            .build()
            .unwrap();
        assert_eq!(program_cache_key(&desc, true), "Op:1::10;3|10;{2,3,4}|;{2,3,4}|;");
    }

    #[test]
    fn identical_facts_share_a_key() {
        // Shape differs but only the type is a dependency.
        let a = ProgramDescriptor::builder("Abs")
            .input(&TensorMeta::new(ElementType::Float, &[2, 3]), DependencyFlags::TYPE)
            .uniform(UniformValue::scalar("vec_size", 6u32))
            .dispatch(1)
            .build()
            .unwrap();
        let b = ProgramDescriptor::builder("Abs")
            .input(&TensorMeta::new(ElementType::Float, &[100]), DependencyFlags::TYPE)
            .uniform(UniformValue::scalar("vec_size", 100u32))
            .dispatch(7)
            .build()
            .unwrap();
        assert_eq!(program_cache_key(&a, true), program_cache_key(&b, true));
    }

    #[test]
    fn each_field_changes_the_key() {
        let base_key = program_cache_key(&base().build().unwrap(), true);

        let renamed = ProgramDescriptor::builder("Neg")
            .input(&TensorMeta::new(ElementType::Float, &[2, 3]), DependencyFlags::TYPE)
            .uniform(UniformValue::scalar("vec_size", 6u32))
            .dispatch(1)
            .build()
            .unwrap();
        let hinted = base().cache_hint(["x"]).build().unwrap();
        let wider_uniform = ProgramDescriptor::builder("Abs")
            .input(&TensorMeta::new(ElementType::Float, &[2, 3]), DependencyFlags::TYPE)
            .uniform(UniformValue::array("vec_size", &[6u32, 1]).unwrap())
            .dispatch(1)
            .build()
            .unwrap();
        let retyped = ProgramDescriptor::builder("Abs")
            .input(&TensorMeta::new(ElementType::Float16, &[2, 3]), DependencyFlags::TYPE)
            .uniform(UniformValue::scalar("vec_size", 6u32))
            .dispatch(1)
            .build()
            .unwrap();

        for other in [&renamed, &hinted, &wider_uniform, &retyped] {
            assert_ne!(program_cache_key(other, true), base_key);
        }
        assert_ne!(program_cache_key(&base().build().unwrap(), false), base_key);
    }

    #[test]
    fn empty_uniform_is_distinct_from_no_uniform() {
        let none = ProgramDescriptor::builder("Op").dispatch(1).build().unwrap();
        let placeholder = ProgramDescriptor::builder("Op")
            .uniform(UniformValue::empty("unused", UniformDataType::U32))
            .dispatch(1)
            .build()
            .unwrap();
        assert_eq!(program_cache_key(&none, true), "Op:1::");
        assert_eq!(program_cache_key(&placeholder, true), "Op:1:|:");
    }

    #[test]
    fn overridable_constant_values_in_key() {
        let a = base().overridable_constant(Some(ConstantValue::U32(2))).build().unwrap();
        let b = base().overridable_constant(Some(ConstantValue::U32(3))).build().unwrap();
        let unset = base().overridable_constant(None).build().unwrap();
        assert_eq!(program_cache_key(&a, true), "Abs:1:1|:1;:2u");
        assert_ne!(program_cache_key(&a, true), program_cache_key(&b, true));
        assert_eq!(program_cache_key(&unset, true), "Abs:1:1|:1;:_");
    }
}
