//! Uniform buffer layout, following the WGSL alignment and size rules.
//!
//! See <https://www.w3.org/TR/WGSL/#alignment-and-size>. Uniforms longer than
//! four elements are declared as arrays of 16-byte groups: `vec4<T>` for
//! 32-bit types and `mat2x4<f16>` (eight halves) for f16.

use crate::error::{ProgramError, Result};
use crate::program::UniformValue;
use crate::types::UniformDataType;

/// Alignment of the uniform struct, and of every array-typed member.
pub const UNIFORM_STRUCT_ALIGN: usize = 16;

/// Where one uniform lives in the uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayoutEntry {
    pub data_type: UniformDataType,
    pub offset: usize,
    pub length: usize,
}

/// How a uniform of a given type and length is declared in WGSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformRepr {
    /// Zero-length placeholder: no struct member.
    Omitted,
    Scalar,
    /// `vecN<T>`, N in 2..=4.
    Vector(usize),
    /// `array<vec4<T>, N>` or `array<mat2x4<f16>, N>`.
    Array(usize),
}

impl UniformRepr {
    pub fn of(data_type: UniformDataType, length: usize) -> Self {
        match length {
            0 => Self::Omitted,
            1 => Self::Scalar,
            2..=4 => Self::Vector(length),
            _ => Self::Array(length.div_ceil(elements_per_group(data_type))),
        }
    }
}

fn elements_per_group(data_type: UniformDataType) -> usize {
    match data_type {
        UniformDataType::F16 => 8,
        _ => 4,
    }
}

/// WGSL `AlignOf` for a uniform of `length` elements.
pub fn uniform_alignment(data_type: UniformDataType, length: usize) -> usize {
    let size = data_type.size();
    match (data_type, length) {
        (_, 0) => 1,
        (UniformDataType::F16, 1..=2) => length * size,
        (UniformDataType::F16, 3..=4) => 8,
        (_, 1..=2) => length * size,
        _ => UNIFORM_STRUCT_ALIGN,
    }
}

/// WGSL `SizeOf` for a uniform of `length` elements.
pub fn uniform_size(data_type: UniformDataType, length: usize) -> usize {
    match UniformRepr::of(data_type, length) {
        UniformRepr::Array(groups) => groups * 16,
        _ => length * data_type.size(),
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Offsets of every uniform plus the total buffer size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UniformLayout {
    pub entries: Vec<UniformLayoutEntry>,
    pub total_size: usize,
}

impl UniformLayout {
    /// Lay out uniforms in declaration order.
    pub fn compute(uniforms: &[UniformValue]) -> Self {
        let mut offset = 0usize;
        let mut entries = Vec::with_capacity(uniforms.len());
        for u in uniforms {
            let (ty, len) = (u.data_type(), u.len());
            offset = round_up(offset, uniform_alignment(ty, len));
            entries.push(UniformLayoutEntry {
                data_type: ty,
                offset,
                length: len,
            });
            offset += uniform_size(ty, len);
        }
        Self {
            entries,
            total_size: round_up(offset, UNIFORM_STRUCT_ALIGN),
        }
    }

    /// Write each uniform's bytes at its offset into a zeroed buffer.
    ///
    /// `uniforms` must match the layout entry for entry in type and length.
    pub fn pack(&self, uniforms: &[UniformValue]) -> Result<Vec<u8>> {
        if uniforms.len() != self.entries.len() {
            return Err(ProgramError::InvalidDescriptor(format!(
                "uniform layout has {} entries but {} values were given",
                self.entries.len(),
                uniforms.len()
            )));
        }
        let mut buf = vec![0u8; self.total_size];
        for (entry, u) in self.entries.iter().zip(uniforms) {
            if entry.data_type != u.data_type() || entry.length != u.len() {
                return Err(ProgramError::InvalidDescriptor(format!(
                    "uniform {} is {} x {} but the layout expects {} x {}",
                    u.name(),
                    u.len(),
                    u.data_type().wgsl(),
                    entry.length,
                    entry.data_type.wgsl()
                )));
            }
            let bytes = u.bytes();
            buf[entry.offset..entry.offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn offsets(layout: &UniformLayout) -> Vec<usize> {
        layout.entries.iter().map(|e| e.offset).collect()
    }

    #[test]
    fn five_floats_become_two_vec4() {
        let u = UniformValue::array("v", &[1.0f32, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(UniformRepr::of(u.data_type(), u.len()), UniformRepr::Array(2));
        assert_eq!(uniform_alignment(UniformDataType::F32, 5), 16);
        assert_eq!(uniform_size(UniformDataType::F32, 5), 32);
        let layout = UniformLayout::compute(&[u]);
        assert_eq!(offsets(&layout), vec![0]);
        assert_eq!(layout.total_size, 32);
    }

    #[test]
    fn scalars_pack_tightly() {
        let layout = UniformLayout::compute(&[
            UniformValue::scalar("a", 1u32),
            UniformValue::scalar("b", 2.0f32),
            UniformValue::scalar("c", -1i32),
        ]);
        assert_eq!(offsets(&layout), vec![0, 4, 8]);
        assert_eq!(layout.total_size, 16);
    }

    #[test]
    fn vectors_align() {
        let layout = UniformLayout::compute(&[
            UniformValue::scalar("a", 1u32),
            UniformValue::array("b", &[1u32, 2]).unwrap(),
            UniformValue::array("c", &[1u32, 2, 3]).unwrap(),
            UniformValue::scalar("d", 7u32),
        ]);
        // vec2 at 8, vec3 at 16 (12 bytes), scalar fills the vec3 tail.
        assert_eq!(offsets(&layout), vec![0, 8, 16, 28]);
        assert_eq!(layout.total_size, 32);
    }

    #[test]
    fn arrays_after_scalars_start_on_16() {
        let layout = UniformLayout::compute(&[
            UniformValue::scalar("n", 3u32),
            UniformValue::array("shape", &[1u32, 2, 3, 4, 5, 6]).unwrap(),
        ]);
        assert_eq!(offsets(&layout), vec![0, 16]);
        assert_eq!(layout.total_size, 48);
    }

    #[test]
    fn f16_rules() {
        let h = |v: f32| f16::from_f32(v);
        assert_eq!(uniform_alignment(UniformDataType::F16, 1), 2);
        assert_eq!(uniform_alignment(UniformDataType::F16, 2), 4);
        assert_eq!(uniform_alignment(UniformDataType::F16, 3), 8);
        assert_eq!(uniform_alignment(UniformDataType::F16, 9), 16);
        assert_eq!(uniform_size(UniformDataType::F16, 3), 6);
        // Nine halves need two mat2x4<f16>.
        assert_eq!(uniform_size(UniformDataType::F16, 9), 32);

        let layout = UniformLayout::compute(&[
            UniformValue::scalar("a", h(1.0)),
            UniformValue::array("b", &[h(1.0), h(2.0)]).unwrap(),
            UniformValue::array("c", &[h(1.0); 4]).unwrap(),
            UniformValue::array("d", &[h(1.0); 8]).unwrap(),
        ]);
        assert_eq!(offsets(&layout), vec![0, 4, 8, 16]);
        assert_eq!(layout.total_size, 32);
    }

    #[test]
    fn placeholder_takes_no_space() {
        let layout = UniformLayout::compute(&[
            UniformValue::scalar("a", 1u32),
            UniformValue::empty("skip", UniformDataType::F32),
            UniformValue::scalar("b", 2u32),
        ]);
        assert_eq!(offsets(&layout), vec![0, 4, 4]);
        assert_eq!(layout.entries[1].length, 0);
    }

    #[test]
    fn empty_layout() {
        let layout = UniformLayout::compute(&[]);
        assert!(layout.entries.is_empty());
        assert_eq!(layout.total_size, 0);
    }

    #[test]
    fn pack_writes_at_offsets() {
        let uniforms = [
            UniformValue::scalar("n", 7u32),
            UniformValue::array("v", &[1.0f32, 2.0, 3.0, 4.0, 5.0]).unwrap(),
        ];
        let layout = UniformLayout::compute(&uniforms);
        let buf = layout.pack(&uniforms).unwrap();
        assert_eq!(buf.len(), 48);
        assert_eq!(&buf[0..4], &7u32.to_le_bytes());
        assert_eq!(&buf[4..16], &[0u8; 12]);
        assert_eq!(&buf[16..20], &1.0f32.to_le_bytes());
        assert_eq!(&buf[32..36], &5.0f32.to_le_bytes());
        assert_eq!(&buf[36..48], &[0u8; 12]);
    }

    #[test]
    fn pack_rejects_mismatched_values() {
        let layout = UniformLayout::compute(&[UniformValue::array("v", &[half::f16::ONE; 5]).unwrap()]);
        assert_eq!(layout.total_size, 16);

        let wider = [UniformValue::array("v", &[1u32; 5]).unwrap()];
        assert!(matches!(layout.pack(&wider), Err(ProgramError::InvalidDescriptor(_))));
        let longer = [UniformValue::array("v", &[half::f16::ONE; 9]).unwrap()];
        assert!(layout.pack(&longer).is_err());
        assert!(layout.pack(&[]).is_err());
    }
}
