//! Tensor facts read by program descriptors.

use std::fmt;

use crate::types::ElementType;

/// N-dimensional shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TensorShape {
    dims: Vec<usize>,
}

impl TensorShape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Self { dims: dims.to_vec() }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Formats as `{d0,d1,...}`; this text is part of shape-dependent cache keys.
impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("}")
    }
}

/// Read-only view of a tensor, as needed for code generation.
///
/// Implemented by whatever tensor type the runtime uses. Programs only
/// read the element type and shape, never the data.
pub trait TensorInfo {
    fn element_type(&self) -> ElementType;
    fn shape(&self) -> &TensorShape;

    fn ndim(&self) -> usize {
        self.shape().ndim()
    }
}

/// Owned snapshot of a tensor's element type and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorMeta {
    pub element_type: ElementType,
    pub shape: TensorShape,
}

impl TensorMeta {
    pub fn new(element_type: ElementType, dims: &[usize]) -> Self {
        Self {
            element_type,
            shape: TensorShape::from_slice(dims),
        }
    }

    /// Snapshot any tensor.
    pub fn of(tensor: &(impl TensorInfo + ?Sized)) -> Self {
        Self {
            element_type: tensor.element_type(),
            shape: tensor.shape().clone(),
        }
    }
}

impl TensorInfo for TensorMeta {
    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> &TensorShape {
        &self.shape
    }
}
