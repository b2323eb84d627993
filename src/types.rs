//! The MiniC type system (component A).
//!
//! Types are small, structurally-equal values; arrays and pointers carry
//! their element type boxed so that `Type` stays `Clone`. `Bool` is an
//! IR-level type produced only by comparisons and is lowered to a 32-bit
//! integer at emission time -- there is no surface-syntax boolean value
//! representation distinct from `int`.

use derive_more::Display;

/// A MiniC type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Type {
    #[display("void")]
    Void,
    #[display("int")]
    Int32,
    /// Only ever produced by comparisons; lowered to `Int32` at emit time.
    #[display("bool")]
    Bool,
    #[display("{_0}*")]
    Pointer(Box<Type>),
    /// `dimensions` is the declared shape, outermost first. A leading size
    /// of 0 marks an unknown-extent first dimension (an array parameter,
    /// e.g. `int a[][3]`).
    #[display("{}{}", element, dims_to_string(dimensions))]
    Array {
        element: Box<Type>,
        dimensions: Vec<usize>,
    },
}

fn dims_to_string(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| if *d == 0 { "[]".to_string() } else { format!("[{d}]") })
        .collect()
}

impl Type {
    pub fn pointer_to(t: Type) -> Type {
        Type::Pointer(Box::new(t))
    }

    pub fn array_of(element: Type, dimensions: Vec<usize>) -> Type {
        Type::Array {
            element: Box::new(element),
            dimensions,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int32)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// The element type of a pointer or array; panics on other types since
    /// callers only ask this of values already known to be one of the two.
    pub fn element_type(&self) -> &Type {
        match self {
            Type::Pointer(t) => t,
            Type::Array { element, .. } => element,
            _ => panic!("element_type called on non-pointer, non-array type {self}"),
        }
    }

    pub fn dimensions(&self) -> &[usize] {
        match self {
            Type::Array { dimensions, .. } => dimensions,
            _ => &[],
        }
    }

    pub fn dimension_size(&self, i: usize) -> usize {
        self.dimensions()[i]
    }

    /// Product of the sizes of dimensions strictly greater than `i`. Used to
    /// linearize a multi-dimensional index into a single row-major offset:
    /// `offset = sum(i_j * dimension_multiplier(j))`.
    pub fn dimension_multiplier(&self, i: usize) -> usize {
        self.dimensions()[i + 1..].iter().product()
    }

    /// Number of scalar elements in an array type (product of all dims,
    /// with an unknown leading dimension treated as 1 since only the
    /// trailing dims matter for addressing within a single row).
    pub fn element_count(&self) -> usize {
        self.dimensions().iter().map(|d| (*d).max(1)).product()
    }

    /// Size in bytes of a value of this type, used for frame layout.
    /// Every MiniC scalar is 4 bytes; arrays are laid out contiguously.
    pub fn size_bytes(&self) -> usize {
        match self {
            Type::Void => 0,
            Type::Int32 | Type::Bool => 4,
            Type::Pointer(_) => 4,
            Type::Array { dimensions, .. } => 4 * dimensions.iter().product::<usize>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_multiplier_is_product_of_trailing_dims() {
        let t = Type::array_of(Type::Int32, vec![2, 3, 4]);
        assert_eq!(t.dimension_multiplier(0), 12); // 3*4
        assert_eq!(t.dimension_multiplier(1), 4);
        assert_eq!(t.dimension_multiplier(2), 1);
    }

    #[test]
    fn unknown_first_dimension_is_zero() {
        let t = Type::array_of(Type::Int32, vec![0, 3]);
        assert_eq!(t.dimension_size(0), 0);
        assert_eq!(t.dimension_multiplier(0), 3);
    }

    #[test]
    fn size_bytes_scales_with_element_count() {
        let t = Type::array_of(Type::Int32, vec![2, 3]);
        assert_eq!(t.size_bytes(), 24);
    }
}
