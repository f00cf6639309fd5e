use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;

/// ONNX `TensorProto.DataType`, with the wire codes as discriminants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DataType {
    Undefined = 0,
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    Bfloat16 = 16,
    Float8E4M3FN = 17,
    Float8E4M3FNUZ = 18,
    Float8E5M2 = 19,
    Float8E5M2FNUZ = 20,
    Uint4 = 21,
    Int4 = 22,
    Float4E2M1 = 23,
    Float8E8M0 = 24,
    Uint2 = 25,
    Int2 = 26,
}

impl DataType {
    pub const ALL: [DataType; 27] = [
        Self::Undefined,
        Self::Float,
        Self::Uint8,
        Self::Int8,
        Self::Uint16,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::String,
        Self::Bool,
        Self::Float16,
        Self::Double,
        Self::Uint32,
        Self::Uint64,
        Self::Complex64,
        Self::Complex128,
        Self::Bfloat16,
        Self::Float8E4M3FN,
        Self::Float8E4M3FNUZ,
        Self::Float8E5M2,
        Self::Float8E5M2FNUZ,
        Self::Uint4,
        Self::Int4,
        Self::Float4E2M1,
        Self::Float8E8M0,
        Self::Uint2,
        Self::Int2,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Name as spelled in `onnx.proto`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Float => "FLOAT",
            Self::Uint8 => "UINT8",
            Self::Int8 => "INT8",
            Self::Uint16 => "UINT16",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::Float16 => "FLOAT16",
            Self::Double => "DOUBLE",
            Self::Uint32 => "UINT32",
            Self::Uint64 => "UINT64",
            Self::Complex64 => "COMPLEX64",
            Self::Complex128 => "COMPLEX128",
            Self::Bfloat16 => "BFLOAT16",
            Self::Float8E4M3FN => "FLOAT8E4M3FN",
            Self::Float8E4M3FNUZ => "FLOAT8E4M3FNUZ",
            Self::Float8E5M2 => "FLOAT8E5M2",
            Self::Float8E5M2FNUZ => "FLOAT8E5M2FNUZ",
            Self::Uint4 => "UINT4",
            Self::Int4 => "INT4",
            Self::Float4E2M1 => "FLOAT4E2M1",
            Self::Float8E8M0 => "FLOAT8E8M0",
            Self::Uint2 => "UINT2",
            Self::Int2 => "INT2",
        }
    }
}

/// Reverse lookup from wire codes to type names.
#[derive(Clone, Debug)]
pub struct DataTypeTable {
    names: HashMap<i32, &'static str>,
}

impl DataTypeTable {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn new() -> Self {
        Self {
            names: DataType::ALL.iter().map(|d| (d.code(), d.name())).collect(),
        }
    }

    pub fn name(&self, code: i32) -> &'static str {
        self.names.get(&code).copied().unwrap_or(Self::UNKNOWN)
    }
}

impl Default for DataTypeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Tensor shape; `None` marks a dimension without a fixed value.
///
/// Displays like the Python list the dims come from, with the string
/// `'dynamic'` standing in for unfixed dimensions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[Option<i64>; 6]>);

impl Shape {
    pub fn fixed(dims: &[i64]) -> Self {
        Self(dims.iter().copied().map(Some).collect())
    }
}

impl FromIterator<Option<i64>> for Shape {
    fn from_iter<I: IntoIterator<Item = Option<i64>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match dim {
                Some(v) => write!(f, "{v}")?,
                None => f.write_str("'dynamic'")?,
            }
        }
        f.write_str("]")
    }
}
