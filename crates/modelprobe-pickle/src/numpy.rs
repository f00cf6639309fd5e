//! numpy arrays, dtypes and scalars as they appear in pickle streams.

use std::fmt;

use crate::{PickleError, Result, Value};

/// Module paths `_reconstruct` and `scalar` are pickled under
/// (numpy 1.x and 2.x).
pub(crate) fn is_multiarray_module(module: &str) -> bool {
    matches!(module, "numpy.core.multiarray" | "numpy._core.multiarray")
}

/// A numpy dtype reduced to its descriptor, e.g. `f8`, `O8`, `U12`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dtype {
    pub descr: String,
    /// `<`, `>`, `|` or `=` once `__setstate__` has run.
    pub byte_order: Option<char>,
}

impl Dtype {
    pub fn new(descr: impl Into<String>) -> Self {
        Self {
            descr: descr.into(),
            byte_order: None,
        }
    }

    fn body(&self) -> &str {
        self.descr.trim_start_matches(['<', '>', '|', '='])
    }

    pub fn kind(&self) -> char {
        self.body().chars().next().unwrap_or('V')
    }

    /// Bytes per element.
    pub fn itemsize(&self) -> usize {
        let width: usize = self
            .body()
            .get(self.kind().len_utf8()..)
            .and_then(|w| w.parse().ok())
            .unwrap_or(0);
        match self.kind() {
            'U' => width * 4,
            _ => width,
        }
    }

    pub fn is_object(&self) -> bool {
        self.kind() == 'O'
    }

    pub fn is_big_endian(&self) -> bool {
        self.byte_order == Some('>') || self.descr.starts_with('>')
    }

    pub(crate) fn set_state(&mut self, state: &Value) {
        // (version, byteorder, subdescr, names, fields, elsize, alignment, flags)
        if let Some(order) = state
            .as_seq()
            .and_then(|s| s.get(1))
            .and_then(Value::as_str)
            .and_then(|s| s.chars().next())
        {
            self.byte_order = Some(order);
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dtype('{}')", self.descr)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    /// Packed element bytes.
    Raw(Vec<u8>),
    /// Elements of an object-dtype array.
    Objects(Vec<Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub dtype: Option<Dtype>,
    pub fortran_order: bool,
    pub data: ArrayData,
}

impl NdArray {
    /// What `_reconstruct` returns before `__setstate__` fills it in.
    pub fn empty() -> Self {
        Self {
            shape: vec![0],
            dtype: None,
            fortran_order: false,
            data: ArrayData::Raw(Vec::new()),
        }
    }

    /// Element count, saturating at `usize::MAX` for shapes that overflow.
    pub fn len(&self) -> usize {
        element_count(&self.shape).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `ndarray.__setstate__`: `(version, shape, dtype, is_fortran, rawdata)`,
    /// or the versionless 4-tuple written by very old numpy.
    pub(crate) fn set_state(&mut self, state: Value) -> Result<()> {
        let mut parts = match state {
            Value::Tuple(parts) => parts,
            other => {
                return Err(PickleError::InvalidData(format!(
                    "ndarray state must be a tuple, got {}",
                    other.type_name()
                )))
            }
        };
        if parts.len() == 5 {
            parts.remove(0);
        }
        let [shape, dtype, fortran, raw]: [Value; 4] = parts.try_into().map_err(|p: Vec<_>| {
            PickleError::InvalidData(format!("ndarray state has {} fields", p.len()))
        })?;

        let shape = shape_from(&shape)?;
        if element_count(&shape).is_none() {
            return Err(PickleError::InvalidData(format!(
                "ndarray shape {shape:?} is too large"
            )));
        }
        self.shape = shape;
        self.dtype = match dtype {
            Value::Dtype(dtype) => Some(dtype),
            other => {
                return Err(PickleError::InvalidData(format!(
                    "ndarray dtype must be a numpy dtype, got {}",
                    other.type_name()
                )))
            }
        };
        self.fortran_order = fortran.as_int().unwrap_or(0) != 0;
        self.data = match raw {
            Value::Bytes(bytes) => ArrayData::Raw(bytes),
            Value::String(s) => ArrayData::Raw(latin1_bytes(&s)?),
            Value::List(items) => ArrayData::Objects(items),
            other => {
                return Err(PickleError::InvalidData(format!(
                    "unexpected ndarray payload of type {}",
                    other.type_name()
                )))
            }
        };
        Ok(())
    }

    /// Elements as strings, for object arrays of `str` and for `U`/`S` arrays.
    pub fn to_strings(&self) -> Result<Vec<String>> {
        match &self.data {
            ArrayData::Objects(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
                    other => Err(PickleError::InvalidData(format!(
                        "array element {i} is a {}, not a string",
                        other.type_name()
                    ))),
                })
                .collect(),
            ArrayData::Raw(raw) => {
                let dtype = self
                    .dtype
                    .as_ref()
                    .ok_or_else(|| PickleError::InvalidData("array has no dtype".to_string()))?;
                let itemsize = dtype.itemsize();
                let needed = itemsize.checked_mul(self.len());
                if itemsize == 0 || needed.is_none_or(|needed| raw.len() < needed) {
                    return Err(PickleError::InvalidData(format!(
                        "array data is too short for {} elements of {dtype}",
                        self.len()
                    )));
                }
                let chunks = raw.chunks_exact(itemsize).take(self.len());
                match dtype.kind() {
                    'U' => Ok(chunks
                        .map(|chunk| decode_ucs4(chunk, dtype.is_big_endian()))
                        .collect()),
                    'S' => Ok(chunks
                        .map(|chunk| {
                            let end = chunk.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                            String::from_utf8_lossy(&chunk[..end]).into_owned()
                        })
                        .collect()),
                    _ => Err(PickleError::InvalidData(format!(
                        "cannot read strings from an array of {dtype}"
                    ))),
                }
            }
        }
    }
}

impl fmt::Display for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.shape.as_slice() {
            [n] => format!("({n},)"),
            dims => format!(
                "({})",
                dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
            ),
        };
        match &self.dtype {
            Some(dtype) => write!(f, "array(shape={shape}, dtype={})", dtype.descr),
            None => write!(f, "array(shape={shape})"),
        }
    }
}

fn decode_ucs4(chunk: &[u8], big_endian: bool) -> String {
    chunk
        .chunks_exact(4)
        .map(|c| {
            let bytes = [c[0], c[1], c[2], c[3]];
            if big_endian {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            }
        })
        .take_while(|&cp| cp != 0)
        .map(|cp| char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Product of the dimensions, or `None` on overflow.
pub(crate) fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

pub(crate) fn shape_from(value: &Value) -> Result<Vec<usize>> {
    let dims = match value {
        Value::Int(_) => std::slice::from_ref(value),
        other => other.as_seq().ok_or_else(|| {
            PickleError::InvalidData(format!("shape must be a tuple, got {}", other.type_name()))
        })?,
    };
    dims.iter()
        .map(|d| {
            d.as_int()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| PickleError::InvalidData(format!("invalid dimension {d}")))
        })
        .collect()
}

/// Python 2 `str` payloads and `_codecs.encode(s, "latin1")` carry bytes as
/// code points below 256.
pub(crate) fn latin1_bytes(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                PickleError::InvalidData(format!("character {c:?} is not latin-1"))
            })
        })
        .collect()
}

/// Decodes `numpy.core.multiarray.scalar(dtype, raw)` for plain numeric
/// dtypes; anything else stays an opaque object.
pub(crate) fn scalar(dtype: &Dtype, raw: &[u8]) -> Option<Value> {
    let big = dtype.is_big_endian();
    macro_rules! read {
        ($ty:ty) => {{
            let bytes = raw.try_into().ok()?;
            if big {
                <$ty>::from_be_bytes(bytes)
            } else {
                <$ty>::from_le_bytes(bytes)
            }
        }};
    }

    let value = match (dtype.kind(), raw.len()) {
        ('f', 8) => Value::Float(read!(f64)),
        ('f', 4) => Value::Float(read!(f32) as f64),
        ('i', 8) => Value::Int(read!(i64)),
        ('i', 4) => Value::Int(read!(i32) as i64),
        ('i', 2) => Value::Int(read!(i16) as i64),
        ('i', 1) => Value::Int(raw[0] as i8 as i64),
        ('u', 8) => Value::Int(i64::try_from(read!(u64)).ok()?),
        ('u', 4) => Value::Int(read!(u32) as i64),
        ('u', 2) => Value::Int(read!(u16) as i64),
        ('u', 1) => Value::Int(raw[0] as i64),
        ('b', 1) => Value::Bool(raw[0] != 0),
        _ => return None,
    };
    Some(value)
}
