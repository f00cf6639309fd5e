use std::fmt;

use crate::numpy::{Dtype, NdArray};

/// Sequences longer than this are elided in `Display` output.
const MAX_REPR_ITEMS: usize = 8;

/// A `module.name` reference pushed by `GLOBAL`/`STACK_GLOBAL`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Global {
    pub module: String,
    pub name: String,
}

impl Global {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    pub fn is(&self, module: &str, name: &str) -> bool {
        self.module == module && self.name == name
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// An instance of a class the loader does not model. Nothing is executed:
/// constructor arguments and `__setstate__` state are only recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub class: Global,
    pub args: Vec<Value>,
    pub state: Option<Value>,
    /// Items appended to a list subclass.
    pub list_items: Vec<Value>,
    /// Items set on a dict subclass.
    pub dict_items: Vec<(Value, Value)>,
}

impl Object {
    pub fn new(class: Global, args: Vec<Value>) -> Self {
        Self {
            class,
            args,
            state: None,
            list_items: Vec::new(),
            dict_items: Vec::new(),
        }
    }

    /// The instance `__dict__`: either the whole state or the dict half of a
    /// `(dict, slots)` state tuple.
    pub fn state_dict(&self) -> Option<&[(Value, Value)]> {
        match self.state.as_ref()? {
            Value::Dict(items) => Some(items),
            Value::Tuple(parts) => match parts.first() {
                Some(Value::Dict(items)) => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        dict_get(self.state_dict()?, name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// Little-endian two's complement bytes of an int wider than 64 bits.
    BigInt(Vec<u8>),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered pairs; keys are not restricted to strings.
    Dict(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Global(Global),
    Object(Box<Object>),
    NdArray(Box<NdArray>),
    Dtype(Dtype),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Elements of a tuple or list.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Instance attribute lookup, the pickle-level analogue of `getattr`.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.as_object()?.attr(name)
    }

    /// All string-keyed instance attributes in stored order.
    pub fn attrs(&self) -> Option<Vec<(&str, &Value)>> {
        let items = self.as_object()?.state_dict()?;
        Some(
            items
                .iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k, v)))
                .collect(),
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::BigInt(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Global(_) => "global",
            Value::Object(_) => "object",
            Value::NdArray(_) => "ndarray",
            Value::Dtype(_) => "dtype",
        }
    }
}

pub fn dict_get<'a>(items: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    items
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value], open: &str, close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().take(MAX_REPR_ITEMS).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    if items.len() > MAX_REPR_ITEMS {
        write!(f, ", ... ({} items)", items.len())?;
    }
    f.write_str(close)
}

/// Python-flavoured `repr`, shortened for console output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(bytes) => write!(f, "<int: {} bytes>", bytes.len()),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => write!(f, "<bytes: {} bytes>", b.len()),
            Value::List(items) => write_seq(f, items, "[", "]"),
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Value::Tuple(items) => write_seq(f, items, "(", ")"),
            Value::Set(items) if items.is_empty() => f.write_str("set()"),
            Value::Set(items) => write_seq(f, items, "{", "}"),
            Value::Dict(items) => {
                f.write_str("{")?;
                for (i, (k, v)) in items.iter().take(MAX_REPR_ITEMS).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                if items.len() > MAX_REPR_ITEMS {
                    write!(f, ", ... ({} items)", items.len())?;
                }
                f.write_str("}")
            }
            Value::Global(g) => write!(f, "<class '{g}'>"),
            Value::Object(obj) => write!(f, "<{} object>", obj.class),
            Value::NdArray(arr) => write!(f, "{arr}"),
            Value::Dtype(dtype) => write!(f, "{dtype}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn attr_reads_plain_and_slot_state() {
        let mut obj = Object::new(Global::new("sklearn.linear_model", "Ridge"), vec![]);
        obj.state = Some(Value::Dict(vec![(s("alpha"), Value::Float(1.0))]));
        let value = Value::Object(Box::new(obj.clone()));
        assert_eq!(value.attr("alpha"), Some(&Value::Float(1.0)));
        assert_eq!(value.attr("beta"), None);

        obj.state = Some(Value::Tuple(vec![
            Value::Dict(vec![(s("alpha"), Value::Float(2.0))]),
            Value::Dict(vec![]),
        ]));
        assert_eq!(obj.attr("alpha"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn only_objects_have_attributes() {
        let dict = Value::Dict(vec![(s("feature_names_in_"), Value::None)]);
        assert_eq!(dict.attr("feature_names_in_"), None);
        assert!(dict.attrs().is_none());
    }

    #[test]
    fn repr_is_python_like_and_bounded() {
        assert_eq!(Value::Tuple(vec![Value::Int(3)]).to_string(), "(3,)");
        assert_eq!(
            Value::Dict(vec![(s("loss"), s("squared_error"))]).to_string(),
            "{'loss': 'squared_error'}"
        );
        assert_eq!(Value::Float(0.1).to_string(), "0.1");
        let long = Value::List((0..20).map(Value::Int).collect());
        assert_eq!(long.to_string(), "[0, 1, 2, 3, 4, 5, 6, 7, ... (20 items)]");
    }
}
