//! Pickle virtual machine.
//!
//! Globals are recorded as [`Global`] values and never resolved, so loading
//! never runs foreign code. `REDUCE`/`NEWOBJ` produce opaque [`Object`]s except
//! for the handful of callables numpy and the standard library use to rebuild
//! plain data.

use std::collections::HashMap;
use std::io::{BufRead, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use tracing::trace;

use crate::numpy::{self, Dtype, NdArray};
use crate::{joblib, Global, Object, OpCode, PickleError, Result, Value};

const HIGHEST_PROTOCOL: u8 = 5;

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Module roots globals may come from; `None` accepts any global.
    pub allowed_modules: Option<Vec<String>>,
    /// Read joblib's inline array payload after each `NumpyArrayWrapper`.
    pub joblib_arrays: bool,
}

impl LoadOptions {
    /// Plain `pickle.load` semantics.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn allows(&self, module: &str) -> bool {
        let Some(allowed) = &self.allowed_modules else {
            return true;
        };
        allowed.iter().any(|root| {
            module == root
                || module
                    .strip_prefix(root.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

pub fn load<R: BufRead>(reader: &mut R) -> Result<Value> {
    load_with(reader, &LoadOptions::permissive())
}

pub fn load_with<R: BufRead>(reader: &mut R, options: &LoadOptions) -> Result<Value> {
    Unpickler::new(reader, options).load()
}

pub struct Unpickler<'a, R> {
    reader: &'a mut R,
    options: &'a LoadOptions,
    stack: Vec<Value>,
    /// Stack heights recorded by `MARK`.
    marks: Vec<usize>,
    memo: HashMap<u32, Value>,
}

impl<'a, R: BufRead> Unpickler<'a, R> {
    pub fn new(reader: &'a mut R, options: &'a LoadOptions) -> Self {
        Self {
            reader,
            options,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
        }
    }

    /// Runs until `STOP` and returns the top of the stack. The reader is left
    /// positioned right after the `STOP` opcode.
    pub fn load(mut self) -> Result<Value> {
        loop {
            let code = self.reader.read_u8()?;
            let op = OpCode::try_from(code).map_err(PickleError::InvalidOpCode)?;
            trace!(?op, depth = self.stack.len(), "pickle opcode");
            match op {
                OpCode::Proto => {
                    let version = self.reader.read_u8()?;
                    if version > HIGHEST_PROTOCOL {
                        return Err(PickleError::InvalidProtocol(version));
                    }
                }
                // Frames are a read-ahead hint; the opcodes inside are contiguous.
                OpCode::Frame => {
                    self.reader.read_u64::<LittleEndian>()?;
                }
                OpCode::Stop => break,

                OpCode::Mark => self.marks.push(self.stack.len()),
                OpCode::Pop => {
                    if self.marks.last() == Some(&self.stack.len()) {
                        self.marks.pop();
                    } else {
                        self.pop()?;
                    }
                }
                OpCode::PopMark => {
                    self.pop_mark()?;
                }
                OpCode::Dup => {
                    let top = self.top()?.clone();
                    self.push(top);
                }

                OpCode::None => self.push(Value::None),
                OpCode::NewTrue => self.push(Value::Bool(true)),
                OpCode::NewFalse => self.push(Value::Bool(false)),
                OpCode::Int => {
                    let line = self.read_line()?;
                    let value = match line.as_str() {
                        "00" => Value::Bool(false),
                        "01" => Value::Bool(true),
                        s => Value::Int(parse_text(s)?),
                    };
                    self.push(value);
                }
                OpCode::BinInt => {
                    let v = self.reader.read_i32::<LittleEndian>()?;
                    self.push(Value::Int(v as i64));
                }
                OpCode::BinInt1 => {
                    let v = self.reader.read_u8()?;
                    self.push(Value::Int(v as i64));
                }
                OpCode::BinInt2 => {
                    let v = self.reader.read_u16::<LittleEndian>()?;
                    self.push(Value::Int(v as i64));
                }
                OpCode::Long => {
                    let line = self.read_line()?;
                    let v = parse_text(line.trim_end_matches('L'))?;
                    self.push(Value::Int(v));
                }
                OpCode::Long1 => {
                    let len = self.reader.read_u8()? as u64;
                    let bytes = self.read_bytes(len)?;
                    self.push(long_from_bytes(bytes));
                }
                OpCode::Long4 => {
                    let len = self.reader.read_i32::<LittleEndian>()?;
                    let len = u64::try_from(len).map_err(|_| {
                        PickleError::InvalidData(format!("negative LONG4 length {len}"))
                    })?;
                    let bytes = self.read_bytes(len)?;
                    self.push(long_from_bytes(bytes));
                }
                OpCode::Float => {
                    let line = self.read_line()?;
                    self.push(Value::Float(parse_text(&line)?));
                }
                OpCode::BinFloat => {
                    let v = self.reader.read_f64::<BigEndian>()?;
                    self.push(Value::Float(v));
                }

                OpCode::String => {
                    let line = self.read_line()?;
                    let inner = line
                        .strip_prefix('\'')
                        .and_then(|s| s.strip_suffix('\''))
                        .or_else(|| line.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                        .ok_or_else(|| {
                            PickleError::InvalidData("STRING argument is not quoted".to_string())
                        })?;
                    self.push(Value::String(inner.to_string()));
                }
                OpCode::BinString => {
                    let len = self.reader.read_i32::<LittleEndian>()?;
                    let len = u64::try_from(len).map_err(|_| {
                        PickleError::InvalidData(format!("negative BINSTRING length {len}"))
                    })?;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::String(latin1_string(&bytes)));
                }
                OpCode::ShortBinString => {
                    let len = self.reader.read_u8()? as u64;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::String(latin1_string(&bytes)));
                }
                OpCode::Unicode => {
                    let line = self.read_line()?;
                    self.push(Value::String(line));
                }
                OpCode::BinUnicode => {
                    let len = self.reader.read_u32::<LittleEndian>()? as u64;
                    self.read_unicode(len)?;
                }
                OpCode::ShortBinUnicode => {
                    let len = self.reader.read_u8()? as u64;
                    self.read_unicode(len)?;
                }
                OpCode::BinUnicode8 => {
                    let len = self.reader.read_u64::<LittleEndian>()?;
                    self.read_unicode(len)?;
                }
                OpCode::BinBytes => {
                    let len = self.reader.read_u32::<LittleEndian>()? as u64;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::Bytes(bytes));
                }
                OpCode::ShortBinBytes => {
                    let len = self.reader.read_u8()? as u64;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::Bytes(bytes));
                }
                OpCode::BinBytes8 | OpCode::ByteArray8 => {
                    let len = self.reader.read_u64::<LittleEndian>()?;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::Bytes(bytes));
                }

                OpCode::EmptyList => self.push(Value::List(Vec::new())),
                OpCode::EmptyTuple => self.push(Value::Tuple(Vec::new())),
                OpCode::EmptyDict => self.push(Value::Dict(Vec::new())),
                OpCode::EmptySet => self.push(Value::Set(Vec::new())),
                OpCode::List => {
                    let items = self.pop_mark()?;
                    self.push(Value::List(items));
                }
                OpCode::Tuple => {
                    let items = self.pop_mark()?;
                    self.push(Value::Tuple(items));
                }
                OpCode::Tuple1 => {
                    let a = self.pop()?;
                    self.push(Value::Tuple(vec![a]));
                }
                OpCode::Tuple2 => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Tuple(vec![a, b]));
                }
                OpCode::Tuple3 => {
                    let c = self.pop()?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Tuple(vec![a, b, c]));
                }
                OpCode::Dict => {
                    let items = self.pop_mark()?;
                    self.push(Value::Dict(pairs(items)?));
                }
                OpCode::FrozenSet => {
                    let items = self.pop_mark()?;
                    self.push(Value::Set(items));
                }

                OpCode::Append => {
                    let value = self.pop()?;
                    self.extend_top(op, vec![value])?;
                }
                OpCode::Appends => {
                    let items = self.pop_mark()?;
                    self.extend_top(op, items)?;
                }
                OpCode::SetItem => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_items_top(op, vec![(key, value)])?;
                }
                OpCode::SetItems => {
                    let items = self.pop_mark()?;
                    self.set_items_top(op, pairs(items)?)?;
                }
                OpCode::AddItems => {
                    let items = self.pop_mark()?;
                    match self.last_mut()? {
                        Value::Set(set) => set.extend(items),
                        _ => return Err(PickleError::UnexpectedOpCode(op)),
                    }
                }

                OpCode::Get => {
                    let idx = parse_text(&self.read_line()?)?;
                    self.memo_get(idx)?;
                }
                OpCode::BinGet => {
                    let idx = self.reader.read_u8()? as u32;
                    self.memo_get(idx)?;
                }
                OpCode::LongBinGet => {
                    let idx = self.reader.read_u32::<LittleEndian>()?;
                    self.memo_get(idx)?;
                }
                OpCode::Put => {
                    let idx = parse_text(&self.read_line()?)?;
                    self.memo_put(idx)?;
                }
                OpCode::BinPut => {
                    let idx = self.reader.read_u8()? as u32;
                    self.memo_put(idx)?;
                }
                OpCode::LongBinPut => {
                    let idx = self.reader.read_u32::<LittleEndian>()?;
                    self.memo_put(idx)?;
                }
                OpCode::Memoize => {
                    let idx = self.memo.len() as u32;
                    self.memo_put(idx)?;
                }

                OpCode::Global => {
                    let module = self.read_line()?;
                    let name = self.read_line()?;
                    let global = self.global(module, name)?;
                    self.push(Value::Global(global));
                }
                OpCode::StackGlobal => {
                    let name = self.pop_string()?;
                    let module = self.pop_string()?;
                    let global = self.global(module, name)?;
                    self.push(Value::Global(global));
                }
                OpCode::Inst => {
                    let module = self.read_line()?;
                    let name = self.read_line()?;
                    let class = self.global(module, name)?;
                    let args = self.pop_mark()?;
                    self.push(instantiate(class, args));
                }
                OpCode::Obj => {
                    let mut items = self.pop_mark()?;
                    if items.is_empty() {
                        return Err(PickleError::StackUnderflow);
                    }
                    let class = items.remove(0);
                    let value = self.new_obj(class, Value::Tuple(items))?;
                    self.push(value);
                }
                OpCode::Reduce => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    let value = reduce(callable, args)?;
                    self.push(value);
                }
                OpCode::NewObj => {
                    let args = self.pop()?;
                    let class = self.pop()?;
                    let value = self.new_obj(class, args)?;
                    self.push(value);
                }
                OpCode::NewObjEx => {
                    let _kwargs = self.pop()?;
                    let args = self.pop()?;
                    let class = self.pop()?;
                    let value = self.new_obj(class, args)?;
                    self.push(value);
                }
                OpCode::Build => {
                    let state = self.pop()?;
                    self.build(state)?;
                }

                OpCode::PersId
                | OpCode::BinPersId
                | OpCode::Ext1
                | OpCode::Ext2
                | OpCode::Ext4
                | OpCode::NextBuffer
                | OpCode::ReadOnlyBuffer => return Err(PickleError::UnsupportedOpCode(op)),
            }
        }
        self.pop()
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops above the innermost mark only.
    fn pop(&mut self) -> Result<Value> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() <= floor {
            return Err(PickleError::StackUnderflow);
        }
        self.stack.pop().ok_or(PickleError::StackUnderflow)
    }

    fn top(&self) -> Result<&Value> {
        self.stack.last().ok_or(PickleError::StackUnderflow)
    }

    fn last_mut(&mut self) -> Result<&mut Value> {
        self.stack.last_mut().ok_or(PickleError::StackUnderflow)
    }

    fn pop_mark(&mut self) -> Result<Vec<Value>> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| PickleError::InvalidData("MARK not found".to_string()))?;
        if mark > self.stack.len() {
            return Err(PickleError::StackUnderflow);
        }
        Ok(self.stack.split_off(mark))
    }

    fn pop_string(&mut self) -> Result<String> {
        match self.pop()? {
            Value::String(s) => Ok(s),
            other => Err(PickleError::InvalidData(format!(
                "STACK_GLOBAL expects strings, got {}",
                other.type_name()
            ))),
        }
    }

    fn memo_get(&mut self, idx: u32) -> Result<()> {
        let value = self
            .memo
            .get(&idx)
            .cloned()
            .ok_or(PickleError::MemoNotFound(idx))?;
        self.push(value);
        Ok(())
    }

    fn memo_put(&mut self, idx: u32) -> Result<()> {
        let value = self.top()?.clone();
        self.memo.insert(idx, value);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::with_capacity(32);
        self.reader.read_until(b'\n', &mut line)?;
        if line.pop() != Some(b'\n') {
            return Err(PickleError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map_err(|e| PickleError::InvalidData(format!("invalid UTF-8 in text argument: {e}")))
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut *self.reader).take(len).read_to_end(&mut buf)?;
        if (buf.len() as u64) < len {
            return Err(PickleError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(buf)
    }

    fn read_unicode(&mut self, len: u64) -> Result<()> {
        let bytes = self.read_bytes(len)?;
        let s = String::from_utf8(bytes)
            .map_err(|e| PickleError::InvalidData(format!("invalid UTF-8 string: {e}")))?;
        self.push(Value::String(s));
        Ok(())
    }

    fn global(&self, module: String, name: String) -> Result<Global> {
        // Python 2 spellings, as mapped by `fix_imports`.
        let module = match module.as_str() {
            "__builtin__" => "builtins".to_string(),
            "copy_reg" => "copyreg".to_string(),
            _ => module,
        };
        if !self.options.allows(&module) {
            return Err(PickleError::ForbiddenGlobal { module, name });
        }
        Ok(Global::new(module, name))
    }

    fn new_obj(&self, class: Value, args: Value) -> Result<Value> {
        match class {
            Value::Global(class) => Ok(instantiate(class, into_args(args)?)),
            other => Err(PickleError::InvalidData(format!(
                "cannot instantiate a {}",
                other.type_name()
            ))),
        }
    }

    fn extend_top(&mut self, op: OpCode, items: Vec<Value>) -> Result<()> {
        match self.last_mut()? {
            Value::List(list) => list.extend(items),
            Value::Object(obj) => obj.list_items.extend(items),
            _ => return Err(PickleError::UnexpectedOpCode(op)),
        }
        Ok(())
    }

    fn set_items_top(&mut self, op: OpCode, items: Vec<(Value, Value)>) -> Result<()> {
        match self.last_mut()? {
            Value::Dict(dict) => dict.extend(items),
            Value::Object(obj) => obj.dict_items.extend(items),
            _ => return Err(PickleError::UnexpectedOpCode(op)),
        }
        Ok(())
    }

    /// Applies `__setstate__`, then swaps a joblib array wrapper for the
    /// array whose payload follows it in the stream.
    fn build(&mut self, state: Value) -> Result<()> {
        match self.last_mut()? {
            Value::Object(obj) => match (&mut obj.state, state) {
                (Some(Value::Dict(current)), Value::Dict(update)) => current.extend(update),
                (slot, state) => *slot = Some(state),
            },
            Value::NdArray(array) => array.set_state(state)?,
            Value::Dtype(dtype) => dtype.set_state(&state),
            Value::Dict(dict) => match state {
                Value::Dict(update) => dict.extend(update),
                other => {
                    return Err(PickleError::InvalidData(format!(
                        "cannot update a dict from a {}",
                        other.type_name()
                    )))
                }
            },
            other => {
                return Err(PickleError::InvalidData(format!(
                    "BUILD on a {}",
                    other.type_name()
                )))
            }
        }

        if !self.options.joblib_arrays {
            return Ok(());
        }
        let is_wrapper = matches!(
            self.stack.last(),
            Some(Value::Object(obj)) if joblib::is_array_wrapper(&obj.class)
        );
        if is_wrapper {
            if let Some(Value::Object(wrapper)) = self.stack.pop() {
                let array = joblib::read_array(&mut *self.reader, &wrapper, self.options)?;
                self.push(array);
            }
        }
        Ok(())
    }
}

fn instantiate(class: Global, args: Vec<Value>) -> Value {
    match (class.module.as_str(), class.name.as_str()) {
        ("collections", "OrderedDict") | ("builtins", "dict") => Value::Dict(Vec::new()),
        _ => Value::Object(Box::new(Object::new(class, args))),
    }
}

fn into_args(args: Value) -> Result<Vec<Value>> {
    match args {
        Value::Tuple(items) | Value::List(items) => Ok(items),
        Value::None => Ok(Vec::new()),
        other => Err(PickleError::InvalidData(format!(
            "call arguments must be a tuple, got {}",
            other.type_name()
        ))),
    }
}

/// `REDUCE`: rebuilds the plain-data callables numpy and the standard
/// library pickle through; everything else is recorded unevaluated.
fn reduce(callable: Value, args: Value) -> Result<Value> {
    let class = match callable {
        Value::Global(class) => class,
        other => {
            return Err(PickleError::InvalidData(format!(
                "REDUCE on a non-callable {}",
                other.type_name()
            )))
        }
    };
    let args = into_args(args)?;

    let value = match (class.module.as_str(), class.name.as_str()) {
        ("_codecs", "encode") => match args.as_slice() {
            [Value::String(s), Value::String(enc)] if enc == "latin1" || enc == "latin-1" => {
                Value::Bytes(numpy::latin1_bytes(s)?)
            }
            [Value::String(s), ..] => Value::Bytes(s.clone().into_bytes()),
            _ => {
                return Err(PickleError::InvalidData(
                    "_codecs.encode expects a string".to_string(),
                ))
            }
        },
        ("numpy", "dtype") => match args.first() {
            Some(Value::String(descr)) => Value::Dtype(Dtype::new(descr.clone())),
            _ => {
                return Err(PickleError::InvalidData(
                    "numpy.dtype expects a descriptor string".to_string(),
                ))
            }
        },
        (module, "_reconstruct") if numpy::is_multiarray_module(module) => {
            Value::NdArray(Box::new(NdArray::empty()))
        }
        (module, "scalar") if numpy::is_multiarray_module(module) => match args.as_slice() {
            [Value::Dtype(dtype), Value::Bytes(raw)] => numpy::scalar(dtype, raw)
                .unwrap_or_else(|| instantiate(class.clone(), args.clone())),
            _ => instantiate(class, args),
        },
        ("builtins", "set" | "frozenset") => match args.into_iter().next() {
            Some(Value::List(items) | Value::Tuple(items) | Value::Set(items)) => Value::Set(items),
            _ => Value::Set(Vec::new()),
        },
        ("builtins", "bytes" | "bytearray") => match args.into_iter().next() {
            Some(Value::Bytes(b)) => Value::Bytes(b),
            Some(Value::String(s)) => Value::Bytes(numpy::latin1_bytes(&s)?),
            _ => Value::Bytes(Vec::new()),
        },
        // copyreg._reconstructor(cls, base, state) is how protocol 0/1 pickle
        // plain instances.
        ("copyreg", "_reconstructor") => match args.into_iter().next() {
            Some(Value::Global(cls)) => instantiate(cls, Vec::new()),
            _ => {
                return Err(PickleError::InvalidData(
                    "copyreg._reconstructor expects a class".to_string(),
                ))
            }
        },
        _ => instantiate(class, args),
    };
    Ok(value)
}

fn pairs(items: Vec<Value>) -> Result<Vec<(Value, Value)>> {
    if items.len() % 2 != 0 {
        return Err(PickleError::InvalidData(
            "odd number of items for a dict".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        out.push((key, value));
    }
    Ok(out)
}

fn parse_text<T: std::str::FromStr>(s: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.trim()
        .parse()
        .map_err(|e| PickleError::InvalidData(format!("invalid numeric argument '{s}': {e}")))
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Little-endian two's complement, as written by `LONG1`/`LONG4`.
fn long_from_bytes(bytes: Vec<u8>) -> Value {
    if bytes.is_empty() {
        return Value::Int(0);
    }
    if bytes.len() > 8 {
        return Value::BigInt(bytes);
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    let mut buf = if negative { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(&bytes);
    Value::Int(i64::from_le_bytes(buf))
}
