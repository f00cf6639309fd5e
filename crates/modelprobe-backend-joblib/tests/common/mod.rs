use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Hand-assembles protocol 4 pickle streams shaped like `joblib.dump` and
/// `pickle.dump` output for scikit-learn estimators.
pub struct PickleBuilder {
    buf: Vec<u8>,
}

impl PickleBuilder {
    pub fn new() -> Self {
        Self {
            buf: vec![0x80, 0x04],
        }
    }

    pub fn global(mut self, module: &str, name: &str) -> Self {
        self.buf.push(b'c');
        self.buf
            .extend_from_slice(format!("{module}\n{name}\n").as_bytes());
        self
    }

    pub fn str(mut self, s: &str) -> Self {
        self.buf.push(b'X');
        self.buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn int(mut self, v: i32) -> Self {
        self.buf.push(b'J');
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn float(mut self, v: f64) -> Self {
        self.buf.push(b'G');
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// `cls.__new__(cls)` followed by the start of its state dict.
    pub fn begin_object(self, module: &str, name: &str) -> Self {
        self.global(module, name).raw(b")\x81}(")
    }

    /// Closes the state dict opened by [`Self::begin_object`] and applies it.
    pub fn end_object(self) -> Self {
        self.raw(b"ub")
    }

    pub fn dtype(self, descr: &str) -> Self {
        self.global("numpy", "dtype")
            .str(descr)
            .raw(b"\x89\x88\x87R")
    }

    /// An object-dtype array of strings the way `ndarray.__reduce__` writes it.
    pub fn string_array(self, items: &[&str]) -> Self {
        let mut b = self
            .global("numpy.core.multiarray", "_reconstruct")
            .global("numpy", "ndarray")
            .raw(b"K\x00\x85C\x01b\x87R(K\x01")
            .int(items.len() as i32)
            .raw(b"\x85")
            .dtype("O8")
            .raw(b"\x89](");
        for item in items {
            b = b.str(item);
        }
        b.raw(b"etb")
    }

    /// A string array stored the way `joblib.dump` stores it: a
    /// `NumpyArrayWrapper` followed by a nested pickle of the array.
    pub fn wrapped_string_array(self, items: &[&str]) -> Self {
        let nested = PickleBuilder::new().string_array(items).finish();
        self.begin_object("joblib.numpy_pickle", "NumpyArrayWrapper")
            .str("subclass")
            .global("numpy", "ndarray")
            .str("shape")
            .int(items.len() as i32)
            .raw(b"\x85")
            .str("order")
            .str("C")
            .str("dtype")
            .dtype("O8")
            .str("allow_mmap")
            .raw(b"\x89")
            .end_object()
            .raw(&nested)
    }

    /// A plain Python list of strings.
    pub fn string_list(self, items: &[&str]) -> Self {
        let mut b = self.raw(b"](");
        for item in items {
            b = b.str(item);
        }
        b.raw(b"e")
    }

    /// A `NumpyArrayWrapper` whose state lacks a dtype. `joblib.load` cannot
    /// read its payload; a plain unpickler just records the object.
    pub fn wrapper_without_dtype(self) -> Self {
        self.begin_object("joblib.numpy_pickle", "NumpyArrayWrapper")
            .str("shape")
            .int(3)
            .raw(b"\x85")
            .str("order")
            .str("C")
            .end_object()
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(b'.');
        self.buf
    }
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}
