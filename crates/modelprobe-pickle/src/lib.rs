//! A non-executing reader for Python pickle streams and joblib containers.
//!
//! Objects are never constructed: class references, constructor arguments
//! and `__setstate__` state are recorded as [`Value`]s so callers can read
//! attributes of saved estimators without a Python runtime. numpy arrays,
//! dtypes and scalars are decoded into [`NdArray`], [`Dtype`] and plain
//! values.

mod error;
pub mod joblib;
mod machine;
pub mod numpy;
mod opcode;
mod value;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

pub use error::{PickleError, Result};
pub use machine::{load, load_with, LoadOptions, Unpickler};
pub use numpy::{ArrayData, Dtype, NdArray};
pub use opcode::OpCode;
pub use value::*;

/// Loads a plain, uncompressed pickle file with no module restrictions.
///
/// Like `pickle.load`, this stops at the first `STOP`. Bytes left over after
/// it usually mean the file is a joblib dump whose inline arrays were read as
/// pickle opcodes, so they are reported.
pub fn load_file(path: &Path) -> Result<Value> {
    let mut reader = BufReader::new(File::open(path)?);
    let value = load(&mut reader)?;
    if !reader.fill_buf()?.is_empty() {
        warn!(
            path = %path.display(),
            "pickle stream ended before the end of the file; the result may be incomplete"
        );
    }
    Ok(value)
}
