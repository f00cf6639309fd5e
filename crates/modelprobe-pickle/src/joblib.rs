//! joblib containers: a pickle stream, optionally compressed as a whole, in
//! which every numpy array is a `NumpyArrayWrapper` placeholder followed
//! inline by the array payload.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use byteorder::ReadBytesExt;
use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::debug;

use crate::machine::{self, LoadOptions};
use crate::numpy::{self, ArrayData, NdArray};
use crate::value::dict_get;
use crate::{Global, Object, PickleError, Result, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Gzip,
    Bz2,
    Xz,
    Lzma,
    Lz4,
    /// The `ZF` container of joblib < 0.10.
    LegacyZfile,
}

impl Compression {
    /// Detects the compressor from the magic bytes joblib relies on.
    pub fn sniff(prefix: &[u8]) -> Self {
        const MAGICS: &[(&[u8], Compression)] = &[
            (b"\x78", Compression::Zlib),
            (b"\x1f\x8b", Compression::Gzip),
            (b"BZ", Compression::Bz2),
            (b"\xfd\x37\x7a\x58\x5a", Compression::Xz),
            (b"\x5d\x00\x00", Compression::Lzma),
            (b"\x04\x22\x4d\x18", Compression::Lz4),
            (b"ZF", Compression::LegacyZfile),
        ];
        MAGICS
            .iter()
            .find(|(magic, _)| prefix.starts_with(magic))
            .map_or(Compression::None, |(_, c)| *c)
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "uncompressed",
            Compression::Zlib => "zlib",
            Compression::Gzip => "gzip",
            Compression::Bz2 => "bz2",
            Compression::Xz => "xz",
            Compression::Lzma => "lzma",
            Compression::Lz4 => "lz4",
            Compression::LegacyZfile => "legacy ZF",
        }
    }
}

/// Loader options matching `joblib.load`: any global, inline arrays.
pub fn options() -> LoadOptions {
    LoadOptions {
        allowed_modules: None,
        joblib_arrays: true,
    }
}

pub fn load(path: &Path) -> Result<Value> {
    let file = File::open(path)?;
    load_from(BufReader::new(file))
}

pub fn load_from<R: BufRead>(reader: R) -> Result<Value> {
    load_from_with(reader, &options())
}

/// Like [`load_from`], with the caller's module restrictions. Inline arrays
/// are always read.
pub fn load_from_with<R: BufRead>(mut reader: R, options: &LoadOptions) -> Result<Value> {
    let compression = Compression::sniff(reader.fill_buf()?);
    debug!(compression = compression.name(), "reading joblib container");

    let options = LoadOptions {
        joblib_arrays: true,
        ..options.clone()
    };
    match compression {
        Compression::None => machine::load_with(&mut reader, &options),
        Compression::Zlib => {
            machine::load_with(&mut BufReader::new(ZlibDecoder::new(reader)), &options)
        }
        Compression::Gzip => {
            machine::load_with(&mut BufReader::new(GzDecoder::new(reader)), &options)
        }
        other => Err(PickleError::UnsupportedCompression(other.name())),
    }
}

pub(crate) fn is_array_wrapper(class: &Global) -> bool {
    class.name == "NumpyArrayWrapper"
        && matches!(
            class.module.as_str(),
            "joblib.numpy_pickle" | "sklearn.externals.joblib.numpy_pickle"
        )
}

/// Reads the payload that follows a built `NumpyArrayWrapper`.
///
/// Object arrays are a nested, self-terminated pickle stream. Everything else
/// is raw C- or Fortran-ordered element bytes, preceded by a padding-length
/// byte and that much padding when the wrapper records an alignment.
pub(crate) fn read_array<R: BufRead>(
    reader: &mut R,
    wrapper: &Object,
    options: &LoadOptions,
) -> Result<Value> {
    let state = wrapper
        .state_dict()
        .ok_or_else(|| PickleError::ArrayWrapper("missing state".to_string()))?;
    let field = |name: &str| {
        dict_get(state, name).ok_or_else(|| PickleError::ArrayWrapper(format!("missing `{name}`")))
    };

    let shape = numpy::shape_from(field("shape")?)?;
    let dtype = match field("dtype")? {
        Value::Dtype(dtype) => dtype.clone(),
        other => {
            return Err(PickleError::ArrayWrapper(format!(
                "dtype is a {}",
                other.type_name()
            )))
        }
    };
    let fortran_order = field("order")?.as_str() == Some("F");

    if dtype.is_object() {
        let nested = LoadOptions {
            allowed_modules: options.allowed_modules.clone(),
            joblib_arrays: false,
        };
        return match machine::load_with(reader, &nested)? {
            value @ Value::NdArray(_) => Ok(value),
            other => Err(PickleError::ArrayWrapper(format!(
                "object array payload is a {}",
                other.type_name()
            ))),
        };
    }

    if let Some(Value::Int(_)) = dict_get(state, "numpy_array_alignment_bytes") {
        let padding = reader.read_u8()?;
        let mut skip = [0u8; u8::MAX as usize];
        reader.read_exact(&mut skip[..padding as usize])?;
    }

    let len = numpy::element_count(&shape)
        .and_then(|count| count.checked_mul(dtype.itemsize()))
        .ok_or_else(|| PickleError::ArrayWrapper(format!("array of shape {shape:?} is too large")))?;
    let mut data = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() < len {
        return Err(PickleError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    debug!(?shape, dtype = %dtype.descr, "read inline joblib array");

    Ok(Value::NdArray(Box::new(NdArray {
        shape,
        dtype: Some(dtype),
        fortran_order,
        data: ArrayData::Raw(data),
    })))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression as Level;

    use super::*;

    fn uni(buf: &mut Vec<u8>, s: &str) {
        buf.push(0x8c);
        buf.push(s.len() as u8);
        buf.extend_from_slice(s.as_bytes());
    }

    fn global(buf: &mut Vec<u8>, module: &str, name: &str) {
        buf.push(b'c');
        buf.extend_from_slice(format!("{module}\n{name}\n").as_bytes());
    }

    /// Opens a float64 `NumpyArrayWrapper` whose shape is pickled by `shape`.
    fn float_wrapper(buf: &mut Vec<u8>, shape: &[u8]) {
        global(buf, "joblib.numpy_pickle", "NumpyArrayWrapper");
        buf.extend_from_slice(b")\x81}(");
        uni(buf, "subclass");
        global(buf, "numpy", "ndarray");
        uni(buf, "shape");
        buf.extend_from_slice(shape);
        uni(buf, "order");
        uni(buf, "C");
        uni(buf, "dtype");
        global(buf, "numpy", "dtype");
        uni(buf, "f8");
        buf.extend_from_slice(b"\x89\x88\x87R");
        uni(buf, "allow_mmap");
        buf.push(0x88);
        uni(buf, "numpy_array_alignment_bytes");
        buf.extend_from_slice(b"K\x10ub");
    }

    /// `(array([1.5, -2.0]), 7)` with the array stored as a joblib wrapper.
    fn wrapped_float_array() -> Vec<u8> {
        let mut buf = b"\x80\x04(".to_vec();
        float_wrapper(&mut buf, b"K\x02\x85");
        // padding length, padding, payload
        buf.extend_from_slice(&[3, 0xff, 0xff, 0xff]);
        buf.extend_from_slice(&1.5f64.to_le_bytes());
        buf.extend_from_slice(&(-2.0f64).to_le_bytes());
        buf.extend_from_slice(b"K\x07t.");
        buf
    }

    fn check_float_tuple(value: Value) {
        let items = value.as_seq().expect("tuple").to_vec();
        assert_eq!(items.len(), 2);
        let Value::NdArray(array) = &items[0] else {
            panic!("expected an array, got {:?}", items[0]);
        };
        assert_eq!(array.shape, [2]);
        let ArrayData::Raw(raw) = &array.data else {
            panic!("expected raw data");
        };
        let first = f64::from_le_bytes(raw[..8].try_into().unwrap());
        let second = f64::from_le_bytes(raw[8..].try_into().unwrap());
        assert_eq!((first, second), (1.5, -2.0));
        assert_eq!(items[1], Value::Int(7));
    }

    #[test]
    fn sniffs_compressors() {
        assert_eq!(Compression::sniff(b"\x80\x04\x95"), Compression::None);
        assert_eq!(Compression::sniff(b"\x78\x9c"), Compression::Zlib);
        assert_eq!(Compression::sniff(b"\x1f\x8b\x08"), Compression::Gzip);
        assert_eq!(Compression::sniff(b"BZh9"), Compression::Bz2);
        assert_eq!(Compression::sniff(b"ZF0x"), Compression::LegacyZfile);
        assert_eq!(Compression::sniff(b""), Compression::None);
    }

    #[test]
    fn inline_array_skips_alignment_padding() {
        let value = load_from(Cursor::new(wrapped_float_array())).unwrap();
        check_float_tuple(value);
    }

    #[test]
    fn plain_loader_does_not_read_inline_arrays() {
        let bytes = wrapped_float_array();
        assert!(machine::load(&mut &bytes[..]).is_err());
    }

    #[test]
    fn zlib_and_gzip_containers_are_decompressed() {
        let raw = wrapped_float_array();

        let mut zlib = ZlibEncoder::new(Vec::new(), Level::default());
        zlib.write_all(&raw).unwrap();
        check_float_tuple(load_from(Cursor::new(zlib.finish().unwrap())).unwrap());

        let mut gzip = GzEncoder::new(Vec::new(), Level::default());
        gzip.write_all(&raw).unwrap();
        check_float_tuple(load_from(Cursor::new(gzip.finish().unwrap())).unwrap());
    }

    #[test]
    fn unsupported_compression_is_rejected() {
        let err = load_from(Cursor::new(b"BZh91AY&SY".to_vec())).unwrap_err();
        assert!(matches!(err, PickleError::UnsupportedCompression("bz2")));
    }

    #[test]
    fn any_class_module_is_accepted() {
        let mut buf = b"\x80\x04".to_vec();
        global(&mut buf, "xgboost.sklearn", "XGBRegressor");
        buf.extend_from_slice(b")\x81.");
        let value = load_from(Cursor::new(buf.clone())).unwrap();
        assert!(value.as_object().unwrap().class.is("xgboost.sklearn", "XGBRegressor"));

        let restricted = LoadOptions {
            allowed_modules: Some(vec!["sklearn".into(), "numpy".into()]),
            joblib_arrays: false,
        };
        let err = load_from_with(Cursor::new(buf), &restricted).unwrap_err();
        assert!(matches!(err, PickleError::ForbiddenGlobal { .. }));
    }

    #[test]
    fn overflowing_shape_is_an_error() {
        // shape (2**62, 8)
        let mut buf = b"\x80\x04".to_vec();
        float_wrapper(
            &mut buf,
            b"\x8a\x08\x00\x00\x00\x00\x00\x00\x00\x40K\x08\x86",
        );
        buf.extend_from_slice(&[0; 16]);
        buf.push(b'.');

        let err = load_from(Cursor::new(buf)).unwrap_err();
        assert!(
            matches!(err, PickleError::ArrayWrapper(ref msg) if msg.contains("too large")),
            "{err}"
        );
    }
}
