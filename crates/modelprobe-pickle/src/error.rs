use std::io;

use crate::OpCode;

#[derive(thiserror::Error, Debug)]
pub enum PickleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid pickle opcode 0x{0:02x}; the file may be corrupted or not a pickle")]
    InvalidOpCode(u8),

    #[error("unsupported pickle protocol version {0} (supported: 0-5)")]
    InvalidProtocol(u8),

    #[error("pickle opcode {0:?} is not supported")]
    UnsupportedOpCode(OpCode),

    #[error("pickle opcode {0:?} is not valid in this context")]
    UnexpectedOpCode(OpCode),

    #[error("global {module}.{name} is not allowed by this loader")]
    ForbiddenGlobal { module: String, name: String },

    #[error("invalid data in pickle stream: {0}")]
    InvalidData(String),

    #[error("pickle stack underflow; the stream may be truncated or corrupted")]
    StackUnderflow,

    #[error("pickle memo entry {0} not found")]
    MemoNotFound(u32),

    #[error("{0} compressed joblib files are not supported")]
    UnsupportedCompression(&'static str),

    #[error("malformed joblib array wrapper: {0}")]
    ArrayWrapper(String),
}

pub type Result<T> = std::result::Result<T, PickleError>;
