// https://github.com/python/cpython/blob/main/Lib/pickletools.py
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum OpCode {
    // protocol 0 and 1
    Mark = b'(',
    Stop = b'.',
    Pop = b'0',
    PopMark = b'1',
    Dup = b'2',
    Float = b'F',
    Int = b'I',
    BinInt = b'J',
    BinInt1 = b'K',
    Long = b'L',
    BinInt2 = b'M',
    None = b'N',
    PersId = b'P',
    BinPersId = b'Q',
    Reduce = b'R',
    String = b'S',
    BinString = b'T',
    ShortBinString = b'U',
    Unicode = b'V',
    BinUnicode = b'X',
    Append = b'a',
    Build = b'b',
    Global = b'c',
    Dict = b'd',
    EmptyDict = b'}',
    Appends = b'e',
    Get = b'g',
    BinGet = b'h',
    Inst = b'i',
    LongBinGet = b'j',
    List = b'l',
    EmptyList = b']',
    Obj = b'o',
    Put = b'p',
    BinPut = b'q',
    LongBinPut = b'r',
    SetItem = b's',
    Tuple = b't',
    EmptyTuple = b')',
    SetItems = b'u',
    BinFloat = b'G',
    // protocol 2
    Proto = 0x80,
    NewObj = 0x81,
    Ext1 = 0x82,
    Ext2 = 0x83,
    Ext4 = 0x84,
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    NewTrue = 0x88,
    NewFalse = 0x89,
    Long1 = 0x8a,
    Long4 = 0x8b,
    // protocol 3
    BinBytes = b'B',
    ShortBinBytes = b'C',
    // protocol 4
    ShortBinUnicode = 0x8c,
    BinUnicode8 = 0x8d,
    BinBytes8 = 0x8e,
    EmptySet = 0x8f,
    AddItems = 0x90,
    FrozenSet = 0x91,
    NewObjEx = 0x92,
    StackGlobal = 0x93,
    Memoize = 0x94,
    Frame = 0x95,
    // protocol 5
    ByteArray8 = 0x96,
    NextBuffer = 0x97,
    ReadOnlyBuffer = 0x98,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        let op = match value {
            b'(' => Self::Mark,
            b'.' => Self::Stop,
            b'0' => Self::Pop,
            b'1' => Self::PopMark,
            b'2' => Self::Dup,
            b'F' => Self::Float,
            b'I' => Self::Int,
            b'J' => Self::BinInt,
            b'K' => Self::BinInt1,
            b'L' => Self::Long,
            b'M' => Self::BinInt2,
            b'N' => Self::None,
            b'P' => Self::PersId,
            b'Q' => Self::BinPersId,
            b'R' => Self::Reduce,
            b'S' => Self::String,
            b'T' => Self::BinString,
            b'U' => Self::ShortBinString,
            b'V' => Self::Unicode,
            b'X' => Self::BinUnicode,
            b'a' => Self::Append,
            b'b' => Self::Build,
            b'c' => Self::Global,
            b'd' => Self::Dict,
            b'}' => Self::EmptyDict,
            b'e' => Self::Appends,
            b'g' => Self::Get,
            b'h' => Self::BinGet,
            b'i' => Self::Inst,
            b'j' => Self::LongBinGet,
            b'l' => Self::List,
            b']' => Self::EmptyList,
            b'o' => Self::Obj,
            b'p' => Self::Put,
            b'q' => Self::BinPut,
            b'r' => Self::LongBinPut,
            b's' => Self::SetItem,
            b't' => Self::Tuple,
            b')' => Self::EmptyTuple,
            b'u' => Self::SetItems,
            b'G' => Self::BinFloat,
            0x80 => Self::Proto,
            0x81 => Self::NewObj,
            0x82 => Self::Ext1,
            0x83 => Self::Ext2,
            0x84 => Self::Ext4,
            0x85 => Self::Tuple1,
            0x86 => Self::Tuple2,
            0x87 => Self::Tuple3,
            0x88 => Self::NewTrue,
            0x89 => Self::NewFalse,
            0x8a => Self::Long1,
            0x8b => Self::Long4,
            b'B' => Self::BinBytes,
            b'C' => Self::ShortBinBytes,
            0x8c => Self::ShortBinUnicode,
            0x8d => Self::BinUnicode8,
            0x8e => Self::BinBytes8,
            0x8f => Self::EmptySet,
            0x90 => Self::AddItems,
            0x91 => Self::FrozenSet,
            0x92 => Self::NewObjEx,
            0x93 => Self::StackGlobal,
            0x94 => Self::Memoize,
            0x95 => Self::Frame,
            0x96 => Self::ByteArray8,
            0x97 => Self::NextBuffer,
            0x98 => Self::ReadOnlyBuffer,
            value => return Err(value),
        };
        Ok(op)
    }
}
