//! Wire codec for the coordinator protocol
//!
//! Decoding operates over a byte slice with a read cursor. Integers are
//! little-endian; the signed variants are stored biased by half their range
//! so the wire value is always non-negative.

use std::fmt;

use thiserror::Error;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("truncated input: needed {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown array type tag: {0:#04x}")]
    UnknownTypeTag(u8),

    #[error("unknown server code: {0:#04x}")]
    UnknownServerCode(u8),

    #[error("string too long: {0} characters (max: 65535)")]
    StringTooLong(usize),

    #[error("character {0:?} is not representable in Latin-1")]
    NonLatin1(char),

    #[error("integer out of range: {0} (max: 2147483647)")]
    IntOutOfRange(u32),

    #[error("value kind {0} is not supported by encode inference")]
    UnsupportedKind(&'static str),

    #[error("packet too large for group framing: {0} bytes (max: 65535)")]
    PacketTooLarge(usize),

    #[error("too many packets in group: {0} (max: 65535)")]
    GroupTooLarge(usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Worker memory classes. Carried on the wire as a single server-code byte
/// and rendered externally as a single-letter tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RamClass {
    Tiny = 0,
    Small = 1,
    Medium = 2,
    Big = 3,
    Gigantic = 4,
}

impl RamClass {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RamClass::Tiny),
            1 => Some(RamClass::Small),
            2 => Some(RamClass::Medium),
            3 => Some(RamClass::Big),
            4 => Some(RamClass::Gigantic),
            _ => None,
        }
    }

    /// Case-insensitive prefix lookup, e.g. "gig" resolves to `Gigantic`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.is_empty() {
            return None;
        }
        let name = name.to_ascii_lowercase();
        [
            RamClass::Tiny,
            RamClass::Small,
            RamClass::Medium,
            RamClass::Big,
            RamClass::Gigantic,
        ]
        .into_iter()
        .find(|class| class.name().starts_with(&name))
    }

    /// The single-letter tag used in external identifiers.
    pub fn letter(&self) -> char {
        match self {
            RamClass::Tiny => 'T',
            RamClass::Small => 'S',
            RamClass::Medium => 'M',
            RamClass::Big => 'B',
            RamClass::Gigantic => 'G',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RamClass::Tiny => "tiny",
            RamClass::Small => "small",
            RamClass::Medium => "medium",
            RamClass::Big => "big",
            RamClass::Gigantic => "gigantic",
        }
    }
}

impl fmt::Display for RamClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A decoded element of a typed or mixed array.
///
/// The encode-inference path (see [`super::Packet`]) supports only `Byte`,
/// `Short`, `Int`, `Str` and `List`; the remaining variants are decodable
/// but can only be written through explicit calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Short(u16),
    SignedShort(i16),
    Int(u32),
    SignedInt(i32),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::SignedShort(_) => "signed short",
            Value::Int(_) => "int",
            Value::SignedInt(_) => "signed int",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
        }
    }
}

/// Read cursor over a received payload.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_byte(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_short(&mut self) -> CodecResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_signed_short(&mut self) -> CodecResult<i16> {
        Ok((i32::from(self.read_short()?) - 32768) as i16)
    }

    pub fn read_int(&mut self) -> CodecResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_signed_int(&mut self) -> CodecResult<i32> {
        Ok((i64::from(self.read_int()?) - 2_147_483_648) as i32)
    }

    pub fn read_long(&mut self) -> CodecResult<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_signed_long(&mut self) -> CodecResult<i64> {
        Ok(self.read_long()?.wrapping_sub(1 << 63) as i64)
    }

    pub fn read_boolean(&mut self) -> CodecResult<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Length-prefixed Latin-1 string: every byte maps to the code point of
    /// the same value.
    pub fn read_string(&mut self) -> CodecResult<String> {
        let len = usize::from(self.read_short()?);
        let bytes = self.read_bytes(len)?;
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    pub fn read_server_code(&mut self) -> CodecResult<RamClass> {
        let b = self.read_byte()?;
        RamClass::from_byte(b).ok_or(CodecError::UnknownServerCode(b))
    }

    /// Array with a single leading element-type tag.
    pub fn read_typed_array(&mut self) -> CodecResult<Vec<Value>> {
        let tag = self.read_byte()?;
        let count = usize::from(self.read_short()?);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_value(tag)?);
        }
        Ok(values)
    }

    /// Array carrying a type tag per element.
    pub fn read_mixed_array(&mut self) -> CodecResult<Vec<Value>> {
        let count = usize::from(self.read_short()?);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = self.read_byte()?;
            values.push(self.read_value(tag)?);
        }
        Ok(values)
    }

    fn read_value(&mut self, tag: u8) -> CodecResult<Value> {
        match tag {
            0 => Ok(Value::Byte(self.read_byte()?)),
            1 => Ok(Value::Short(self.read_short()?)),
            2 => Ok(Value::SignedShort(self.read_signed_short()?)),
            3 => Ok(Value::Int(self.read_int()?)),
            4 => Ok(Value::SignedInt(self.read_signed_int()?)),
            5 => Ok(Value::Str(self.read_string()?)),
            6 => Ok(Value::List(self.read_typed_array()?)),
            7 => Ok(Value::List(self.read_mixed_array()?)),
            8 => Ok(Value::Bool(self.read_boolean()?)),
            other => Err(CodecError::UnknownTypeTag(other)),
        }
    }
}
