//! Tagged values and their little-endian wire encoding.

use byteorder::{ByteOrder, LittleEndian};

use crate::format::{MIN_ENTRY_SIZE, OFFSET_ENTRY_SIZE, VALUE_LEN_SIZE};
use crate::{corrupt, Result};

/// On-disk type tag of a stored value.
///
/// The tag byte is part of the wire format; `REMOVED` deliberately sits at
/// the maximum byte value so a tombstone can be produced by a single-byte
/// overwrite of any live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    Uint8 = 0,
    Int8 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint32 = 4,
    Int32 = 5,
    Uint64 = 6,
    Int64 = 7,
    Float = 8,
    Double = 9,
    String = 10,
    U8String = 11,
    Blob = 12,
    Removed = 0xFF,
}

impl ValueType {
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => Self::Uint8,
            1 => Self::Int8,
            2 => Self::Uint16,
            3 => Self::Int16,
            4 => Self::Uint32,
            5 => Self::Int32,
            6 => Self::Uint64,
            7 => Self::Int64,
            8 => Self::Float,
            9 => Self::Double,
            10 => Self::String,
            11 => Self::U8String,
            12 => Self::Blob,
            0xFF => Self::Removed,
            other => return Err(corrupt(format!("unknown value type tag {other}"))),
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Blob-like types carry a u32 length prefix before their bytes.
    pub fn is_blob_like(self) -> bool {
        matches!(self, Self::String | Self::U8String | Self::Blob)
    }
}

/// A concrete stored value.
///
/// Integer and float encodings are width-fixed little-endian; `Float` and
/// `Double` are bit-cast through their unsigned representation (Rust's `f32`
/// and `f64` are IEEE-754 by language guarantee). `String` is a raw 8-bit
/// string, `U8String` is validated UTF-8, `Blob` is an arbitrary byte string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uint8(u8),
    Int8(i8),
    Uint16(u16),
    Int16(i16),
    Uint32(u32),
    Int32(i32),
    Uint64(u64),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(Vec<u8>),
    U8String(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Uint8(_) => ValueType::Uint8,
            Value::Int8(_) => ValueType::Int8,
            Value::Uint16(_) => ValueType::Uint16,
            Value::Int16(_) => ValueType::Int16,
            Value::Uint32(_) => ValueType::Uint32,
            Value::Int32(_) => ValueType::Int32,
            Value::Uint64(_) => ValueType::Uint64,
            Value::Int64(_) => ValueType::Int64,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::U8String(_) => ValueType::U8String,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    /// Encoded size of the value bytes, including the length prefix for
    /// blob-like types.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Uint8(_) | Value::Int8(_) => 1,
            Value::Uint16(_) | Value::Int16(_) => 2,
            Value::Uint32(_) | Value::Int32(_) | Value::Float(_) => 4,
            Value::Uint64(_) | Value::Int64(_) | Value::Double(_) => 8,
            Value::String(b) => VALUE_LEN_SIZE + b.len(),
            Value::U8String(s) => VALUE_LEN_SIZE + s.len(),
            Value::Blob(b) => VALUE_LEN_SIZE + b.len(),
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Uint8(v) => buf.push(*v),
            Value::Int8(v) => buf.push(*v as u8),
            Value::Uint16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Int16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Uint32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Uint64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Int64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Float(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::String(b) => Self::encode_blob(b, buf),
            Value::U8String(s) => Self::encode_blob(s.as_bytes(), buf),
            Value::Blob(b) => Self::encode_blob(b, buf),
        }
    }

    fn encode_blob(bytes: &[u8], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }

    /// Decodes a value of type `ty` from the start of `buf`. Every length is
    /// bounds-checked against `buf`; an out-of-range read is a corruption
    /// error, never a read of garbage.
    pub fn decode(ty: ValueType, buf: &[u8]) -> Result<Value> {
        fn fixed(buf: &[u8], width: usize) -> Result<&[u8]> {
            buf.get(..width)
                .ok_or_else(|| corrupt("value extends past block bounds"))
        }
        Ok(match ty {
            ValueType::Uint8 => Value::Uint8(fixed(buf, 1)?[0]),
            ValueType::Int8 => Value::Int8(fixed(buf, 1)?[0] as i8),
            ValueType::Uint16 => Value::Uint16(LittleEndian::read_u16(fixed(buf, 2)?)),
            ValueType::Int16 => Value::Int16(LittleEndian::read_i16(fixed(buf, 2)?)),
            ValueType::Uint32 => Value::Uint32(LittleEndian::read_u32(fixed(buf, 4)?)),
            ValueType::Int32 => Value::Int32(LittleEndian::read_i32(fixed(buf, 4)?)),
            ValueType::Uint64 => Value::Uint64(LittleEndian::read_u64(fixed(buf, 8)?)),
            ValueType::Int64 => Value::Int64(LittleEndian::read_i64(fixed(buf, 8)?)),
            ValueType::Float => Value::Float(LittleEndian::read_f32(fixed(buf, 4)?)),
            ValueType::Double => Value::Double(LittleEndian::read_f64(fixed(buf, 8)?)),
            ValueType::String | ValueType::U8String | ValueType::Blob => {
                let len = LittleEndian::read_u32(fixed(buf, VALUE_LEN_SIZE)?) as usize;
                if len == 0 {
                    return Err(corrupt("zero-length blob value"));
                }
                let bytes = buf
                    .get(VALUE_LEN_SIZE..VALUE_LEN_SIZE + len)
                    .ok_or_else(|| corrupt("blob value length exceeds block bounds"))?;
                match ty {
                    ValueType::String => Value::String(bytes.to_vec()),
                    ValueType::Blob => Value::Blob(bytes.to_vec()),
                    _ => Value::U8String(
                        std::str::from_utf8(bytes)
                            .map_err(|_| corrupt("invalid utf-8 in string value"))?
                            .to_owned(),
                    ),
                }
            }
            ValueType::Removed => return Err(corrupt("removed entry carries no value")),
        })
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Uint8(v)
    }
}
impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int8(v)
    }
}
impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Uint16(v)
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint32(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::U8String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::U8String(v.to_owned())
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}
impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

/// A stored value or a deletion marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    Removed,
}

impl Entry {
    pub fn value_type(&self) -> ValueType {
        match self {
            Entry::Value(v) => v.value_type(),
            Entry::Removed => ValueType::Removed,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Entry::Removed)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Removed => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Removed => None,
        }
    }

    /// Encoded size of the value part; a tombstone encodes no value bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Entry::Value(v) => v.encoded_len(),
            Entry::Removed => 0,
        }
    }
}

/// An entry plus its expiration field, exactly as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub entry: Entry,
    pub expiration_ms: u64,
}

/// Result of a point-status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Exists,
    Removed,
    NotFound,
}

/// Approximate on-disk footprint of one entry, including its slot in the
/// block's offset table. Used for block budgeting and memtable accounting.
pub fn on_disk_entry_size(key_len: usize, entry: &Entry) -> usize {
    MIN_ENTRY_SIZE + key_len + entry.encoded_len() + OFFSET_ENTRY_SIZE
}
