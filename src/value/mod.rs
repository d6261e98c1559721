//! value — the typed `Map<String, Value>` <-> bytes codec. B+Tree leaf
//! values are opaque bytes to `btree`; this module is the only thing
//! that knows how to turn them back into typed fields.
//!
//! Format (all integers little-endian):
//!
//! ```text
//! u32 count
//! repeat count times:
//!   u32 key_len, key_bytes (UTF-8)
//!   u8  type_tag
//!   payload per type: NULL=none, STRING=u32 len+bytes, INT32=i32,
//!                      INT64=i64, FLOAT64=f64, BOOL=u8 (0/1)
//! ```

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DeltaliteError, Result};

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_INT32: u8 = 2;
const TAG_INT64: u8 = 3;
const TAG_FLOAT64: u8 = 4;
const TAG_BOOL: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
}

/// An ordered map keeps `serialize` deterministic without requiring
/// callers to sort fields themselves; a `BTreeMap` makes output
/// deterministic for *any* insertion order, a strictly stronger (and
/// simpler to test) guarantee than insertion-order-only determinism.
pub type RecordMap = BTreeMap<String, Value>;

fn write_tagged(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::String(s) => {
            buf.push(TAG_STRING);
            if s.len() > u32::MAX as usize {
                return Err(DeltaliteError::CorruptValue("string too long".into()));
            }
            let mut len_buf = [0u8; 4];
            LittleEndian::write_u32(&mut len_buf, s.len() as u32);
            buf.extend_from_slice(&len_buf);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::I32(v) => {
            buf.push(TAG_INT32);
            let mut b = [0u8; 4];
            LittleEndian::write_i32(&mut b, *v);
            buf.extend_from_slice(&b);
        }
        Value::I64(v) => {
            buf.push(TAG_INT64);
            let mut b = [0u8; 8];
            LittleEndian::write_i64(&mut b, *v);
            buf.extend_from_slice(&b);
        }
        Value::F64(v) => {
            buf.push(TAG_FLOAT64);
            let mut b = [0u8; 8];
            LittleEndian::write_f64(&mut b, *v);
            buf.extend_from_slice(&b);
        }
        Value::Bool(v) => {
            buf.push(TAG_BOOL);
            buf.push(if *v { 1 } else { 0 });
        }
    }
    Ok(())
}

pub fn serialize(map: &RecordMap) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if map.len() > u32::MAX as usize {
        return Err(DeltaliteError::CorruptValue("too many fields".into()));
    }
    let mut count_buf = [0u8; 4];
    LittleEndian::write_u32(&mut count_buf, map.len() as u32);
    buf.extend_from_slice(&count_buf);

    for (key, value) in map {
        if key.len() > u32::MAX as usize {
            return Err(DeltaliteError::CorruptValue("field name too long".into()));
        }
        let mut klen = [0u8; 4];
        LittleEndian::write_u32(&mut klen, key.len() as u32);
        buf.extend_from_slice(&klen);
        buf.extend_from_slice(key.as_bytes());
        write_tagged(&mut buf, value)?;
    }
    Ok(buf)
}

struct Cursor<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.off + n > self.data.len() {
            return Err(DeltaliteError::CorruptValue(format!(
                "unexpected end of value bytes at offset {}",
                self.off
            )));
        }
        let slice = &self.data[self.off..self.off + n];
        self.off += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
}

pub fn deserialize(bytes: &[u8]) -> Result<RecordMap> {
    let mut cur = Cursor { data: bytes, off: 0 };
    let count = cur.u32()?;
    let mut map = RecordMap::new();
    for _ in 0..count {
        let key_len = cur.u32()? as usize;
        let key_bytes = cur.take(key_len)?;
        let key = String::from_utf8(key_bytes.to_vec())
            .map_err(|e| DeltaliteError::CorruptValue(format!("non-UTF-8 field name: {e}")))?;
        let tag = cur.u8()?;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_STRING => {
                let len = cur.u32()? as usize;
                let bytes = cur.take(len)?;
                Value::String(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| DeltaliteError::CorruptValue(format!("non-UTF-8 string: {e}")))?,
                )
            }
            TAG_INT32 => Value::I32(LittleEndian::read_i32(cur.take(4)?)),
            TAG_INT64 => Value::I64(LittleEndian::read_i64(cur.take(8)?)),
            TAG_FLOAT64 => Value::F64(LittleEndian::read_f64(cur.take(8)?)),
            TAG_BOOL => Value::Bool(cur.u8()? != 0),
            other => {
                return Err(DeltaliteError::CorruptValue(format!(
                    "unknown value type tag {other}"
                )))
            }
        };
        map.insert(key, value);
    }
    Ok(map)
}
