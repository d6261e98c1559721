//! page/element — the 8-byte element header plus key/value payload:
//! `key_len: u16`, `value_len: u16`, `flags: u8` (bit 0 = has_overflow),
//! 3 bytes padding, then `key` bytes then `value` bytes.
//!
//! Decoding is defensive by construction: any length that would run the
//! record past the end of the buffer handed to us is reported as
//! `CorruptPage` rather than panicking or reading out of bounds.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DeltaliteError, Result};

pub const ELEMENT_HEADER_LEN: usize = 8;

const OFF_KEY_LEN: usize = 0;
const OFF_VALUE_LEN: usize = 2;
const OFF_FLAGS: usize = 4;

const FLAG_HAS_OVERFLOW: u8 = 0x01;

/// A single key/value pair as stored inline in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub has_overflow: bool,
}

impl Element {
    pub fn inline(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            has_overflow: false,
        }
    }

    /// Size this element would occupy once encoded.
    pub fn encoded_len(&self) -> usize {
        ELEMENT_HEADER_LEN + self.key.len() + self.value.len()
    }

    /// When `has_overflow` is set, `value` is exactly an 8-byte little-endian
    /// `PageId` pointing at the first overflow page.
    pub fn overflow_page_id(&self) -> Option<u64> {
        if self.has_overflow && self.value.len() == 8 {
            Some(LittleEndian::read_u64(&self.value))
        } else {
            None
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        if self.key.len() > u16::MAX as usize || self.value.len() > u16::MAX as usize {
            return Err(DeltaliteError::CorruptValue(
                "key or value exceeds 65535 bytes".into(),
            ));
        }
        let mut hdr = [0u8; ELEMENT_HEADER_LEN];
        LittleEndian::write_u16(&mut hdr[OFF_KEY_LEN..OFF_KEY_LEN + 2], self.key.len() as u16);
        LittleEndian::write_u16(
            &mut hdr[OFF_VALUE_LEN..OFF_VALUE_LEN + 2],
            self.value.len() as u16,
        );
        hdr[OFF_FLAGS] = if self.has_overflow { FLAG_HAS_OVERFLOW } else { 0 };
        buf.extend_from_slice(&hdr);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(())
    }
}

/// Encode `elements` (assumed already in sorted order) back-to-back.
pub fn encode_elements(elements: &[Element]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for el in elements {
        el.encode_into(&mut buf)?;
    }
    Ok(buf)
}

/// Decode every element out of `data`, the page bytes following the 16-byte
/// page header. `count` comes from the page header and bounds how many
/// elements we expect; any header/length that would run past `data.len()`
/// is a `CorruptPage` rather than a panic, so callers (notably the
/// free-space computation) can treat corruption as "force a split" instead
/// of risking an out-of-bounds read or a silent overwrite.
pub fn decode_elements(data: &[u8], count: u32, page_id: u64) -> Result<Vec<Element>> {
    let mut out = Vec::with_capacity(count as usize);
    let mut off = 0usize;
    for _ in 0..count {
        if off + ELEMENT_HEADER_LEN > data.len() {
            return Err(DeltaliteError::CorruptPage {
                page_id,
                offset: off,
                reason: "element header runs past end of page".into(),
            });
        }
        let key_len = LittleEndian::read_u16(&data[off + OFF_KEY_LEN..off + OFF_KEY_LEN + 2]) as usize;
        let value_len =
            LittleEndian::read_u16(&data[off + OFF_VALUE_LEN..off + OFF_VALUE_LEN + 2]) as usize;
        let flags = data[off + OFF_FLAGS];
        let has_overflow = flags & FLAG_HAS_OVERFLOW != 0;

        let key_start = off + ELEMENT_HEADER_LEN;
        let value_start = match key_start.checked_add(key_len) {
            Some(v) => v,
            None => {
                return Err(DeltaliteError::CorruptPage {
                    page_id,
                    offset: off,
                    reason: "key_len overflow".into(),
                })
            }
        };
        let end = match value_start.checked_add(value_len) {
            Some(v) => v,
            None => {
                return Err(DeltaliteError::CorruptPage {
                    page_id,
                    offset: off,
                    reason: "value_len overflow".into(),
                })
            }
        };
        if end > data.len() {
            return Err(DeltaliteError::CorruptPage {
                page_id,
                offset: off,
                reason: format!(
                    "element payload [{key_start}, {end}) runs past page bound {}",
                    data.len()
                ),
            });
        }

        out.push(Element {
            key: data[key_start..value_start].to_vec(),
            value: data[value_start..end].to_vec(),
            has_overflow,
        });
        off = end;
    }
    Ok(out)
}

/// Total bytes occupied by `count` elements starting at the front of `data`.
/// Returns 0 on any corruption, which forces callers to treat the page as
/// full (and split) rather than overwrite beyond what was actually decoded.
pub fn used_bytes(data: &[u8], count: u32, page_id: u64) -> usize {
    match decode_elements(data, count, page_id) {
        Ok(elements) => elements.iter().map(Element::encoded_len).sum(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_elements() {
        let elements = vec![
            Element::inline(b"a".to_vec(), b"1".to_vec()),
            Element::inline(b"bb".to_vec(), b"22".to_vec()),
        ];
        let encoded = encode_elements(&elements).unwrap();
        let decoded = decode_elements(&encoded, 2, 0).unwrap();
        assert_eq!(elements, decoded);
    }

    #[test]
    fn corrupt_length_is_reported() {
        // key_len claims 100 bytes but buffer is short.
        let mut buf = vec![0u8; ELEMENT_HEADER_LEN + 2];
        LittleEndian::write_u16(&mut buf[0..2], 100);
        let err = decode_elements(&buf, 1, 7).unwrap_err();
        match err {
            DeltaliteError::CorruptPage { page_id, .. } => assert_eq!(page_id, 7),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn used_bytes_is_zero_on_corruption() {
        let mut buf = vec![0u8; ELEMENT_HEADER_LEN + 2];
        LittleEndian::write_u16(&mut buf[0..2], 100);
        assert_eq!(used_bytes(&buf, 1, 0), 0);
    }
}
