//! Minimal RLP framing for envelopes.
//!
//! Envelopes travel as one RLP list; nothing else in the protocol uses
//! RLP, so this module implements only the shapes the envelope needs:
//! byte strings, unsigned integers, and flat lists. Integers are
//! minimal big-endian (zero encodes as the empty string), and the
//! decoder rejects non-canonical encodings so a given envelope has
//! exactly one byte representation — the identity hash depends on it.

use vesper_types::{Result, VesperError};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Appends the RLP encoding of a byte string to `out`.
pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else {
        encode_length(out, bytes.len(), 0x80);
        out.extend_from_slice(bytes);
    }
}

/// Appends the RLP encoding of an unsigned integer: minimal big-endian
/// bytes, zero as the empty string.
pub fn encode_uint(out: &mut Vec<u8>, value: u64) {
    let be = value.to_be_bytes();
    let skip = be.iter().take_while(|&&b| b == 0).count();
    encode_bytes(out, &be[skip..]);
}

/// Wraps an already-encoded payload into a list item.
pub fn wrap_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    encode_length(&mut out, payload.len(), 0xc0);
    out.extend_from_slice(payload);
    out
}

fn encode_length(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let skip = be.iter().take_while(|&&b| b == 0).count();
        out.push(offset + 55 + (8 - skip) as u8);
        out.extend_from_slice(&be[skip..]);
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Cursor over RLP input.
///
/// `enter_list` yields a sub-decoder over the list payload; the items
/// are then consumed in order with `take_bytes` / `take_uint`.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Header of the item at the cursor: payload range plus list-ness.
struct Item {
    start: usize,
    end: usize,
    is_list: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over raw RLP bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Consumes a list item and returns a decoder over its payload.
    pub fn enter_list(&mut self) -> Result<Decoder<'a>> {
        let item = self.next_item()?;
        if !item.is_list {
            return Err(VesperError::Rlp {
                reason: "expected a list, found a byte string".into(),
            });
        }
        Ok(Decoder {
            data: &self.data[item.start..item.end],
            pos: 0,
        })
    }

    /// Consumes a byte-string item.
    pub fn take_bytes(&mut self) -> Result<&'a [u8]> {
        let item = self.next_item()?;
        if item.is_list {
            return Err(VesperError::Rlp {
                reason: "expected a byte string, found a list".into(),
            });
        }
        Ok(&self.data[item.start..item.end])
    }

    /// Consumes an unsigned-integer item (minimal big-endian).
    pub fn take_uint(&mut self) -> Result<u64> {
        let bytes = self.take_bytes()?;
        if bytes.len() > 8 {
            return Err(VesperError::Rlp {
                reason: format!("integer of {} bytes overflows u64", bytes.len()),
            });
        }
        if bytes.first() == Some(&0) {
            return Err(VesperError::Rlp {
                reason: "integer has leading zero bytes".into(),
            });
        }
        let mut value = 0u64;
        for &b in bytes {
            value = value << 8 | b as u64;
        }
        Ok(value)
    }

    /// Consumes an unsigned-integer item that must fit in 32 bits.
    pub fn take_u32(&mut self) -> Result<u32> {
        let value = self.take_uint()?;
        u32::try_from(value).map_err(|_| VesperError::Rlp {
            reason: format!("integer {value} overflows u32"),
        })
    }

    fn next_item(&mut self) -> Result<Item> {
        let prefix = *self.data.get(self.pos).ok_or_else(|| VesperError::Rlp {
            reason: "unexpected end of input".into(),
        })?;

        let (header_len, payload_len, is_list) = match prefix {
            0x00..=0x7f => (0, 1, false),
            0x80..=0xb7 => (1, (prefix - 0x80) as usize, false),
            0xb8..=0xbf => {
                let len = self.read_long_length((prefix - 0xb7) as usize)?;
                (1 + (prefix - 0xb7) as usize, len, false)
            }
            0xc0..=0xf7 => (1, (prefix - 0xc0) as usize, true),
            0xf8..=0xff => {
                let len = self.read_long_length((prefix - 0xf7) as usize)?;
                (1 + (prefix - 0xf7) as usize, len, true)
            }
        };

        // A single byte below 0x80 must be encoded as itself.
        let start = if prefix <= 0x7f {
            self.pos
        } else {
            self.pos + header_len
        };
        let end = start.checked_add(payload_len).ok_or_else(|| VesperError::Rlp {
            reason: "item length overflow".into(),
        })?;
        if end > self.data.len() {
            return Err(VesperError::Rlp {
                reason: "item extends past end of input".into(),
            });
        }
        if !is_list && payload_len == 1 && prefix == 0x81 && self.data[start] < 0x80 {
            return Err(VesperError::Rlp {
                reason: "non-canonical single-byte encoding".into(),
            });
        }

        self.pos = end;
        Ok(Item { start, end, is_list })
    }

    fn read_long_length(&self, len_of_len: usize) -> Result<usize> {
        let start = self.pos + 1;
        let end = start + len_of_len;
        if end > self.data.len() {
            return Err(VesperError::Rlp {
                reason: "truncated length field".into(),
            });
        }
        let bytes = &self.data[start..end];
        if bytes.first() == Some(&0) {
            return Err(VesperError::Rlp {
                reason: "length field has leading zero".into(),
            });
        }
        let mut len = 0usize;
        for &b in bytes {
            len = len
                .checked_mul(256)
                .and_then(|l| l.checked_add(b as usize))
                .ok_or_else(|| VesperError::Rlp {
                    reason: "length field overflow".into(),
                })?;
        }
        if len < 56 {
            return Err(VesperError::Rlp {
                reason: "non-canonical long-form length".into(),
            });
        }
        Ok(len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_bytes(&mut out, bytes);
        out
    }

    #[test]
    fn single_low_byte_encodes_as_itself() {
        assert_eq!(encode_one(&[0x7f]), vec![0x7f]);
        assert_eq!(encode_one(&[0x00]), vec![0x00]);
    }

    #[test]
    fn single_high_byte_gets_a_header() {
        assert_eq!(encode_one(&[0x80]), vec![0x81, 0x80]);
    }

    #[test]
    fn empty_string_is_0x80() {
        assert_eq!(encode_one(b""), vec![0x80]);
    }

    #[test]
    fn short_string() {
        assert_eq!(encode_one(b"dog"), vec![0x83, b'd', b'o', b'g']);
    }

    #[test]
    fn long_string_uses_length_of_length() {
        let bytes = vec![0xAA; 60];
        let encoded = encode_one(&bytes);
        assert_eq!(encoded[0], 0xb8);
        assert_eq!(encoded[1], 60);
        assert_eq!(&encoded[2..], bytes.as_slice());
    }

    #[test]
    fn uint_encodings() {
        let mut out = Vec::new();
        encode_uint(&mut out, 0);
        assert_eq!(out, vec![0x80]);

        out.clear();
        encode_uint(&mut out, 0x7f);
        assert_eq!(out, vec![0x7f]);

        out.clear();
        encode_uint(&mut out, 0x80);
        assert_eq!(out, vec![0x81, 0x80]);

        out.clear();
        encode_uint(&mut out, 0x0400);
        assert_eq!(out, vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn uint_roundtrip() -> Result<()> {
        for value in [0u64, 1, 0x7f, 0x80, 0xff, 0x100, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            encode_uint(&mut out, value);
            let mut dec = Decoder::new(&out);
            assert_eq!(dec.take_uint()?, value);
            assert!(dec.is_empty());
        }
        Ok(())
    }

    #[test]
    fn list_roundtrip() -> Result<()> {
        let mut payload = Vec::new();
        encode_uint(&mut payload, 42);
        encode_bytes(&mut payload, b"topic");
        encode_bytes(&mut payload, b"");
        let encoded = wrap_list(&payload);

        let mut dec = Decoder::new(&encoded);
        let mut list = dec.enter_list()?;
        assert!(dec.is_empty());
        assert_eq!(list.take_uint()?, 42);
        assert_eq!(list.take_bytes()?, b"topic");
        assert_eq!(list.take_bytes()?, b"");
        assert!(list.is_empty());
        Ok(())
    }

    #[test]
    fn leading_zero_integer_rejected() {
        // [0x82, 0x00, 0x01] is the non-canonical encoding of 1.
        let mut dec = Decoder::new(&[0x82, 0x00, 0x01]);
        assert!(dec.take_uint().is_err());
    }

    #[test]
    fn non_canonical_single_byte_rejected() {
        // 0x7f must encode as itself, not as [0x81, 0x7f].
        let mut dec = Decoder::new(&[0x81, 0x7f]);
        assert!(dec.take_bytes().is_err());
    }

    #[test]
    fn truncated_input_rejected() {
        let mut dec = Decoder::new(&[0x83, b'd', b'o']);
        assert!(dec.take_bytes().is_err());
    }

    #[test]
    fn string_where_list_expected_rejected() {
        let mut dec = Decoder::new(&[0x83, b'd', b'o', b'g']);
        assert!(dec.enter_list().is_err());
    }

    #[test]
    fn list_where_string_expected_rejected() {
        let encoded = wrap_list(&[]);
        let mut dec = Decoder::new(&encoded);
        assert!(dec.take_bytes().is_err());
    }

    #[test]
    fn oversized_integer_rejected() {
        let mut out = Vec::new();
        encode_bytes(&mut out, &[0x01; 9]);
        let mut dec = Decoder::new(&out);
        assert!(dec.take_uint().is_err());
    }

    #[test]
    fn non_canonical_long_length_rejected() {
        // Long form used for a 3-byte payload.
        let mut dec = Decoder::new(&[0xb8, 0x03, b'd', b'o', b'g']);
        assert!(dec.take_bytes().is_err());
    }
}
