//! Streaming CBOR decoder for the DAG profile.
//!
//! The decoder is deliberately tolerant of non-canonical input (field
//! order, non-shortest integer encodings) because the upstream service
//! evolves independently and its frames are not ours to police. It still
//! rejects indefinite-length items, which the profile forbids, and it
//! bounds allocation and nesting so arbitrary bytes cannot exhaust
//! memory or the stack.

use crate::cid::Cid;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decode a single value from exactly the given bytes.
///
/// # Errors
///
/// Returns an error on malformed input or if bytes remain after the
/// first value; use [`decode_prefix`] for buffers that hold more than
/// one concatenated object.
pub fn decode(bytes: &[u8]) -> CodecResult<Value> {
    let (value, consumed) = decode_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(CodecError::invalid_structure(
            "trailing bytes after value",
        ));
    }
    Ok(value)
}

/// Decode the first value in the buffer, returning it and its end offset.
///
/// The offset lets a caller decode a second concatenated object from the
/// same buffer, which is how wire frames carry a header followed by a
/// payload.
pub fn decode_prefix(bytes: &[u8]) -> CodecResult<(Value, usize)> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode()?;
    Ok((value, decoder.position()))
}

/// Maximum element count for arrays and maps.
/// Guards against allocation exhaustion from untrusted length claims.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum byte/text string length.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting depth for arrays, maps, and tags.
const MAX_DEPTH: usize = 128;

/// Tag number for content links.
const LINK_TAG: u64 = 42;

/// A cursor-based CBOR decoder.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        self.decode_at_depth(0)
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn decode_at_depth(&mut self, depth: usize) -> CodecResult<Value> {
        if depth > MAX_DEPTH {
            return Err(CodecError::DepthLimitExceeded { max: MAX_DEPTH });
        }

        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => self
                .decode_unsigned(additional_info)
                .map(|n| Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))),
            1 => self.decode_unsigned(additional_info).map(|n| {
                // Negative integer: value is -(n + 1).
                if i64::try_from(n).is_ok() {
                    #[allow(clippy::cast_possible_wrap)]
                    Value::Integer(-(n as i64) - 1)
                } else {
                    Value::Integer(i64::MIN)
                }
            }),
            2 => self.decode_bytes(additional_info),
            3 => self.decode_text(additional_info),
            4 => self.decode_array(additional_info, depth),
            5 => self.decode_map(additional_info, depth),
            6 => self.decode_tagged(additional_info, depth),
            7 => self.decode_simple(additional_info),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    #[inline]
    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => self.read_byte().map(u64::from),
            25 => {
                let bytes = self.read_bytes(2)?;
                Ok(u64::from(u16::from_be_bytes([bytes[0], bytes[1]])))
            }
            26 => {
                let bytes = self.read_bytes(4)?;
                Ok(u64::from(u32::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            27 => {
                let bytes = self.read_bytes(8)?;
                Ok(u64::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]))
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            31 => Err(CodecError::IndefiniteLengthForbidden),
            _ => unreachable!(),
        }
    }

    fn decode_len(&mut self, additional_info: u8, max: u64) -> CodecResult<usize> {
        if additional_info == 31 {
            return Err(CodecError::IndefiniteLengthForbidden);
        }
        let len = self.decode_unsigned(additional_info)?;
        if len > max {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: max,
            });
        }
        Ok(len as usize)
    }

    fn decode_bytes(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_len(additional_info, MAX_BYTES_LENGTH)?;
        Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
    }

    fn decode_text(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_len(additional_info, MAX_BYTES_LENGTH)?;
        let bytes = self.read_bytes(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(Value::Text(text.to_string()))
    }

    fn decode_array(&mut self, additional_info: u8, depth: usize) -> CodecResult<Value> {
        let len = self.decode_len(additional_info, MAX_CONTAINER_ELEMENTS)?;
        // Cap the pre-allocation; each element needs at least one byte.
        let mut items = Vec::with_capacity(len.min(self.data.len().saturating_sub(self.pos)));
        for _ in 0..len {
            items.push(self.decode_at_depth(depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8, depth: usize) -> CodecResult<Value> {
        let len = self.decode_len(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(self.data.len().saturating_sub(self.pos)));
        for _ in 0..len {
            let key = match self.decode_at_depth(depth + 1)? {
                Value::Text(key) => key,
                other => {
                    return Err(CodecError::invalid_structure(format!(
                        "map key must be text, got {other:?}"
                    )))
                }
            };
            let value = self.decode_at_depth(depth + 1)?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    fn decode_tagged(&mut self, additional_info: u8, depth: usize) -> CodecResult<Value> {
        let tag = self.decode_unsigned(additional_info)?;
        let inner = self.decode_at_depth(depth + 1)?;

        if tag != LINK_TAG {
            // Unknown tags are transparent: keep the inner value.
            return Ok(inner);
        }

        // Tag 42 wraps the binary CID with a multibase identity prefix.
        match inner {
            Value::Bytes(bytes) => match bytes.split_first() {
                Some((0x00, cid_bytes)) => Ok(Value::Link(Cid::from_bytes(cid_bytes)?)),
                Some(_) => Err(CodecError::invalid_cid(
                    "link must use the identity multibase prefix",
                )),
                None => Err(CodecError::invalid_cid("empty link payload")),
            },
            _ => Err(CodecError::invalid_cid("link payload must be a byte string")),
        }
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            // undefined - treat as null
            23 => Ok(Value::Null),
            24 => {
                let simple = self.read_byte()?;
                Err(CodecError::unsupported_type(format!(
                    "simple value {simple}"
                )))
            }
            25 => {
                let bytes = self.read_bytes(2)?;
                let bits = u16::from_be_bytes([bytes[0], bytes[1]]);
                Ok(Value::Float(f16_to_f64(bits)))
            }
            26 => {
                let bytes = self.read_bytes(4)?;
                let bits = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Ok(Value::Float(f64::from(f32::from_bits(bits))))
            }
            27 => {
                let bytes = self.read_bytes(8)?;
                let bits = u64::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]);
                Ok(Value::Float(f64::from_bits(bits)))
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!(
                "simple value {additional_info}"
            ))),
        }
    }
}

/// Convert half-precision float bits to f64.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = (bits >> 10) & 0x1f;
    let frac = bits & 0x3ff;
    let magnitude = match exp {
        0 => f64::from(frac) * (-24f64).exp2(),
        31 => {
            if frac == 0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => (1.0 + f64::from(frac) / 1024.0) * f64::from(i32::from(exp) - 15).exp2(),
    };
    sign * magnitude
}
