//! Deterministic CBOR encoder for the DAG profile.
//!
//! Integers use the shortest encoding, map keys are emitted sorted
//! length-first then bytewise, floats always use the 8-byte form, and
//! links are written as tag 42 around the identity-prefixed CID bytes.

use crate::error::CodecResult;
use crate::value::Value;

/// Encode a value to deterministic CBOR bytes.
pub fn encode(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.push(value)?;
    Ok(encoder.into_bytes())
}

/// A buffer-building CBOR encoder.
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Append one value to the buffer.
    ///
    /// Frames hold two concatenated objects, so pushing twice onto the
    /// same encoder is the intended way to build one.
    pub fn push(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => self.push_integer(*n),
            Value::Float(f) => {
                self.buffer.push(0xfb);
                self.buffer.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Value::Bytes(bytes) => {
                self.push_header(2, bytes.len() as u64);
                self.buffer.extend_from_slice(bytes);
            }
            Value::Text(text) => {
                self.push_header(3, text.len() as u64);
                self.buffer.extend_from_slice(text.as_bytes());
            }
            Value::Array(items) => {
                self.push_header(4, items.len() as u64);
                for item in items {
                    self.push(item)?;
                }
            }
            Value::Map(pairs) => {
                self.push_header(5, pairs.len() as u64);
                let mut ordered: Vec<&(String, Value)> = pairs.iter().collect();
                ordered.sort_by(|a, b| compare_keys(&a.0, &b.0));
                for (key, value) in ordered {
                    self.push_header(3, key.len() as u64);
                    self.buffer.extend_from_slice(key.as_bytes());
                    self.push(value)?;
                }
            }
            Value::Link(cid) => {
                // Tag 42, byte string with the identity multibase prefix.
                self.buffer.extend_from_slice(&[0xd8, 42]);
                self.push_header(2, cid.as_bytes().len() as u64 + 1);
                self.buffer.push(0x00);
                self.buffer.extend_from_slice(cid.as_bytes());
            }
        }
        Ok(())
    }

    /// Consume the encoder and return the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn push_integer(&mut self, n: i64) {
        if n >= 0 {
            #[allow(clippy::cast_sign_loss)]
            self.push_header(0, n as u64);
        } else {
            #[allow(clippy::cast_sign_loss)]
            self.push_header(1, (-1 - n) as u64);
        }
    }

    fn push_header(&mut self, major_type: u8, argument: u64) {
        let base = major_type << 5;
        if argument <= 23 {
            self.buffer.push(base | argument as u8);
        } else if argument <= 0xff {
            self.buffer.push(base | 24);
            self.buffer.push(argument as u8);
        } else if argument <= 0xffff {
            self.buffer.push(base | 25);
            self.buffer.extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= 0xffff_ffff {
            self.buffer.push(base | 26);
            self.buffer.extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buffer.push(base | 27);
            self.buffer.extend_from_slice(&argument.to_be_bytes());
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map key ordering: length-first, then bytewise.
fn compare_keys(a: &str, b: &str) -> std::cmp::Ordering {
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => a.as_bytes().cmp(b.as_bytes()),
        other => other,
    }
}
