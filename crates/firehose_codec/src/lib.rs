//! # Firehose Codec
//!
//! Decoding primitives for the firehose wire format: a DAG-profile CBOR
//! value model, binary content identifiers, and content-addressed
//! archives.
//!
//! The decoder is tolerant where the stream demands it (field order,
//! unknown fields, non-shortest encodings) and strict where safety
//! demands it (definite lengths only, bounded allocation and nesting).
//! Decoding is total: any byte input produces a value or an error,
//! never a panic.
//!
//! ## Usage
//!
//! ```
//! use firehose_codec::{decode, decode_prefix, encode, Value};
//!
//! let value = Value::map(vec![("seq", Value::Integer(7))]);
//! let bytes = encode(&value).unwrap();
//!
//! // One-shot decode...
//! assert_eq!(decode(&bytes).unwrap(), value);
//!
//! // ...or prefix decode, for buffers holding two concatenated objects.
//! let (decoded, offset) = decode_prefix(&bytes).unwrap();
//! assert_eq!(decoded, value);
//! assert_eq!(offset, bytes.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod car;
mod cid;
mod decoder;
mod encoder;
mod error;
mod value;

pub use car::{write_car, CarBlocks, CarReader};
pub use cid::{read_varint, write_varint, Cid};
pub use decoder::{decode, decode_prefix, Decoder};
pub use encoder::{encode, Encoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;
