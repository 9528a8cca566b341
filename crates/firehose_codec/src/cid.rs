//! Binary content identifiers and unsigned varints.

use crate::error::{CodecError, CodecResult};

/// Maximum bytes in a single unsigned varint (enough for a full u64).
const MAX_VARINT_LEN: usize = 10;

/// Read an unsigned LEB128 varint from `data` starting at `pos`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_varint(data: &[u8], pos: usize) -> CodecResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &byte) in data[pos.min(data.len())..].iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(CodecError::invalid_structure("varint too long"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }

    Err(CodecError::UnexpectedEof)
}

/// Append an unsigned LEB128 varint to `out`.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Multicodec code for sha2-256.
const SHA2_256: u64 = 0x12;

/// A binary content identifier.
///
/// Stored in raw binary form (no multibase prefix). Both the v1 layout
/// (version varint, codec varint, multihash) and the legacy v0 layout
/// (a bare sha2-256 multihash) are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid {
    bytes: Vec<u8>,
    version: u64,
    codec: u64,
}

impl Cid {
    /// Parse a CID from exactly the given bytes.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let (cid, consumed) = Self::read(bytes, 0)?;
        if consumed != bytes.len() {
            return Err(CodecError::invalid_cid("trailing bytes after CID"));
        }
        Ok(cid)
    }

    /// Parse a CID from `data` starting at `pos`.
    ///
    /// Returns the CID and the number of bytes consumed, so callers can
    /// continue reading a larger structure (an archive section header)
    /// from the same buffer.
    pub fn read(data: &[u8], pos: usize) -> CodecResult<(Self, usize)> {
        let buf = data.get(pos..).ok_or(CodecError::UnexpectedEof)?;

        // Legacy v0: bare sha2-256 multihash, always 34 bytes.
        if buf.len() >= 2 && buf[0] == 0x12 && buf[1] == 0x20 {
            let raw = buf.get(..34).ok_or(CodecError::UnexpectedEof)?;
            return Ok((
                Self {
                    bytes: raw.to_vec(),
                    version: 0,
                    codec: 0x70,
                },
                34,
            ));
        }

        let mut cursor = 0;
        let (version, n) = read_varint(buf, cursor)?;
        cursor += n;
        if version != 1 {
            return Err(CodecError::invalid_cid(format!(
                "unsupported version {version}"
            )));
        }

        let (codec, n) = read_varint(buf, cursor)?;
        cursor += n;

        // Multihash: hash function code, digest length, digest.
        let (hash_code, n) = read_varint(buf, cursor)?;
        cursor += n;
        let (digest_len, n) = read_varint(buf, cursor)?;
        cursor += n;

        if hash_code == SHA2_256 && digest_len != 32 {
            return Err(CodecError::invalid_cid(format!(
                "sha2-256 digest must be 32 bytes, got {digest_len}"
            )));
        }
        let digest_len = usize::try_from(digest_len)
            .map_err(|_| CodecError::invalid_cid("digest length overflow"))?;
        if digest_len > 128 {
            return Err(CodecError::invalid_cid("digest length exceeds limit"));
        }

        let end = cursor
            .checked_add(digest_len)
            .ok_or_else(|| CodecError::invalid_cid("digest length overflow"))?;
        if end > buf.len() {
            return Err(CodecError::UnexpectedEof);
        }

        Ok((
            Self {
                bytes: buf[..end].to_vec(),
                version,
                codec,
            },
            end,
        ))
    }

    /// The raw binary form of this CID.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The CID version (0 or 1).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The multicodec code of the addressed content.
    pub fn codec(&self) -> u64 {
        self.codec
    }
}

impl std::fmt::Display for Cid {
    /// Formats as lowercase base32 (no padding) with the `b` multibase
    /// prefix, matching the common textual form for v1 CIDs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

        f.write_str("b")?;
        let mut acc: u32 = 0;
        let mut bits: u32 = 0;
        for &byte in &self.bytes {
            acc = (acc << 8) | u32::from(byte);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                let idx = ((acc >> bits) & 0x1f) as usize;
                f.write_str(std::str::from_utf8(&ALPHABET[idx..=idx]).unwrap_or("?"))?;
            }
        }
        if bits > 0 {
            let idx = ((acc << (5 - bits)) & 0x1f) as usize;
            f.write_str(std::str::from_utf8(&ALPHABET[idx..=idx]).unwrap_or("?"))?;
        }
        Ok(())
    }
}
