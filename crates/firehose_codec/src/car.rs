//! Content-addressed archive (CAR v1) reading and writing.
//!
//! An archive is a varint-length-prefixed DAG-CBOR header
//! (`{version, roots}`) followed by sections, each a varint total
//! length, a binary CID, and the block bytes. Commits carry their
//! record blocks in this form.

use crate::cid::{read_varint, write_varint, Cid};
use crate::decoder::decode;
use crate::encoder::encode;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Maximum allowed header length.
const MAX_HEADER_LEN: u64 = 1024 * 1024;

/// Maximum allowed section length.
const MAX_SECTION_LEN: u64 = 256 * 1024 * 1024;

/// A lazy reader over a content-addressed archive.
///
/// Construction parses only the header. Blocks are visited on demand;
/// [`CarReader::find`] compares CID bytes without decoding any block
/// content, so looking up a single record does not pay for the rest of
/// the archive.
pub struct CarReader<'a> {
    data: &'a [u8],
    body: usize,
    version: i64,
    roots: Vec<Cid>,
}

impl<'a> CarReader<'a> {
    /// Parse the archive header.
    pub fn new(data: &'a [u8]) -> CodecResult<Self> {
        let (header_len, n) = read_varint(data, 0)?;
        if header_len > MAX_HEADER_LEN {
            return Err(CodecError::SizeLimitExceeded {
                claimed: header_len,
                max_allowed: MAX_HEADER_LEN,
            });
        }
        let header_len = header_len as usize;
        let header_end = n
            .checked_add(header_len)
            .ok_or_else(|| CodecError::invalid_archive("header length overflow"))?;
        let header_bytes = data
            .get(n..header_end)
            .ok_or(CodecError::UnexpectedEof)?;

        let header = decode(header_bytes)?;
        let version = header
            .get("version")
            .and_then(Value::as_integer)
            .ok_or_else(|| CodecError::invalid_archive("header missing version"))?;
        if version != 1 {
            return Err(CodecError::invalid_archive(format!(
                "unsupported archive version {version}"
            )));
        }

        let roots = header
            .get("roots")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|v| v.as_link().cloned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            data,
            body: header_end,
            version,
            roots,
        })
    }

    /// The archive format version.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Root CIDs declared by the header.
    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Find the block addressed by `cid`, returning its raw bytes.
    ///
    /// Scans sections in order and stops at the first match; blocks that
    /// do not match are skipped by length without being decoded.
    pub fn find(&self, cid: &Cid) -> CodecResult<Option<&'a [u8]>> {
        for entry in self.blocks() {
            let (block_cid, bytes) = entry?;
            if block_cid.as_bytes() == cid.as_bytes() {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    /// Iterate over all `(cid, bytes)` sections.
    pub fn blocks(&self) -> CarBlocks<'a> {
        CarBlocks {
            data: self.data,
            pos: self.body,
            failed: false,
        }
    }
}

/// Iterator over archive sections.
pub struct CarBlocks<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> CarBlocks<'a> {
    fn next_section(&mut self) -> CodecResult<Option<(Cid, &'a [u8])>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let (section_len, n) = read_varint(self.data, self.pos)?;
        if section_len > MAX_SECTION_LEN {
            return Err(CodecError::SizeLimitExceeded {
                claimed: section_len,
                max_allowed: MAX_SECTION_LEN,
            });
        }
        let start = self.pos + n;
        let end = start
            .checked_add(section_len as usize)
            .ok_or_else(|| CodecError::invalid_archive("section length overflow"))?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }

        let (cid, cid_len) = Cid::read(&self.data[start..end], 0)?;
        self.pos = end;
        Ok(Some((cid, &self.data[start + cid_len..end])))
    }
}

impl<'a> Iterator for CarBlocks<'a> {
    type Item = CodecResult<(Cid, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_section() {
            Ok(Some(section)) => Some(Ok(section)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Serialize an archive from roots and blocks.
///
/// Used by tests and fixture builders; the consumer itself only reads.
pub fn write_car(roots: &[Cid], blocks: &[(Cid, Vec<u8>)]) -> CodecResult<Vec<u8>> {
    let header = Value::map(vec![
        (
            "roots",
            Value::Array(roots.iter().cloned().map(Value::Link).collect()),
        ),
        ("version", Value::Integer(1)),
    ]);
    let header_bytes = encode(&header)?;

    let mut out = Vec::new();
    write_varint(&mut out, header_bytes.len() as u64);
    out.extend_from_slice(&header_bytes);

    for (cid, bytes) in blocks {
        let section_len = cid.as_bytes().len() + bytes.len();
        write_varint(&mut out, section_len as u64);
        out.extend_from_slice(cid.as_bytes());
        out.extend_from_slice(bytes);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cid(fill: u8) -> Cid {
        let mut bytes = vec![0x01, 0x71, 0x12, 0x20];
        bytes.extend(std::iter::repeat(fill).take(32));
        Cid::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn roundtrip_archive() {
        let root = test_cid(0x01);
        let blocks = vec![
            (test_cid(0x01), b"first block".to_vec()),
            (test_cid(0x02), b"second block".to_vec()),
        ];
        let bytes = write_car(&[root.clone()], &blocks).unwrap();

        let reader = CarReader::new(&bytes).unwrap();
        assert_eq!(reader.version(), 1);
        assert_eq!(reader.roots(), &[root]);

        let all: Vec<_> = reader.blocks().map(|b| b.unwrap()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].1, b"first block");
        assert_eq!(all[1].1, b"second block");
    }

    #[test]
    fn find_returns_matching_block() {
        let blocks = vec![
            (test_cid(0x01), b"one".to_vec()),
            (test_cid(0x02), b"two".to_vec()),
        ];
        let bytes = write_car(&[], &blocks).unwrap();
        let reader = CarReader::new(&bytes).unwrap();

        assert_eq!(reader.find(&test_cid(0x02)).unwrap(), Some(&b"two"[..]));
        assert_eq!(reader.find(&test_cid(0x03)).unwrap(), None);
    }

    #[test]
    fn find_is_idempotent() {
        let blocks = vec![(test_cid(0x07), b"stable".to_vec())];
        let bytes = write_car(&[], &blocks).unwrap();
        let reader = CarReader::new(&bytes).unwrap();

        let first = reader.find(&test_cid(0x07)).unwrap();
        let second = reader.find(&test_cid(0x07)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(&b"stable"[..]));
    }

    #[test]
    fn empty_archive_has_no_blocks() {
        let bytes = write_car(&[], &[]).unwrap();
        let reader = CarReader::new(&bytes).unwrap();
        assert_eq!(reader.blocks().count(), 0);
        assert_eq!(reader.find(&test_cid(0x01)).unwrap(), None);
    }

    #[test]
    fn truncated_section_is_error() {
        let blocks = vec![(test_cid(0x01), b"data".to_vec())];
        let mut bytes = write_car(&[], &blocks).unwrap();
        bytes.truncate(bytes.len() - 2);

        let reader = CarReader::new(&bytes).unwrap();
        assert!(reader.find(&test_cid(0x01)).is_err());
    }

    #[test]
    fn missing_version_is_error() {
        // Header without a version field.
        let header = encode(&Value::map(vec![("roots", Value::Array(vec![]))])).unwrap();
        let mut bytes = Vec::new();
        write_varint(&mut bytes, header.len() as u64);
        bytes.extend_from_slice(&header);

        assert!(matches!(
            CarReader::new(&bytes),
            Err(CodecError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let blocks = vec![(test_cid(0x01), b"ok".to_vec())];
        let mut bytes = write_car(&[], &blocks).unwrap();
        // Dangling varint promising a section that never arrives.
        bytes.push(0x20);

        let reader = CarReader::new(&bytes).unwrap();
        let results: Vec<_> = reader.blocks().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
