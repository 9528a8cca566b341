//! Frame envelope: the leading fixed-shape header of every wire message.

use crate::error::{EventError, EventResult};
use firehose_codec::{decode_prefix, Value};

/// Operation code for regular messages.
pub const OP_MESSAGE: i64 = 1;

/// Operation code for upstream error frames.
pub const OP_ERROR: i64 = -1;

/// The semantic kind of a frame, from the envelope discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Repository commit with record operations.
    Commit,
    /// Account lifecycle change.
    Account,
    /// Identity (DID document) change.
    Identity,
    /// Handle change (legacy).
    Handle,
    /// Repository tombstone (legacy).
    Tombstone,
    /// Informational message from the upstream service.
    Info,
    /// A discriminator this consumer does not recognize.
    ///
    /// Kept as its label so the payload can still be carried through as
    /// an Info variant; the upstream protocol evolves independently.
    Unknown(String),
}

impl FrameKind {
    /// Map a discriminator label to a kind.
    pub fn from_label(label: &str) -> Self {
        match label {
            "#commit" => FrameKind::Commit,
            "#account" => FrameKind::Account,
            "#identity" => FrameKind::Identity,
            "#handle" => FrameKind::Handle,
            "#tombstone" => FrameKind::Tombstone,
            "#info" => FrameKind::Info,
            other => FrameKind::Unknown(other.to_string()),
        }
    }

    /// The wire label for this kind.
    pub fn label(&self) -> &str {
        match self {
            FrameKind::Commit => "#commit",
            FrameKind::Account => "#account",
            FrameKind::Identity => "#identity",
            FrameKind::Handle => "#handle",
            FrameKind::Tombstone => "#tombstone",
            FrameKind::Info => "#info",
            FrameKind::Unknown(label) => label,
        }
    }
}

/// The decoded envelope of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Frame kind from the `t` discriminator.
    pub kind: FrameKind,
    /// Operation code (`1` message, `-1` upstream error).
    pub op: i64,
}

impl Envelope {
    /// Decode the envelope at the head of a frame.
    ///
    /// Returns the envelope and the offset where the payload begins, so
    /// payload decoding continues from the same cursor without
    /// re-buffering. Unknown header fields are ignored.
    ///
    /// # Errors
    ///
    /// [`EventError::MalformedEnvelope`] when the header is not a map,
    /// the `op` field is absent or mistyped, or the `t` discriminator is
    /// absent on a message frame. These are stream-fatal.
    pub fn decode(frame: &[u8]) -> EventResult<(Self, usize)> {
        let (header, offset) = decode_prefix(frame)
            .map_err(|e| EventError::malformed_envelope(e.to_string()))?;

        if header.as_map().is_none() {
            return Err(EventError::malformed_envelope("header is not a map"));
        }

        let op = match header.get("op") {
            Some(value) => value
                .as_integer()
                .ok_or_else(|| EventError::malformed_envelope("op is not an integer"))?,
            None => return Err(EventError::malformed_envelope("missing op field")),
        };

        let kind = match header.get("t") {
            Some(value) => {
                let label = value
                    .as_text()
                    .ok_or_else(|| EventError::malformed_envelope("t is not a string"))?;
                FrameKind::from_label(label)
            }
            // Error frames carry no discriminator; everything else must.
            None if op == OP_ERROR => FrameKind::Unknown("#error".to_string()),
            None => return Err(EventError::malformed_envelope("missing t discriminator")),
        };

        Ok((Envelope { kind, op }, offset))
    }

    /// Whether this envelope announces an upstream error payload.
    pub fn is_error(&self) -> bool {
        self.op == OP_ERROR
    }
}

/// Encode an envelope header (test and fixture support).
pub fn encode_envelope(kind: &FrameKind, op: i64) -> Vec<u8> {
    let header = Value::map(vec![
        ("op", Value::Integer(op)),
        ("t", Value::from(kind.label())),
    ]);
    // The value contains no links or floats; encoding cannot fail.
    firehose_codec::encode(&header).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use firehose_codec::encode;

    #[test]
    fn kind_labels_roundtrip() {
        for label in ["#commit", "#account", "#identity", "#handle", "#tombstone", "#info"] {
            let kind = FrameKind::from_label(label);
            assert!(!matches!(kind, FrameKind::Unknown(_)));
            assert_eq!(kind.label(), label);
        }
        let kind = FrameKind::from_label("#brandNew");
        assert_eq!(kind, FrameKind::Unknown("#brandNew".to_string()));
        assert_eq!(kind.label(), "#brandNew");
    }

    #[test]
    fn decode_message_envelope() {
        let frame = encode_envelope(&FrameKind::Commit, OP_MESSAGE);
        let (envelope, offset) = Envelope::decode(&frame).unwrap();
        assert_eq!(envelope.kind, FrameKind::Commit);
        assert_eq!(envelope.op, OP_MESSAGE);
        assert_eq!(offset, frame.len());
        assert!(!envelope.is_error());
    }

    #[test]
    fn payload_offset_points_past_header() {
        let mut frame = encode_envelope(&FrameKind::Account, OP_MESSAGE);
        let header_len = frame.len();
        frame.extend_from_slice(&encode(&Value::map(vec![("seq", Value::Integer(9))])).unwrap());

        let (_, offset) = Envelope::decode(&frame).unwrap();
        assert_eq!(offset, header_len);
        let payload = firehose_codec::decode(&frame[offset..]).unwrap();
        assert_eq!(payload.get("seq"), Some(&Value::Integer(9)));
    }

    #[test]
    fn error_frame_without_discriminator() {
        let header = Value::map(vec![("op", Value::Integer(OP_ERROR))]);
        let frame = encode(&header).unwrap();
        let (envelope, _) = Envelope::decode(&frame).unwrap();
        assert!(envelope.is_error());
        assert_eq!(envelope.kind, FrameKind::Unknown("#error".to_string()));
    }

    #[test]
    fn missing_discriminator_is_fatal() {
        let header = Value::map(vec![("op", Value::Integer(OP_MESSAGE))]);
        let frame = encode(&header).unwrap();
        let err = Envelope::decode(&frame).unwrap_err();
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn mistyped_discriminator_is_fatal() {
        let header = Value::map(vec![
            ("op", Value::Integer(OP_MESSAGE)),
            ("t", Value::Integer(3)),
        ]);
        let frame = encode(&header).unwrap();
        let err = Envelope::decode(&frame).unwrap_err();
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn missing_op_is_fatal() {
        let header = Value::map(vec![("t", Value::from("#commit"))]);
        let frame = encode(&header).unwrap();
        assert!(Envelope::decode(&frame).unwrap_err().is_stream_fatal());
    }

    #[test]
    fn garbage_bytes_are_fatal() {
        // 0xff is an invalid initial byte sequence for this profile.
        let err = Envelope::decode(&[0xff, 0x00, 0x01]).unwrap_err();
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn unknown_header_fields_ignored() {
        let header = Value::map(vec![
            ("op", Value::Integer(OP_MESSAGE)),
            ("t", Value::from("#commit")),
            ("futureField", Value::from("ignored")),
        ]);
        let frame = encode(&header).unwrap();
        let (envelope, _) = Envelope::decode(&frame).unwrap();
        assert_eq!(envelope.kind, FrameKind::Commit);
    }
}
