//! Typed event payloads, one per frame kind.
//!
//! Payloads are decoded from the dynamic value model rather than fixed
//! structures: the upstream schema gains fields over time, so unknown
//! fields are ignored and absent optional fields resolve to their zero
//! value. Only the fields that identify an event (`seq`, `repo`/`did`)
//! are required.

use crate::envelope::{Envelope, FrameKind};
use crate::error::{EventError, EventResult};
use crate::operation::RepoOp;
use firehose_codec::{decode, Cid, Value};

/// A decoded frame payload, keyed by the envelope's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Repository commit with record operations.
    Commit(CommitEvent),
    /// Account lifecycle change.
    Account(AccountEvent),
    /// Identity change.
    Identity(IdentityEvent),
    /// Handle change (legacy).
    Handle(HandleEvent),
    /// Repository tombstone (legacy).
    Tombstone(TombstoneEvent),
    /// Informational message, upstream error, or unrecognized kind.
    Info(InfoEvent),
}

impl Payload {
    /// Decode the payload portion of a frame.
    ///
    /// `offset` is where [`Envelope::decode`] stopped. Unknown kinds
    /// (and upstream error frames) decode into the Info variant and
    /// never fail; decode failures for known kinds are event-local.
    pub fn decode(kind: &FrameKind, frame: &[u8], offset: usize) -> EventResult<Self> {
        let rest = frame.get(offset..).unwrap_or(&[]);

        if let FrameKind::Unknown(label) = kind {
            return Ok(Payload::Info(InfoEvent::from_raw(label, rest)));
        }

        let value = decode(rest)
            .map_err(|e| EventError::payload_decode(kind.label(), e.to_string()))?;

        match kind {
            FrameKind::Commit => CommitEvent::from_value(&value).map(Payload::Commit),
            FrameKind::Account => AccountEvent::from_value(&value).map(Payload::Account),
            FrameKind::Identity => IdentityEvent::from_value(&value).map(Payload::Identity),
            FrameKind::Handle => HandleEvent::from_value(&value).map(Payload::Handle),
            FrameKind::Tombstone => TombstoneEvent::from_value(&value).map(Payload::Tombstone),
            FrameKind::Info => Ok(Payload::Info(InfoEvent::from_value(&value, rest))),
            FrameKind::Unknown(_) => unreachable!("handled above"),
        }
    }

    /// The frame kind this payload belongs to.
    pub fn kind(&self) -> FrameKind {
        match self {
            Payload::Commit(_) => FrameKind::Commit,
            Payload::Account(_) => FrameKind::Account,
            Payload::Identity(_) => FrameKind::Identity,
            Payload::Handle(_) => FrameKind::Handle,
            Payload::Tombstone(_) => FrameKind::Tombstone,
            Payload::Info(_) => FrameKind::Info,
        }
    }

    /// The sequence number, for payloads that carry one.
    ///
    /// Info payloads are not sequenced and return `None`.
    pub fn seq(&self) -> Option<i64> {
        match self {
            Payload::Commit(e) => Some(e.seq),
            Payload::Account(e) => Some(e.seq),
            Payload::Identity(e) => Some(e.seq),
            Payload::Handle(e) => Some(e.seq),
            Payload::Tombstone(e) => Some(e.seq),
            Payload::Info(_) => None,
        }
    }
}

/// Decode a complete frame in one step: envelope, then payload.
///
/// Equivalent to calling [`Envelope::decode`] and [`Payload::decode`]
/// yourself; splitting the stages loses no information.
pub fn decode_frame(frame: &[u8]) -> EventResult<(Envelope, Payload)> {
    let (envelope, offset) = Envelope::decode(frame)?;
    let payload = Payload::decode(&envelope.kind, frame, offset)?;
    Ok((envelope, payload))
}

fn require_text(value: &Value, field: &str, kind: &str) -> EventResult<String> {
    value
        .get(field)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| EventError::payload_decode(kind, format!("missing {field}")))
}

fn require_seq(value: &Value, kind: &str) -> EventResult<i64> {
    value
        .get("seq")
        .and_then(Value::as_integer)
        .ok_or_else(|| EventError::payload_decode(kind, "missing seq"))
}

fn optional_text(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_text).map(str::to_string)
}

/// A repository commit: one or more record mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEvent {
    /// Repository identifier (the account DID).
    pub repo: String,
    /// Stream sequence number. Non-decreasing across a session; may
    /// repeat on redelivery.
    pub seq: i64,
    /// Revision of the repository after this commit.
    pub rev: String,
    /// Revision of the preceding commit, when known.
    pub since: Option<String>,
    /// Reference to the commit object inside `blocks`.
    pub commit: Option<Cid>,
    /// Event timestamp as delivered (RFC 3339 text).
    pub time: String,
    /// When set, the commit was too large and `ops` may be incomplete
    /// or empty; callers must not assume completeness.
    pub too_big: bool,
    /// Whether this commit rebases the repository.
    pub rebase: bool,
    /// Ordered record operations.
    pub ops: Vec<RepoOp>,
    /// Content-addressed archive holding the referenced record blocks.
    pub blocks: Vec<u8>,
}

impl CommitEvent {
    /// Decode from the payload's wire map.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        const KIND: &str = "#commit";

        let ops = match value.get("ops").and_then(Value::as_array) {
            Some(entries) => entries
                .iter()
                .map(RepoOp::from_value)
                .collect::<EventResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            repo: require_text(value, "repo", KIND)?,
            seq: require_seq(value, KIND)?,
            rev: optional_text(value, "rev").unwrap_or_default(),
            since: optional_text(value, "since"),
            commit: value.get("commit").and_then(Value::as_link).cloned(),
            time: optional_text(value, "time").unwrap_or_default(),
            too_big: value
                .get("tooBig")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            rebase: value
                .get("rebase")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            ops,
            blocks: value
                .get("blocks")
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        })
    }

    /// Encode back to the wire map (fixture support).
    pub fn to_value(&self) -> Value {
        let mut pairs = vec![
            ("repo", Value::from(self.repo.as_str())),
            ("seq", Value::Integer(self.seq)),
            ("rev", Value::from(self.rev.as_str())),
            ("time", Value::from(self.time.as_str())),
            ("tooBig", Value::Bool(self.too_big)),
            ("rebase", Value::Bool(self.rebase)),
            (
                "ops",
                Value::Array(self.ops.iter().map(RepoOp::to_value).collect()),
            ),
            ("blocks", Value::Bytes(self.blocks.clone())),
        ];
        if let Some(since) = &self.since {
            pairs.push(("since", Value::from(since.as_str())));
        }
        if let Some(commit) = &self.commit {
            pairs.push(("commit", Value::Link(commit.clone())));
        }
        Value::map(pairs)
    }
}

/// An account lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEvent {
    /// Stream sequence number.
    pub seq: i64,
    /// Account DID.
    pub did: String,
    /// Event timestamp as delivered.
    pub time: String,
    /// Whether the account is currently active.
    pub active: bool,
    /// Status detail when inactive (takendown, suspended, ...).
    pub status: Option<String>,
}

impl AccountEvent {
    /// Decode from the payload's wire map.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        const KIND: &str = "#account";
        Ok(Self {
            seq: require_seq(value, KIND)?,
            did: require_text(value, "did", KIND)?,
            time: optional_text(value, "time").unwrap_or_default(),
            active: value
                .get("active")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            status: optional_text(value, "status"),
        })
    }
}

/// An identity change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEvent {
    /// Stream sequence number.
    pub seq: i64,
    /// Account DID.
    pub did: String,
    /// Event timestamp as delivered.
    pub time: String,
    /// The account's current handle, when included.
    pub handle: Option<String>,
}

impl IdentityEvent {
    /// Decode from the payload's wire map.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        const KIND: &str = "#identity";
        Ok(Self {
            seq: require_seq(value, KIND)?,
            did: require_text(value, "did", KIND)?,
            time: optional_text(value, "time").unwrap_or_default(),
            handle: optional_text(value, "handle"),
        })
    }
}

/// A handle change notification (legacy event kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEvent {
    /// Stream sequence number.
    pub seq: i64,
    /// Account DID.
    pub did: String,
    /// The new handle.
    pub handle: String,
    /// Event timestamp as delivered.
    pub time: String,
}

impl HandleEvent {
    /// Decode from the payload's wire map.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        const KIND: &str = "#handle";
        Ok(Self {
            seq: require_seq(value, KIND)?,
            did: require_text(value, "did", KIND)?,
            handle: require_text(value, "handle", KIND)?,
            time: optional_text(value, "time").unwrap_or_default(),
        })
    }
}

/// A repository tombstone notification (legacy event kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneEvent {
    /// Stream sequence number.
    pub seq: i64,
    /// Account DID.
    pub did: String,
    /// Event timestamp as delivered.
    pub time: String,
}

impl TombstoneEvent {
    /// Decode from the payload's wire map.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        const KIND: &str = "#tombstone";
        Ok(Self {
            seq: require_seq(value, KIND)?,
            did: require_text(value, "did", KIND)?,
            time: optional_text(value, "time").unwrap_or_default(),
        })
    }
}

/// An informational payload.
///
/// Covers three cases: genuine `#info` messages, upstream error frames,
/// and frames whose kind this consumer does not recognize. The raw
/// payload bytes are always retained so callers can inspect content the
/// typed fields do not cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoEvent {
    /// Message name, upstream error code, or the unrecognized kind label.
    pub name: String,
    /// Human-readable detail, when included.
    pub message: Option<String>,
    /// The raw payload bytes.
    pub raw: Vec<u8>,
}

impl InfoEvent {
    /// Decode a known `#info` payload.
    pub fn from_value(value: &Value, raw: &[u8]) -> Self {
        Self {
            name: optional_text(value, "name")
                .or_else(|| optional_text(value, "error"))
                .unwrap_or_else(|| "#info".to_string()),
            message: optional_text(value, "message"),
            raw: raw.to_vec(),
        }
    }

    /// Carry an unknown or error payload without failing.
    ///
    /// Best-effort: if the remainder decodes as a map, name and message
    /// are lifted from it; otherwise the label alone identifies it.
    pub fn from_raw(label: &str, raw: &[u8]) -> Self {
        if let Ok(value) = decode(raw) {
            let mut info = Self::from_value(&value, raw);
            if info.name == "#info" {
                info.name = label.to_string();
            }
            return info;
        }
        Self {
            name: label.to_string(),
            message: None,
            raw: raw.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{encode_envelope, OP_ERROR, OP_MESSAGE};
    use crate::operation::OpAction;
    use firehose_codec::encode;

    fn test_cid(fill: u8) -> Cid {
        let mut bytes = vec![0x01, 0x71, 0x12, 0x20];
        bytes.extend(std::iter::repeat(fill).take(32));
        Cid::from_bytes(&bytes).unwrap()
    }

    fn commit_frame(event: &CommitEvent) -> Vec<u8> {
        let mut frame = encode_envelope(&FrameKind::Commit, OP_MESSAGE);
        frame.extend_from_slice(&encode(&event.to_value()).unwrap());
        frame
    }

    fn sample_commit() -> CommitEvent {
        CommitEvent {
            repo: "did:plc:ewvi7nxzyoun6zhxrhs64oiz".to_string(),
            seq: 1024,
            rev: "3kb2cqvbs2b2a".to_string(),
            since: Some("3kb2cqvbr7z2k".to_string()),
            commit: Some(test_cid(0x01)),
            time: "2024-01-01T00:00:00Z".to_string(),
            too_big: false,
            rebase: false,
            ops: vec![RepoOp {
                path: "app.bsky.feed.post/3kabc".to_string(),
                action: OpAction::Create,
                cid: Some(test_cid(0x02)),
            }],
            blocks: vec![1, 2, 3],
        }
    }

    #[test]
    fn commit_roundtrip() {
        let event = sample_commit();
        let frame = commit_frame(&event);
        let (envelope, payload) = decode_frame(&frame).unwrap();
        assert_eq!(envelope.kind, FrameKind::Commit);
        assert_eq!(payload, Payload::Commit(event));
    }

    #[test]
    fn staged_decode_equals_one_shot() {
        let frame = commit_frame(&sample_commit());

        let (envelope, offset) = Envelope::decode(&frame).unwrap();
        let staged = Payload::decode(&envelope.kind, &frame, offset).unwrap();
        let (_, one_shot) = decode_frame(&frame).unwrap();

        assert_eq!(staged, one_shot);
    }

    #[test]
    fn commit_optional_fields_default() {
        let value = Value::map(vec![
            ("repo", Value::from("did:plc:abc")),
            ("seq", Value::Integer(5)),
        ]);
        let event = CommitEvent::from_value(&value).unwrap();
        assert_eq!(event.rev, "");
        assert_eq!(event.since, None);
        assert_eq!(event.commit, None);
        assert!(!event.too_big);
        assert!(!event.rebase);
        assert!(event.ops.is_empty());
        assert!(event.blocks.is_empty());
    }

    #[test]
    fn commit_missing_seq_is_payload_error() {
        let value = Value::map(vec![("repo", Value::from("did:plc:abc"))]);
        let err = CommitEvent::from_value(&value).unwrap_err();
        assert!(!err.is_stream_fatal());
    }

    #[test]
    fn commit_unknown_fields_ignored() {
        let value = Value::map(vec![
            ("repo", Value::from("did:plc:abc")),
            ("seq", Value::Integer(5)),
            ("newProtocolField", Value::Array(vec![Value::Integer(1)])),
        ]);
        assert!(CommitEvent::from_value(&value).is_ok());
    }

    #[test]
    fn account_event_decode() {
        let value = Value::map(vec![
            ("seq", Value::Integer(7)),
            ("did", Value::from("did:plc:abc")),
            ("time", Value::from("2024-01-01T00:00:00Z")),
            ("active", Value::Bool(false)),
            ("status", Value::from("takendown")),
        ]);
        let event = AccountEvent::from_value(&value).unwrap();
        assert_eq!(event.seq, 7);
        assert!(!event.active);
        assert_eq!(event.status.as_deref(), Some("takendown"));
    }

    #[test]
    fn identity_and_handle_and_tombstone_decode() {
        let identity = IdentityEvent::from_value(&Value::map(vec![
            ("seq", Value::Integer(1)),
            ("did", Value::from("did:plc:a")),
            ("handle", Value::from("alice.example.com")),
        ]))
        .unwrap();
        assert_eq!(identity.handle.as_deref(), Some("alice.example.com"));

        let handle = HandleEvent::from_value(&Value::map(vec![
            ("seq", Value::Integer(2)),
            ("did", Value::from("did:plc:b")),
            ("handle", Value::from("bob.example.com")),
        ]))
        .unwrap();
        assert_eq!(handle.handle, "bob.example.com");

        let tombstone = TombstoneEvent::from_value(&Value::map(vec![
            ("seq", Value::Integer(3)),
            ("did", Value::from("did:plc:c")),
        ]))
        .unwrap();
        assert_eq!(tombstone.seq, 3);
    }

    #[test]
    fn unknown_kind_decodes_to_info() {
        let mut frame = encode_envelope(&FrameKind::Unknown("#mergeCommit".to_string()), OP_MESSAGE);
        frame.extend_from_slice(
            &encode(&Value::map(vec![("seq", Value::Integer(10))])).unwrap(),
        );

        let (envelope, payload) = decode_frame(&frame).unwrap();
        assert_eq!(envelope.kind, FrameKind::Unknown("#mergeCommit".to_string()));
        match payload {
            Payload::Info(info) => {
                assert_eq!(info.name, "#mergeCommit");
                assert!(!info.raw.is_empty());
            }
            other => panic!("expected Info, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_with_garbage_payload_still_decodes() {
        let mut frame = encode_envelope(&FrameKind::Unknown("#future".to_string()), OP_MESSAGE);
        frame.extend_from_slice(&[0xff, 0xff, 0xff]);

        let (_, payload) = decode_frame(&frame).unwrap();
        match payload {
            Payload::Info(info) => {
                assert_eq!(info.name, "#future");
                assert_eq!(info.raw, vec![0xff, 0xff, 0xff]);
            }
            other => panic!("expected Info, got {other:?}"),
        }
    }

    #[test]
    fn error_frame_decodes_to_info_with_code() {
        let header = Value::map(vec![("op", Value::Integer(OP_ERROR))]);
        let mut frame = encode(&header).unwrap();
        frame.extend_from_slice(
            &encode(&Value::map(vec![
                ("error", Value::from("ConsumerTooSlow")),
                ("message", Value::from("client fell behind")),
            ]))
            .unwrap(),
        );

        let (envelope, payload) = decode_frame(&frame).unwrap();
        assert!(envelope.is_error());
        match payload {
            Payload::Info(info) => {
                assert_eq!(info.name, "ConsumerTooSlow");
                assert_eq!(info.message.as_deref(), Some("client fell behind"));
            }
            other => panic!("expected Info, got {other:?}"),
        }
    }

    #[test]
    fn payload_seq_accessor() {
        let frame = commit_frame(&sample_commit());
        let (_, payload) = decode_frame(&frame).unwrap();
        assert_eq!(payload.seq(), Some(1024));
        assert_eq!(payload.kind(), FrameKind::Commit);

        let info = Payload::Info(InfoEvent::from_raw("#x", &[]));
        assert_eq!(info.seq(), None);
    }
}
