//! # Firehose Events
//!
//! Wire types for the firehose event stream: the two-stage frame
//! decoder (envelope header, then kind-specific payload) and the typed
//! event model.
//!
//! Every frame is two concatenated self-describing objects. The
//! envelope identifies the frame's kind; the payload decodes into one
//! of the [`Payload`] variants. Unknown kinds never fail — they carry
//! through as [`InfoEvent`] so new upstream event kinds do not break
//! consumers.
//!
//! ```
//! use firehose_events::{decode_frame, encode_envelope, FrameKind, Payload, OP_MESSAGE};
//! use firehose_codec::{encode, Value};
//!
//! let mut frame = encode_envelope(&FrameKind::Account, OP_MESSAGE);
//! frame.extend_from_slice(&encode(&Value::map(vec![
//!     ("seq", Value::Integer(1)),
//!     ("did", Value::from("did:plc:abc")),
//! ])).unwrap());
//!
//! let (envelope, payload) = decode_frame(&frame).unwrap();
//! assert_eq!(envelope.kind, FrameKind::Account);
//! assert_eq!(payload.seq(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod event;
mod error;
mod operation;

pub use envelope::{encode_envelope, Envelope, FrameKind, OP_ERROR, OP_MESSAGE};
pub use event::{
    decode_frame, AccountEvent, CommitEvent, HandleEvent, IdentityEvent, InfoEvent, Payload,
    TombstoneEvent,
};
pub use error::{EventError, EventResult};
pub use operation::{OpAction, RepoOp};
