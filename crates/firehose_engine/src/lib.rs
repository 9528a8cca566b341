//! Resumable consumer engine for a CBOR event firehose.
//!
//! Connects to a subscription endpoint over websocket, decodes each
//! binary frame into a typed event, resolves record content out of
//! commit block archives, and dispatches to caller-supplied handlers.
//! A monotonic cursor tracks the last fully dispatched sequence so a
//! reconnect or restart resumes with at-least-once delivery.
//!
//! # Example
//!
//! ```no_run
//! use firehose_engine::{Handlers, Session, SubscriberConfig, TextPost, WsConnector};
//!
//! # async fn demo() -> Result<(), firehose_engine::SubscribeError> {
//! let config = SubscriberConfig::new("wss://relay.example.com/xrpc/com.atproto.sync.subscribeRepos")
//!     .with_collection("app.bsky.feed.post");
//!
//! let handlers = Handlers::new().on_record(|_commit, op, record| {
//!     let post = TextPost::project(record)?;
//!     if post.has_lang("en") {
//!         println!("{}: {}", op.path, post.text);
//!     }
//!     Ok(())
//! });
//!
//! let session = Session::new(config, WsConnector::new(), handlers);
//! session.run().await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod dispatch;
mod error;
mod extract;
mod record;
mod session;
mod transport;
mod ws;

pub use config::{BackoffConfig, SubscriberConfig};
pub use cursor::{Cursor, CursorStore, MemoryCursorStore};
pub use dispatch::{DispatchReport, Dispatcher, HandlerResult, Handlers};
pub use error::{SubscribeError, SubscribeResult};
pub use extract::{extract_operations, CollectionFilter, ExtractedOp, OpContent};
pub use record::{ProjectionError, TextPost};
pub use session::{Session, SessionState, SessionStats, ShutdownHandle};
pub use transport::{Connector, FrameSource, MockConnector, MockSource, ScriptedRead};
pub use ws::{WsConnector, WsFrameSource};
