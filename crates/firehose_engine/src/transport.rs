//! Transport abstraction: a connector that dials a subscription URL and
//! yields one binary frame per wire message.

use crate::error::{SubscribeError, SubscribeResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// A live connection yielding raw frames in arrival order.
pub trait FrameSource: Send {
    /// Await the next frame.
    ///
    /// EOF and read failures both surface as
    /// [`SubscribeError::Transport`]; the session treats either as a
    /// signal to reconnect.
    fn next_frame(&mut self) -> impl Future<Output = SubscribeResult<Vec<u8>>> + Send;

    /// Close the connection. Best-effort; errors are discarded.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Dials subscription URLs.
///
/// Abstracts the network layer so the session can be driven by a real
/// websocket or by a scripted mock in tests.
pub trait Connector: Send + Sync {
    /// The connection type produced on success.
    type Source: FrameSource;

    /// Establish a connection to the given subscription URL.
    fn connect(&self, url: &Url) -> impl Future<Output = SubscribeResult<Self::Source>> + Send;
}

/// One scripted read on a mock connection.
#[derive(Debug, Clone)]
pub enum ScriptedRead {
    /// Deliver a frame.
    Frame(Vec<u8>),
    /// Fail the read with a transport error.
    Error(String),
    /// Park the connection: no more frames until idle timeout or
    /// shutdown.
    Hang,
}

#[derive(Default)]
struct MockInner {
    connections: Mutex<VecDeque<Vec<ScriptedRead>>>,
    dialed: Mutex<Vec<String>>,
}

/// A scripted connector for tests.
///
/// Each pushed connection is a sequence of reads; `connect` hands them
/// out in order and records every dialed URL so tests can assert on the
/// resume cursor.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    /// Creates a connector with no scripted connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted connection.
    pub fn push_connection(&self, reads: Vec<ScriptedRead>) {
        self.inner.connections.lock().push_back(reads);
    }

    /// URLs dialed so far, in order.
    pub fn dialed(&self) -> Vec<String> {
        self.inner.dialed.lock().clone()
    }
}

impl Connector for MockConnector {
    type Source = MockSource;

    async fn connect(&self, url: &Url) -> SubscribeResult<MockSource> {
        self.inner.dialed.lock().push(url.to_string());
        match self.inner.connections.lock().pop_front() {
            Some(reads) => Ok(MockSource {
                reads: reads.into(),
            }),
            None => Err(SubscribeError::transport("no scripted connection")),
        }
    }
}

/// A scripted frame source handed out by [`MockConnector`].
pub struct MockSource {
    reads: VecDeque<ScriptedRead>,
}

impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> SubscribeResult<Vec<u8>> {
        match self.reads.pop_front() {
            Some(ScriptedRead::Frame(bytes)) => Ok(bytes),
            Some(ScriptedRead::Error(message)) => Err(SubscribeError::transport(message)),
            Some(ScriptedRead::Hang) => std::future::pending().await,
            None => Err(SubscribeError::transport("scripted connection closed")),
        }
    }

    async fn close(&mut self) {
        self.reads.clear();
    }
}
