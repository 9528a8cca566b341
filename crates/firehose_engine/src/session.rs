//! The subscription session: connect, consume, dispatch, resume.
//!
//! A session cycles through Connecting, Subscribed, and Backoff until
//! shut down. The cursor only advances after a frame is fully decoded
//! and dispatched, so a crash or reconnect replays from the last
//! dispatched event rather than skipping past it. At-least-once is the
//! contract: handlers may see an event twice, never zero times.

use crate::config::SubscriberConfig;
use crate::cursor::{Cursor, CursorStore};
use crate::dispatch::{Dispatcher, Handlers};
use crate::error::{SubscribeError, SubscribeResult};
use crate::extract::CollectionFilter;
use crate::transport::{Connector, FrameSource};
use firehose_events::{Envelope, Payload};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Where the session is in its connect/consume/retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected and not trying to be.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// Connected and consuming frames.
    Subscribed,
    /// Waiting out the delay before the next reconnect attempt.
    Backoff,
}

/// Running counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames read off the wire.
    pub frames_received: usize,
    /// Events decoded and dispatched.
    pub events_dispatched: usize,
    /// Events skipped for payload decode failures.
    pub events_skipped: usize,
    /// Operations skipped for unresolved or undecodable content.
    pub ops_skipped: usize,
    /// Handler invocations that returned an error.
    pub handler_errors: usize,
    /// Reconnect attempts entered.
    pub reconnects: usize,
    /// The most recent non-terminal error, if any.
    pub last_error: Option<String>,
}

/// Requests a running session to stop.
///
/// Cheap to clone; safe to trigger from any task. The session finishes
/// the frame in hand and exits cleanly.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal the session to stop.
    ///
    /// Effective even before `run` is called: the value is replaced
    /// unconditionally, so a later subscriber still observes it
    /// (`send` would fail without updating when no receiver exists
    /// yet, losing the signal).
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// A resumable firehose subscription.
pub struct Session<C: Connector> {
    config: SubscriberConfig,
    connector: C,
    dispatcher: Dispatcher,
    cursor: Arc<Cursor>,
    store: Option<Arc<dyn CursorStore>>,
    state: RwLock<SessionState>,
    stats: Mutex<SessionStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl<C: Connector> Session<C> {
    /// Creates a session over the given transport and handlers.
    pub fn new(config: SubscriberConfig, connector: C, handlers: Handlers) -> Self {
        let filter = CollectionFilter::prefixes(config.collections.clone());
        let cursor = match config.start_cursor {
            Some(seq) => Cursor::starting_at(seq),
            None => Cursor::new(),
        };
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            connector,
            dispatcher: Dispatcher::new(handlers, filter),
            cursor: Arc::new(cursor),
            store: None,
            state: RwLock::new(SessionState::Disconnected),
            stats: Mutex::new(SessionStats::default()),
            shutdown_tx,
        }
    }

    /// Attaches a cursor store.
    ///
    /// A persisted position takes precedence over the configured start
    /// cursor; every advance is written back.
    pub fn with_cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        if let Some(seq) = store.load() {
            self.cursor.advance_to(seq);
        }
        self.store = Some(store);
        self
    }

    /// The session's current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// The last fully dispatched sequence, if any.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor.get()
    }

    /// A snapshot of the session counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// A handle that stops the session from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the session until shutdown or a terminal error.
    ///
    /// Transport failures, stream desyncs, and idle timeouts reconnect
    /// with capped exponential backoff; a stable stretch of
    /// subscription resets the backoff to its minimum. Only a
    /// configuration error returns `Err`.
    pub async fn run(&self) -> SubscribeResult<()> {
        // Surface a bad endpoint before the first dial.
        self.config.subscription_url(None)?;

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(SessionState::Connecting);
            let url = self.config.subscription_url(self.cursor.get())?;

            let dialed = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.connector.connect(&url) => result,
            };

            let error = match dialed {
                Ok(mut source) => {
                    self.set_state(SessionState::Subscribed);
                    info!(cursor = ?self.cursor.get(), "subscribed");
                    let subscribed_at = Instant::now();

                    let outcome = self.consume(&mut source, &mut shutdown).await;
                    source.close().await;

                    if subscribed_at.elapsed() >= self.config.backoff.stability_threshold {
                        attempt = 0;
                    }

                    match outcome {
                        Ok(()) => break,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if error.is_terminal() {
                self.set_state(SessionState::Disconnected);
                return Err(error);
            }

            self.set_state(SessionState::Backoff);
            let delay = self.config.backoff.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            {
                let mut stats = self.stats.lock();
                stats.reconnects += 1;
                stats.last_error = Some(error.to_string());
            }
            warn!(error = %error, delay_ms = delay.as_millis() as u64, "reconnecting");

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    /// Consume frames until shutdown (`Ok`) or a stream-fatal error
    /// (`Err`, reconnect).
    async fn consume<S: FrameSource>(
        &self,
        source: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SubscribeResult<()> {
        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                read = tokio::time::timeout(self.config.idle_timeout, source.next_frame()) => {
                    match read {
                        Ok(Ok(frame)) => frame,
                        Ok(Err(e)) => return Err(e),
                        Err(_) => {
                            return Err(SubscribeError::transport(
                                "idle timeout: no frames received",
                            ))
                        }
                    }
                }
            };

            self.stats.lock().frames_received += 1;

            if let Err(e) = self.process_frame(&frame) {
                if e.forces_reconnect() {
                    return Err(e);
                }
                // Event-local failure: skip this frame, keep the
                // stream. The cursor stays where it was.
                warn!(error = %e, "skipping undecodable event");
                let mut stats = self.stats.lock();
                stats.events_skipped += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }

    /// Decode and dispatch one frame, then advance the cursor.
    fn process_frame(&self, frame: &[u8]) -> SubscribeResult<()> {
        let (envelope, offset) = Envelope::decode(frame)?;
        let payload = Payload::decode(&envelope.kind, frame, offset)?;

        let report = self.dispatcher.dispatch(&payload);
        {
            let mut stats = self.stats.lock();
            stats.events_dispatched += 1;
            stats.handler_errors += report.handler_errors;
            stats.ops_skipped += report.skipped_ops;
        }

        // Dispatch finished: this sequence no longer needs redelivery.
        if let Some(seq) = payload.seq() {
            if let Ok(seq) = u64::try_from(seq) {
                if self.cursor.advance_to(seq) {
                    if let Some(store) = &self.store {
                        store.save(seq);
                    }
                }
            }
        }

        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }
}
