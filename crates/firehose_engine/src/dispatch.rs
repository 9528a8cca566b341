//! Handler registration and the dispatch boundary.
//!
//! Handlers are caller-supplied callbacks, one per event kind, plus a
//! per-record callback fed from commit extraction. A handler failure is
//! logged and dropped at this boundary; it never propagates into the
//! session loop, so one misbehaving callback cannot stall the stream.

use crate::extract::{extract_operations, CollectionFilter, OpContent};
use firehose_codec::{decode, Value};
use firehose_events::{
    AccountEvent, CommitEvent, HandleEvent, IdentityEvent, InfoEvent, Payload, RepoOp,
    TombstoneEvent,
};
use tracing::{error, warn};

/// Result type for caller-supplied handlers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Callback<E> = Box<dyn Fn(&E) -> HandlerResult + Send + Sync>;
type RecordCallback = Box<dyn Fn(&CommitEvent, &RepoOp, &Value) -> HandlerResult + Send + Sync>;

/// Callbacks invoked for each decoded event.
///
/// All handlers are optional; events with no registered handler are
/// still consumed (and still advance the cursor).
#[derive(Default)]
pub struct Handlers {
    on_commit: Option<Callback<CommitEvent>>,
    on_record: Option<RecordCallback>,
    on_account: Option<Callback<AccountEvent>>,
    on_identity: Option<Callback<IdentityEvent>>,
    on_handle: Option<Callback<HandleEvent>>,
    on_tombstone: Option<Callback<TombstoneEvent>>,
    on_info: Option<Callback<InfoEvent>>,
}

impl Handlers {
    /// Creates an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked once per commit event, before per-record extraction.
    pub fn on_commit(
        mut self,
        f: impl Fn(&CommitEvent) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_commit = Some(Box::new(f));
        self
    }

    /// Invoked once per resolved record inside a commit, after the
    /// collection filter and content resolution.
    pub fn on_record(
        mut self,
        f: impl Fn(&CommitEvent, &RepoOp, &Value) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_record = Some(Box::new(f));
        self
    }

    /// Invoked for account lifecycle events.
    pub fn on_account(
        mut self,
        f: impl Fn(&AccountEvent) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_account = Some(Box::new(f));
        self
    }

    /// Invoked for identity events.
    pub fn on_identity(
        mut self,
        f: impl Fn(&IdentityEvent) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_identity = Some(Box::new(f));
        self
    }

    /// Invoked for handle events.
    pub fn on_handle(
        mut self,
        f: impl Fn(&HandleEvent) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_handle = Some(Box::new(f));
        self
    }

    /// Invoked for tombstone events.
    pub fn on_tombstone(
        mut self,
        f: impl Fn(&TombstoneEvent) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_tombstone = Some(Box::new(f));
        self
    }

    /// Invoked for informational payloads, including upstream errors
    /// and unrecognized frame kinds.
    pub fn on_info(
        mut self,
        f: impl Fn(&InfoEvent) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_info = Some(Box::new(f));
        self
    }
}

/// What happened while dispatching one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handler invocations that returned an error.
    pub handler_errors: usize,
    /// Operations skipped for unresolved or undecodable content.
    pub skipped_ops: usize,
}

/// Routes decoded payloads to their handlers.
pub struct Dispatcher {
    handlers: Handlers,
    filter: CollectionFilter,
}

impl Dispatcher {
    /// Creates a dispatcher over the given handlers and record filter.
    pub fn new(handlers: Handlers, filter: CollectionFilter) -> Self {
        Self { handlers, filter }
    }

    /// Dispatch one payload.
    ///
    /// Always returns: handler errors and per-operation skips are
    /// recorded in the report, never raised.
    pub fn dispatch(&self, payload: &Payload) -> DispatchReport {
        let mut report = DispatchReport::default();
        match payload {
            Payload::Commit(event) => self.dispatch_commit(event, &mut report),
            Payload::Account(event) => {
                self.invoke(&self.handlers.on_account, event, "#account", &mut report);
            }
            Payload::Identity(event) => {
                self.invoke(&self.handlers.on_identity, event, "#identity", &mut report);
            }
            Payload::Handle(event) => {
                self.invoke(&self.handlers.on_handle, event, "#handle", &mut report);
            }
            Payload::Tombstone(event) => {
                self.invoke(&self.handlers.on_tombstone, event, "#tombstone", &mut report);
            }
            Payload::Info(event) => {
                self.invoke(&self.handlers.on_info, event, "#info", &mut report);
            }
        }
        report
    }

    fn dispatch_commit(&self, event: &CommitEvent, report: &mut DispatchReport) {
        self.invoke(&self.handlers.on_commit, event, "#commit", report);

        let Some(on_record) = &self.handlers.on_record else {
            return;
        };

        for extracted in extract_operations(event, &self.filter) {
            let bytes = match extracted.content {
                OpContent::Resolved(bytes) => bytes,
                OpContent::Unresolved => {
                    warn!(
                        repo = %event.repo,
                        seq = event.seq,
                        path = %extracted.op.path,
                        "skipping operation with unresolved content reference"
                    );
                    report.skipped_ops += 1;
                    continue;
                }
                OpContent::None => continue,
            };

            let record = match decode(bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        repo = %event.repo,
                        seq = event.seq,
                        path = %extracted.op.path,
                        error = %e,
                        "skipping operation with undecodable record"
                    );
                    report.skipped_ops += 1;
                    continue;
                }
            };

            if let Err(e) = on_record(event, extracted.op, &record) {
                error!(
                    seq = event.seq,
                    path = %extracted.op.path,
                    error = %e,
                    "record handler failed"
                );
                report.handler_errors += 1;
            }
        }
    }

    fn invoke<E>(
        &self,
        handler: &Option<Callback<E>>,
        event: &E,
        kind: &str,
        report: &mut DispatchReport,
    ) {
        if let Some(handler) = handler {
            if let Err(e) = handler(event) {
                error!(kind, error = %e, "handler failed");
                report.handler_errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firehose_codec::{encode, write_car, Cid};
    use firehose_events::OpAction;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn test_cid(fill: u8) -> Cid {
        let mut bytes = vec![0x01, 0x71, 0x12, 0x20];
        bytes.extend(std::iter::repeat(fill).take(32));
        Cid::from_bytes(&bytes).unwrap()
    }

    fn commit_with_record(text: &str) -> CommitEvent {
        let cid = test_cid(0x10);
        let record = Value::map(vec![
            ("createdAt", Value::from("2024-01-01T00:00:00Z")),
            ("text", Value::from(text)),
        ]);
        let blocks = write_car(
            &[test_cid(0x01)],
            &[(cid.clone(), encode(&record).unwrap())],
        )
        .unwrap();
        CommitEvent {
            repo: "did:plc:abc".to_string(),
            seq: 1,
            rev: "3k".to_string(),
            since: None,
            commit: None,
            time: String::new(),
            too_big: false,
            rebase: false,
            ops: vec![RepoOp {
                path: "app.bsky.feed.post/3k".to_string(),
                action: OpAction::Create,
                cid: Some(cid),
            }],
            blocks,
        }
    }

    #[test]
    fn records_reach_the_record_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = Handlers::new().on_record(move |_, op, record| {
            let text = record.get("text").and_then(Value::as_text).unwrap();
            sink.lock().push((op.path.clone(), text.to_string()));
            Ok(())
        });

        let dispatcher = Dispatcher::new(handlers, CollectionFilter::all());
        let report = dispatcher.dispatch(&Payload::Commit(commit_with_record("hello")));

        assert_eq!(report, DispatchReport::default());
        assert_eq!(
            seen.lock().as_slice(),
            &[("app.bsky.feed.post/3k".to_string(), "hello".to_string())]
        );
    }

    #[test]
    fn handler_error_is_contained() {
        let handlers = Handlers::new()
            .on_commit(|_| Err("sink unavailable".into()))
            .on_record(|_, _, _| Ok(()));
        let dispatcher = Dispatcher::new(handlers, CollectionFilter::all());

        let report = dispatcher.dispatch(&Payload::Commit(commit_with_record("hi")));
        assert_eq!(report.handler_errors, 1);
        assert_eq!(report.skipped_ops, 0);
    }

    #[test]
    fn unresolved_reference_skips_only_that_op() {
        let mut event = commit_with_record("hi");
        // A second op whose reference the archive does not carry.
        event.ops.push(RepoOp {
            path: "app.bsky.feed.post/3x".to_string(),
            action: OpAction::Create,
            cid: Some(test_cid(0x77)),
        });

        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let handlers = Handlers::new().on_record(move |_, _, _| {
            *sink.lock() += 1;
            Ok(())
        });
        let dispatcher = Dispatcher::new(handlers, CollectionFilter::all());

        let report = dispatcher.dispatch(&Payload::Commit(event));
        assert_eq!(report.skipped_ops, 1);
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn events_without_handlers_are_consumed() {
        let dispatcher = Dispatcher::new(Handlers::new(), CollectionFilter::all());
        let report = dispatcher.dispatch(&Payload::Commit(commit_with_record("hi")));
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn info_handler_sees_upstream_errors() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let handlers = Handlers::new().on_info(move |info| {
            *sink.lock() = Some(info.name.clone());
            Ok(())
        });
        let dispatcher = Dispatcher::new(handlers, CollectionFilter::all());

        dispatcher.dispatch(&Payload::Info(InfoEvent {
            name: "OutdatedCursor".to_string(),
            message: None,
            raw: Vec::new(),
        }));
        assert_eq!(seen.lock().as_deref(), Some("OutdatedCursor"));
    }
}
