//! End-to-end session tests over the scripted transport.

use firehose_codec::{encode, write_car, Cid, Value};
use firehose_engine::{
    BackoffConfig, CursorStore, Handlers, MemoryCursorStore, MockConnector, ScriptedRead, Session,
    SubscriberConfig, TextPost,
};
use firehose_events::{encode_envelope, CommitEvent, FrameKind, OpAction, RepoOp, OP_MESSAGE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const ENDPOINT: &str = "wss://relay.example.com/subscribe";

fn test_cid(fill: u8) -> Cid {
    let mut bytes = vec![0x01, 0x71, 0x12, 0x20];
    bytes.extend(std::iter::repeat(fill).take(32));
    Cid::from_bytes(&bytes).unwrap()
}

fn post_record(text: &str, langs: &[&str]) -> Value {
    Value::map(vec![
        ("$type", Value::from("app.bsky.feed.post")),
        ("createdAt", Value::from("2024-01-15T10:30:00Z")),
        (
            "langs",
            Value::Array(langs.iter().map(|l| Value::from(*l)).collect()),
        ),
        ("text", Value::from(text)),
    ])
}

fn commit_frame(seq: i64, ops: Vec<RepoOp>, blocks: Vec<u8>) -> Vec<u8> {
    let event = CommitEvent {
        repo: "did:plc:ewvi7nxzyoun6zhxrhs64oiz".to_string(),
        seq,
        rev: "3kb2cqvbs2b2a".to_string(),
        since: None,
        commit: Some(test_cid(0x01)),
        time: "2024-01-15T10:30:00Z".to_string(),
        too_big: false,
        rebase: false,
        ops,
        blocks,
    };
    let mut frame = encode_envelope(&FrameKind::Commit, OP_MESSAGE);
    frame.extend_from_slice(&encode(&event.to_value()).unwrap());
    frame
}

fn single_post_frame(seq: i64, text: &str, langs: &[&str]) -> Vec<u8> {
    let cid = test_cid(0x10);
    let blocks = write_car(
        &[test_cid(0x01)],
        &[(cid.clone(), encode(&post_record(text, langs)).unwrap())],
    )
    .unwrap();
    commit_frame(
        seq,
        vec![RepoOp {
            path: format!("app.bsky.feed.post/3k{seq}"),
            action: OpAction::Create,
            cid: Some(cid),
        }],
        blocks,
    )
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> SubscriberConfig {
    init_logging();
    SubscriberConfig::new(ENDPOINT).with_backoff(
        BackoffConfig::new(Duration::from_millis(1), Duration::from_millis(5)).without_jitter(),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn delivers_projected_posts_end_to_end() {
    let connector = MockConnector::new();
    connector.push_connection(vec![
        ScriptedRead::Frame(single_post_frame(1, "hello", &["en"])),
        ScriptedRead::Hang,
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handlers = Handlers::new().on_record(move |commit, op, record| {
        let post = TextPost::project(record)?;
        if post.has_lang("en") {
            sink.lock().push((commit.seq, op.path.clone(), post.text));
        }
        Ok(())
    });

    let session = Arc::new(Session::new(
        fast_config().with_collection("app.bsky.feed.post"),
        connector,
        handlers,
    ));
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    wait_until(|| !seen.lock().is_empty()).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(
        seen.lock().as_slice(),
        &[(1, "app.bsky.feed.post/3k1".to_string(), "hello".to_string())]
    );
    assert_eq!(session.cursor(), Some(1));
    let stats = session.stats();
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.events_dispatched, 1);
    assert_eq!(stats.events_skipped, 0);
}

#[tokio::test]
async fn oversized_commit_advances_cursor_without_records() {
    let connector = MockConnector::new();
    let frame = {
        let cid = test_cid(0x10);
        let blocks = write_car(
            &[test_cid(0x01)],
            &[(cid.clone(), encode(&post_record("hi", &[])).unwrap())],
        )
        .unwrap();
        let event = CommitEvent {
            repo: "did:plc:abc".to_string(),
            seq: 9,
            rev: "3k".to_string(),
            since: None,
            commit: None,
            time: String::new(),
            too_big: true,
            rebase: false,
            ops: vec![RepoOp {
                path: "app.bsky.feed.post/3k9".to_string(),
                action: OpAction::Create,
                cid: Some(cid),
            }],
            blocks,
        };
        let mut frame = encode_envelope(&FrameKind::Commit, OP_MESSAGE);
        frame.extend_from_slice(&encode(&event.to_value()).unwrap());
        frame
    };
    connector.push_connection(vec![ScriptedRead::Frame(frame), ScriptedRead::Hang]);

    let commits = Arc::new(Mutex::new(0usize));
    let records = Arc::new(Mutex::new(0usize));
    let commit_sink = Arc::clone(&commits);
    let record_sink = Arc::clone(&records);
    let handlers = Handlers::new()
        .on_commit(move |commit| {
            assert!(commit.too_big);
            *commit_sink.lock() += 1;
            Ok(())
        })
        .on_record(move |_, _, _| {
            *record_sink.lock() += 1;
            Ok(())
        });

    let session = Arc::new(Session::new(fast_config(), connector, handlers));
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    wait_until(|| *commits.lock() == 1).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(*records.lock(), 0);
    assert_eq!(session.cursor(), Some(9));
}

#[tokio::test]
async fn corrupted_envelope_reconnects_from_last_dispatched() {
    let connector = MockConnector::new();
    connector.push_connection(vec![
        ScriptedRead::Frame(single_post_frame(7, "first", &["en"])),
        // Not a valid header: the frame boundary is lost.
        ScriptedRead::Frame(vec![0xff, 0xff, 0xff]),
    ]);
    connector.push_connection(vec![ScriptedRead::Hang]);

    let session = Arc::new(Session::new(fast_config(), connector.clone(), Handlers::new()));
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    wait_until(|| connector.dialed().len() == 2).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    let dialed = connector.dialed();
    assert_eq!(dialed[0], ENDPOINT);
    assert_eq!(dialed[1], format!("{ENDPOINT}?cursor=7"));
    assert_eq!(session.cursor(), Some(7));
    assert!(session.stats().reconnects >= 1);
}

#[tokio::test]
async fn bad_payload_skips_event_and_keeps_stream() {
    // Valid envelope, commit payload missing its required seq.
    let mut bad_payload = encode_envelope(&FrameKind::Commit, OP_MESSAGE);
    bad_payload.extend_from_slice(
        &encode(&Value::map(vec![("repo", Value::from("did:plc:abc"))])).unwrap(),
    );

    let connector = MockConnector::new();
    connector.push_connection(vec![
        ScriptedRead::Frame(single_post_frame(1, "one", &["en"])),
        ScriptedRead::Frame(bad_payload),
        ScriptedRead::Frame(single_post_frame(2, "two", &["en"])),
        ScriptedRead::Hang,
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handlers = Handlers::new().on_commit(move |commit| {
        sink.lock().push(commit.seq);
        Ok(())
    });

    let session = Arc::new(Session::new(fast_config(), connector.clone(), handlers));
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    wait_until(|| seen.lock().len() == 2).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(seen.lock().as_slice(), &[1, 2]);
    assert_eq!(connector.dialed().len(), 1);
    assert_eq!(session.cursor(), Some(2));
    assert_eq!(session.stats().events_skipped, 1);
}

#[tokio::test]
async fn unresolved_reference_skips_only_that_operation() {
    let resolved = test_cid(0x10);
    let blocks = write_car(
        &[test_cid(0x01)],
        &[(resolved.clone(), encode(&post_record("kept", &[])).unwrap())],
    )
    .unwrap();
    let frame = commit_frame(
        3,
        vec![
            RepoOp {
                path: "app.bsky.feed.post/missing".to_string(),
                action: OpAction::Create,
                cid: Some(test_cid(0x77)),
            },
            RepoOp {
                path: "app.bsky.feed.post/kept".to_string(),
                action: OpAction::Create,
                cid: Some(resolved),
            },
        ],
        blocks,
    );

    let connector = MockConnector::new();
    connector.push_connection(vec![ScriptedRead::Frame(frame), ScriptedRead::Hang]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handlers = Handlers::new().on_record(move |_, op, _| {
        sink.lock().push(op.path.clone());
        Ok(())
    });

    let session = Arc::new(Session::new(fast_config(), connector, handlers));
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    wait_until(|| !seen.lock().is_empty()).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(seen.lock().as_slice(), &["app.bsky.feed.post/kept".to_string()]);
    assert_eq!(session.stats().ops_skipped, 1);
    assert_eq!(session.cursor(), Some(3));
}

#[tokio::test]
async fn persisted_cursor_survives_restart() {
    let store = Arc::new(MemoryCursorStore::new());

    // First session dispatches seq 42 and stops.
    let connector = MockConnector::new();
    connector.push_connection(vec![
        ScriptedRead::Frame(single_post_frame(42, "before restart", &["en"])),
        ScriptedRead::Hang,
    ]);
    let session = Arc::new(
        Session::new(fast_config(), connector, Handlers::new())
            .with_cursor_store(Arc::clone(&store) as Arc<dyn CursorStore>),
    );
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });
    wait_until(|| session.cursor() == Some(42)).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();
    assert_eq!(store.load(), Some(42));

    // A fresh session over the same store resumes from it.
    let connector = MockConnector::new();
    connector.push_connection(vec![ScriptedRead::Hang]);
    let session = Arc::new(
        Session::new(fast_config(), connector.clone(), Handlers::new())
            .with_cursor_store(Arc::clone(&store) as Arc<dyn CursorStore>),
    );
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });
    wait_until(|| !connector.dialed().is_empty()).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(connector.dialed(), vec![format!("{ENDPOINT}?cursor=42")]);
}

#[tokio::test]
async fn idle_connection_reconnects() {
    let connector = MockConnector::new();
    connector.push_connection(vec![ScriptedRead::Hang]);
    connector.push_connection(vec![ScriptedRead::Hang]);

    let config = fast_config().with_idle_timeout(Duration::from_millis(20));
    let session = Arc::new(Session::new(config, connector.clone(), Handlers::new()));
    let shutdown = session.shutdown_handle();
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    wait_until(|| connector.dialed().len() == 2).await;
    shutdown.shutdown();
    runner.await.unwrap().unwrap();

    let stats = session.stats();
    assert!(stats.reconnects >= 1);
    assert!(stats.last_error.unwrap().contains("idle timeout"));
}
