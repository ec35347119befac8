//! End-to-end session flow against scripted collaborators.

use std::collections::BTreeSet;

use bytes::Bytes;
use walpeek_core::mock::{Call, ScriptedConnector, ScriptedPrompt};
use walpeek_core::{
    CredentialMode, DataKind, ErrorCode, Lsn, ReplicationMessage, ReplicationSession,
    SessionConfig, TransportError,
};

fn begin(pos: u64) -> ReplicationMessage {
    ReplicationMessage::Begin {
        position: Lsn(pos),
        xid: 1,
    }
}

fn commit(pos: u64) -> ReplicationMessage {
    ReplicationMessage::Commit { position: Lsn(pos) }
}

fn insert(pos: u64) -> ReplicationMessage {
    ReplicationMessage::Data {
        position: Lsn(pos),
        kind: DataKind::Insert,
        payload: Bytes::from_static(b"N"),
    }
}

fn config(slot_name: Option<&str>, keep_empty: bool) -> SessionConfig {
    SessionConfig {
        publications: BTreeSet::from(["orders".to_string(), "users".to_string()]),
        slot_name: slot_name.map(str::to_string),
        keep_empty_transactions: keep_empty,
        credential_mode: CredentialMode::Auto,
        ..Default::default()
    }
}

/// Consume the whole stream the way the CLI does, acknowledging each message.
async fn drain(session: &mut ReplicationSession<ScriptedConnector>) -> Vec<String> {
    let mut names = Vec::new();
    while let Some(message) = session.next_message().await.unwrap() {
        names.push(message.name().to_string());
        session.report_progress(message.position());
    }
    names
}

#[tokio::test]
async fn generated_slot_session_filters_and_acknowledges() {
    let connector = ScriptedConnector::new();
    connector.push_open(Err(TransportError::authentication("password missing")));
    connector.push_open(Ok(16));
    connector.push_start(Ok(vec![
        begin(100),
        commit(110),
        begin(120),
        insert(130),
        insert(140),
        commit(150),
        begin(160),
        commit(170),
    ]));
    let mut prompt = ScriptedPrompt::new([Some("secret")]);

    let mut session = ReplicationSession::open(&connector, &mut prompt, config(None, false))
        .await
        .unwrap();
    session.start_streaming().await.unwrap();
    let names = drain(&mut session).await;
    let watermark = session.watermark();
    session.close().await;

    assert_eq!(names, ["Begin", "Insert", "Insert", "Commit"]);
    assert_eq!(watermark.applied, Lsn(150));
    assert_eq!(watermark.flushed, Lsn(150));

    let calls = connector.calls();
    assert!(matches!(&calls[0], Call::CreateSlot { options, .. } if options.temporary));
    assert!(matches!(calls[1], Call::StartStreaming { .. }));
    assert!(matches!(calls.last(), Some(Call::Close)));
}

#[tokio::test]
async fn watermark_is_monotonic_over_the_stream() {
    let connector = ScriptedConnector::new();
    connector.push_start(Ok(vec![
        begin(10),
        insert(20),
        commit(30),
        begin(40),
        commit(50),
        begin(60),
        insert(70),
        commit(80),
    ]));
    let mut prompt = ScriptedPrompt::new([]);

    let mut session = ReplicationSession::open(&connector, &mut prompt, config(Some("orders_slot"), false))
        .await
        .unwrap();
    session.start_streaming().await.unwrap();
    drain(&mut session).await;
    session.close().await;

    let progress = connector.progress();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
    assert!(progress.iter().all(|(applied, flushed)| applied == flushed));
    assert_eq!(progress.last(), Some(&(Lsn(80), Lsn(80))));
    assert!(!progress.iter().any(|(applied, _)| *applied == Lsn(40) || *applied == Lsn(50)));
}

#[tokio::test]
async fn keep_empty_transactions_delivers_everything() {
    let connector = ScriptedConnector::new();
    connector.push_start(Ok(vec![begin(1), commit(2), begin(3), commit(4)]));
    let mut prompt = ScriptedPrompt::new([]);

    let mut session = ReplicationSession::open(&connector, &mut prompt, config(Some("s"), true))
        .await
        .unwrap();
    session.start_streaming().await.unwrap();
    let names = drain(&mut session).await;

    assert_eq!(names, ["Begin", "Commit", "Begin", "Commit"]);
}

#[tokio::test]
async fn missing_user_slot_is_created_once() {
    let connector = ScriptedConnector::new();
    connector.push_start(Err(TransportError::SlotNotFound("s".into())));
    connector.push_start(Ok(vec![begin(1), insert(2), commit(3)]));
    let mut prompt = ScriptedPrompt::new([]);

    let mut session = ReplicationSession::open(&connector, &mut prompt, config(Some("s"), false))
        .await
        .unwrap();
    session.start_streaming().await.unwrap();
    assert_eq!(drain(&mut session).await, ["Begin", "Insert", "Commit"]);

    let calls = connector.calls();
    let creates: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            Call::CreateSlot { name, options } => Some((name.as_str(), options.temporary)),
            _ => None,
        })
        .collect();
    // A named slot must survive the session.
    assert_eq!(creates, [("s", false)]);
}

#[tokio::test]
async fn never_prompt_fails_without_prompting() {
    let connector = ScriptedConnector::new();
    connector.push_open(Err(TransportError::authentication("password missing")));
    let mut prompt = ScriptedPrompt::new([Some("secret")]);
    let mut config = config(None, false);
    config.credential_mode = CredentialMode::NeverPrompt;

    let err = ReplicationSession::open(&connector, &mut prompt, config)
        .await
        .err()
        .unwrap();

    assert_eq!(err.code(), ErrorCode::MissingCredential);
    assert_eq!(prompt.calls(), 0);
}
