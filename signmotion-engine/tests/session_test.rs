//! Session manager behaviour over a scripted transport.

mod common;

use common::{next, settle, MockConnector};
use serde_json::json;
use signmotion_engine::session::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_NO_STATUS, MAX_ATTEMPTS_REACHED, NOT_CONNECTED,
};
use signmotion_engine::{EngineError, SessionConfig, SessionEvent, SessionManager, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const ADDRESS: &str = "wss://sign.example.org/ws/translations/m1/";

fn config(max_reconnect_attempts: u32) -> SessionConfig {
    SessionConfig {
        max_reconnect_attempts,
        ..SessionConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_then_exhausted() {
    let (connector, _peers) = MockConnector::new();
    connector.refuse(true);
    let (session, mut events) = SessionManager::new(connector.clone(), config(3));

    let started = Instant::now();
    session.connect(ADDRESS);

    let mut delays = Vec::new();
    let mut reconnect_times = Vec::new();
    loop {
        match next(&mut events).await {
            SessionEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(delay.as_millis() as u64);
                reconnect_times.push(started.elapsed());
            }
            SessionEvent::Closed { code, clean } => {
                assert_eq!(code, CLOSE_ABNORMAL);
                assert!(!clean);
            }
            SessionEvent::Error(_) => {}
            SessionEvent::Exhausted => break,
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(delays, vec![2000, 4000, 8000]);
    assert_eq!(connector.connects(), 4);
    assert!(started.elapsed() >= Duration::from_millis(14_000));
    assert!(reconnect_times[2] >= Duration::from_millis(6_000));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.last_error().as_deref(), Some(MAX_ATTEMPTS_REACHED));

    // Nothing further is scheduled.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connects(), 4);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_default_policy_caps_delay() {
    let (connector, _peers) = MockConnector::new();
    connector.refuse(true);
    let (session, mut events) = SessionManager::new(connector.clone(), SessionConfig::default());
    session.connect(ADDRESS);

    let mut delays = Vec::new();
    loop {
        match next(&mut events).await {
            SessionEvent::Reconnecting { delay, .. } => delays.push(delay.as_millis() as u64),
            SessionEvent::Exhausted => break,
            _ => {}
        }
    }
    assert_eq!(delays, vec![2000, 4000, 8000, 10_000, 10_000]);
}

#[tokio::test(start_paused = true)]
async fn test_messages_parsed_and_garbage_dropped() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);

    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    assert!(session.is_connected());
    let peer = next(&mut peers).await;
    assert_eq!(peer.address, ADDRESS);

    peer.send_text("{not json");
    peer.send_json(json!({"status": "processing", "progress": 0.5}));

    match next(&mut events).await {
        SessionEvent::Message(value) => assert_eq!(value["progress"], json!(0.5)),
        other => panic!("expected message, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(
        session.last_message(),
        Some(json!({"status": "processing", "progress": 0.5}))
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_open_session() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));

    let result = session.send(&json!({"type": "ping"}));
    assert!(matches!(result, Err(EngineError::NotConnected)));
    assert_eq!(session.last_error().as_deref(), Some(NOT_CONNECTED));

    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let mut peer = next(&mut peers).await;

    tokio_test::assert_ok!(session.send(&json!({"type": "ping"})));
    assert_eq!(next(&mut peer.sent).await, r#"{"type":"ping"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_is_safe() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let peer = next(&mut peers).await;

    session.disconnect();
    session.disconnect();
    settle().await;

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(peer.closed_with(), Some(CLOSE_NORMAL));
    assert!(session.last_message().is_none());
    assert!(session.address().is_none());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connects(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_same_address_is_noop() {
    let (connector, _peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);

    session.connect(ADDRESS);
    settle().await;
    assert_eq!(connector.connects(), 1);
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_new_address_supersedes_old_socket() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let old = next(&mut peers).await;

    session.connect("wss://sign.example.org/ws/translations/m2/");
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let new = next(&mut peers).await;
    settle().await;

    assert_eq!(old.closed_with(), Some(CLOSE_NORMAL));
    assert_eq!(new.closed_with(), None);

    // The retired socket's traffic never surfaces.
    old.send_json(json!({"status": "completed"}));
    new.send_json(json!({"status": "processing"}));
    match next(&mut events).await {
        SessionEvent::Message(value) => assert_eq!(value["status"], json!("processing")),
        other => panic!("expected message, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_reconnects_and_resets_attempts() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let peer = next(&mut peers).await;

    let started = Instant::now();
    drop(peer);

    assert_eq!(
        next(&mut events).await,
        SessionEvent::Closed { code: CLOSE_ABNORMAL, clean: false }
    );
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1, delay: Duration::from_millis(2000) }
    );
    assert_eq!(session.state(), SessionState::Reconnecting);

    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert_eq!(session.attempts(), 0);
    assert_eq!(connector.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clean_close_does_not_reconnect() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let peer = next(&mut peers).await;

    peer.close(CLOSE_NORMAL);
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Closed { code: CLOSE_NORMAL, clean: true }
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_cancels_pending_reconnect() {
    let (connector, _peers) = MockConnector::new();
    connector.refuse(true);
    let connector_ref = Arc::clone(&connector);
    let (session, mut events) = SessionManager::new(connector, config(5));
    session.connect(ADDRESS);

    loop {
        if let SessionEvent::Reconnecting { .. } = next(&mut events).await {
            break;
        }
    }
    drop(session);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector_ref.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_without_status_reconnects() {
    let (connector, mut peers) = MockConnector::new();
    let (session, mut events) = SessionManager::new(connector.clone(), config(5));
    session.connect(ADDRESS);
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    let peer = next(&mut peers).await;

    peer.close(CLOSE_NO_STATUS);
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Closed { code: CLOSE_NO_STATUS, clean: false }
    );
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1, delay: Duration::from_millis(2000) }
    );
    assert_eq!(next(&mut events).await, SessionEvent::Opened);
    assert_eq!(connector.connects(), 2);
    assert_eq!(session.address().as_deref(), Some(ADDRESS));
}
