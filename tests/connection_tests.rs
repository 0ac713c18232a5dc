//! Integration tests for the push-channel connection manager.
//!
//! Uses the scripted `MockConnector` from `tests/common` together with a
//! paused tokio clock, so backoff and heartbeat timing can be asserted
//! exactly without real waiting.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use word_duel_sync::{
    ConnectionEvent, ConnectionManager, ConnectionState, OutboundMessage, PushMessage,
    SyncConfig, SyncError,
};

use common::{active_view, game_state_json, pong_json, text, Attempt, MockConnector};

const ENDPOINT: &str = "wss://push.test/prod";

fn start(
    attempts: Vec<Attempt>,
    config: SyncConfig,
) -> (
    ConnectionManager<MockConnector>,
    mpsc::Receiver<ConnectionEvent>,
    common::ConnectLog,
) {
    let (connector, log) = MockConnector::new(attempts);
    let (manager, events) = ConnectionManager::new(connector, config);
    (manager, events, log)
}

async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(3600), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .unwrap();
}

fn drain(events: &mut mpsc::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn states(events: &[ConnectionEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Connect idempotence
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn repeated_connect_opens_exactly_one_channel() {
    let (mut manager, _events, log) = start(vec![Attempt::Open(vec![])], SyncConfig::new());
    let mut state = manager.watch_state();

    for _ in 0..5 {
        manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    }
    wait_for(&mut state, ConnectionState::Connected).await;

    for _ in 0..5 {
        manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(log.count(), 1);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn identity_travels_in_the_channel_uri() {
    let (mut manager, _events, log) = start(vec![Attempt::Open(vec![])], SyncConfig::new());
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada L").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;

    assert_eq!(
        log.uris(),
        vec!["wss://push.test/prod?gameId=g1&playerId=p1&playerName=Ada+L".to_string()]
    );
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn reconnects_on_fixed_schedule_then_fails() {
    let (mut manager, mut events, log) = start(
        vec![
            Attempt::Open(vec![None]),
            Attempt::Refuse,
            Attempt::Refuse,
            Attempt::Refuse,
        ],
        SyncConfig::new(),
    );
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Failed).await;

    // Initial open plus three retries.
    let times = log.times();
    assert_eq!(times.len(), 4);
    let expected = [1, 2, 4].map(Duration::from_secs);
    for (i, delay) in expected.iter().enumerate() {
        let gap = times[i + 1] - times[i];
        assert!(gap >= *delay, "retry {} after {gap:?}, expected {delay:?}", i + 1);
        assert!(gap < *delay + Duration::from_millis(100));
    }

    let scheduled: Vec<(u32, Duration)> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ConnectionEvent::ReconnectScheduled { attempt, delay } => Some((attempt, delay)),
            _ => None,
        })
        .collect();
    assert_eq!(
        scheduled,
        vec![
            (1, Duration::from_secs(1)),
            (2, Duration::from_secs(2)),
            (3, Duration::from_secs(4)),
        ]
    );

    // Failed is terminal: nothing further is scheduled.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(log.count(), 4);
    assert_eq!(manager.state(), ConnectionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_the_budget() {
    let (mut manager, _events, log) = start(
        vec![
            Attempt::Open(vec![None]),
            Attempt::Open(vec![None]),
            Attempt::Open(vec![None]),
            Attempt::Open(vec![None]),
            Attempt::Open(vec![]),
        ],
        SyncConfig::new(),
    );
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    wait_for(&mut state, ConnectionState::Connected).await;
    assert_eq!(log.count(), 5);

    // Every drop was followed by a first retry, never a later one.
    for pair in log.times().windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_secs(1) && gap < Duration::from_millis(1100));
    }
}

#[tokio::test(start_paused = true)]
async fn connect_after_failed_starts_a_new_session() {
    let config = SyncConfig::new().with_max_reconnect_attempts(0);
    let (mut manager, _events, log) = start(vec![Attempt::Refuse, Attempt::Open(vec![])], config);
    let mut state = manager.watch_state();

    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Failed).await;

    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;
    assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_after_failed_with_full_event_channel() {
    // Nobody reads events, so the channel is full well before `Failed`.
    let config = SyncConfig::new()
        .with_max_reconnect_attempts(0)
        .with_event_channel_capacity(1);
    let (mut manager, _events, log) =
        start(vec![Attempt::Refuse, Attempt::Open(vec![])], config);
    let mut state = manager.watch_state();

    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Failed).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(log.count(), 1);

    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_error_yields_one_disconnect() {
    let (mut manager, mut events, log) = start(
        vec![
            Attempt::Open(vec![Some(Err(SyncError::TransportReceive(
                "connection reset".into(),
            )))]),
            Attempt::Open(vec![]),
        ],
        SyncConfig::new(),
    );
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    wait_for(&mut state, ConnectionState::Connected).await;

    let events = drain(&mut events);
    assert_eq!(
        states(&events),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
    let errors = events
        .iter()
        .filter(|e| matches!(e, ConnectionEvent::TransportError(_)))
        .count();
    assert_eq!(errors, 1);
    assert_eq!(log.closes(), 1);
    assert_eq!(log.count(), 2);
}

// ════════════════════════════════════════════════════════════════════
// Disconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn disconnect_twice_is_a_no_op() {
    let (mut manager, _events, log) = start(vec![Attempt::Open(vec![])], SyncConfig::new());
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;

    manager.disconnect();
    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.shutdown().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let (mut manager, _events, log) = start(vec![Attempt::Refuse], SyncConfig::new());
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Reconnecting).await;

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(log.count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_without_connect_is_harmless() {
    let (mut manager, _events, log) = start(vec![], SyncConfig::new());
    manager.disconnect();
    manager.shutdown().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(log.count(), 0);
}

// ════════════════════════════════════════════════════════════════════
// Heartbeat and messages
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn heartbeat_every_five_minutes_while_connected() {
    let (mut manager, _events, log) = start(vec![Attempt::Open(vec![])], SyncConfig::new());
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert!(log.sent().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let sent = log.sent();
    assert_eq!(sent.len(), 1);
    let ping: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(ping["type"], "PING");
    assert!(ping["timestamp"].is_i64());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(log.sent().len(), 2);

    manager.disconnect();
    tokio::time::sleep(Duration::from_secs(20 * 60)).await;
    assert_eq!(log.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_while_reconnecting() {
    let config = SyncConfig::new().with_backoff_schedule(vec![Duration::from_secs(30 * 60)]);
    let (mut manager, _events, log) = start(
        vec![Attempt::Open(vec![None]), Attempt::Open(vec![])],
        config,
    );
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Reconnecting).await;

    tokio::time::sleep(Duration::from_secs(20 * 60)).await;
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    assert!(log.sent().is_empty());
    assert_eq!(log.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_payloads_are_dropped_without_ending_the_session() {
    let view = active_view(3, true);
    let (mut manager, mut events, _log) = start(
        vec![Attempt::Open(vec![
            text("{not json".into()),
            text(r#"{"payload":{}}"#.into()),
            text(pong_json()),
            text(game_state_json(&view)),
        ])],
        SyncConfig::new(),
    );
    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;
    tokio::task::yield_now().await;

    let messages: Vec<PushMessage> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ConnectionEvent::Message(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], PushMessage::Pong);
    match &messages[1] {
        PushMessage::GameState { view: got, .. } => assert_eq!(**got, view),
        other => panic!("expected GameState, got {other:?}"),
    }
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn send_is_delivered_only_while_connected() {
    let (mut manager, mut events, log) = start(vec![Attempt::Open(vec![])], SyncConfig::new());
    assert!(!manager.send(OutboundMessage::ping()));
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::SendDropped(_))
    ));

    let mut state = manager.watch_state();
    manager.connect(ENDPOINT, "g1", "p1", "Ada").unwrap();
    wait_for(&mut state, ConnectionState::Connected).await;

    assert!(manager.send(OutboundMessage::Ping { timestamp: 7 }));
    tokio::task::yield_now().await;
    assert_eq!(log.sent(), vec![r#"{"type":"PING","timestamp":7}"#.to_string()]);
}
