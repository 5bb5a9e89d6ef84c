//! Reconnection policy integration tests
//!
//! Unsolicited link losses must come back through the backoff state machine
//! with subscriptions re-asserted and buffered publishes flushed; an explicit
//! disconnect must stay down.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use teleop::session::{
    ConnectResult, ConnectionState, DisconnectReason, ReconnectPolicy, SessionController,
};
use teleop::testing::mocks::{Frame, MockHandle, MockTransport};
use teleop::transport::QosLevel;

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        jitter: 0.0,
    }
}

fn session_with_policy(policy: ReconnectPolicy) -> (SessionController, MockHandle) {
    let (transport, handle) = MockTransport::new();
    (
        SessionController::with_transport(policy, 100, transport),
        handle,
    )
}

async fn wait_for_state(session: &SessionController, want: ConnectionState) {
    let mut state_rx = session.state_watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *state_rx.borrow() == want {
                return;
            }
            state_rx.changed().await.expect("session task gone");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for state {want:?}"));
}

#[tokio::test]
async fn test_unsolicited_drop_reconnects_and_restores_session() {
    let (session, mut handle) = session_with_policy(fast_policy());

    let disconnects: Arc<Mutex<Vec<DisconnectReason>>> = Arc::new(Mutex::new(Vec::new()));
    let disconnects_clone = disconnects.clone();
    session
        .on_disconnect(move |reason| disconnects_clone.lock().unwrap().push(reason.clone()))
        .unwrap();

    // Establish and subscribe.
    session.connect("mqtt://broker:1883").unwrap();
    handle.await_open().await;
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();
    session.subscribe("status/#", QosLevel::AtMostOnce).unwrap();
    handle.frames_eventually(1).await;
    handle.clear_frames();

    // The broker goes away without being asked.
    handle.link_down("connection reset");
    wait_for_state(&session, ConnectionState::Reconnecting).await;

    // Commands issued during the gap are buffered.
    session
        .publish("devices/rover/cmd", "P", QosLevel::AtMostOnce, false)
        .unwrap();

    // Backoff timer fires, the transport is re-dialed, the broker accepts.
    handle.await_open().await;
    assert_eq!(handle.open_count(), 2);
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    // Subscription re-asserted first, then the buffered publish flushed.
    let frames = handle.frames_eventually(2).await;
    assert_eq!(
        frames,
        vec![
            Frame::Subscribe {
                filter: "status/#".to_string(),
                qos: QosLevel::AtMostOnce,
            },
            Frame::Publish {
                topic: "devices/rover/cmd".to_string(),
                payload: b"P".to_vec(),
                qos: QosLevel::AtMostOnce,
                retain: false,
            },
        ]
    );

    assert_eq!(
        &*disconnects.lock().unwrap(),
        &[DisconnectReason::Link("connection reset".to_string())]
    );
    assert_eq!(session.metrics().snapshot().unsolicited_drops, 1);
}

#[tokio::test]
async fn test_queued_publishes_flush_before_new_ones() {
    let (session, mut handle) = session_with_policy(fast_policy());

    session.connect("mqtt://broker:1883").unwrap();
    handle.await_open().await;

    // Publish while still connecting: buffered.
    session
        .publish("devices/rover/cmd", "old", QosLevel::AtMostOnce, false)
        .unwrap();
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();
    // Published after the drain began: must come out after the flush.
    session
        .publish("devices/rover/cmd", "new", QosLevel::AtMostOnce, false)
        .unwrap();

    let frames = handle.frames_eventually(2).await;
    let payloads: Vec<String> = frames
        .iter()
        .map(|f| match f {
            Frame::Publish { payload, .. } => String::from_utf8(payload.clone()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        })
        .collect();
    assert_eq!(payloads, vec!["old", "new"]);
}

#[tokio::test]
async fn test_explicit_disconnect_cancels_pending_reconnect() {
    let policy = ReconnectPolicy {
        base_delay: Duration::from_millis(50),
        ..fast_policy()
    };
    let (session, mut handle) = session_with_policy(policy);

    session.connect("mqtt://broker:1883").unwrap();
    handle.await_open().await;
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    handle.link_down("connection reset");
    wait_for_state(&session, ConnectionState::Reconnecting).await;

    // Disconnect while the backoff timer is pending.
    session.disconnect().unwrap();
    wait_for_state(&session, ConnectionState::Disconnected).await;

    // Well past the backoff delay: no new attempt may appear.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.open_count(), 1);
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_disabled_goes_down_and_stays_down() {
    let policy = ReconnectPolicy {
        enabled: false,
        ..fast_policy()
    };
    let (session, mut handle) = session_with_policy(policy);

    session.connect("mqtt://broker:1883").unwrap();
    handle.await_open().await;
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    handle.link_down("connection reset");
    wait_for_state(&session, ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.open_count(), 1);
}

#[tokio::test]
async fn test_failed_attempts_keep_retrying() {
    let (session, mut handle) = session_with_policy(fast_policy());

    session.connect("mqtt://broker:1883").unwrap();

    // Refuse three attempts in a row; the session must keep dialing.
    for _ in 0..3 {
        handle.await_open().await;
        handle.link_down("connection refused");
    }
    handle.await_open().await;
    assert!(handle.open_count() >= 4);

    // Then let it through.
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(session.metrics().snapshot().connections_established, 1);
}

#[tokio::test]
async fn test_failed_explicit_connect_fires_failure_callback() {
    let (session, mut handle) = session_with_policy(fast_policy());

    let results: Arc<Mutex<Vec<ConnectResult>>> = Arc::new(Mutex::new(Vec::new()));
    let results_clone = results.clone();
    session
        .on_connect(move |result| results_clone.lock().unwrap().push(result.clone()))
        .unwrap();

    session.connect("mqtt://broker:1883").unwrap();
    handle.await_open().await;
    handle.link_down("connection refused");
    wait_for_state(&session, ConnectionState::Reconnecting).await;

    assert_eq!(
        &*results.lock().unwrap(),
        &[ConnectResult::Failed("connection refused".to_string())]
    );

    // Automatic retries do not repeat the failure announcement.
    handle.await_open().await;
    handle.link_down("connection refused");
    wait_for_state(&session, ConnectionState::Reconnecting).await;
    assert_eq!(results.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconnect_after_open_setup_failure() {
    let (session, mut handle) = session_with_policy(fast_policy());

    // First dial fails at setup time, before any link exists.
    handle.fail_next_open();
    session.connect("mqtt://broker:1883").unwrap();
    wait_for_state(&session, ConnectionState::Reconnecting).await;

    // The retry goes through normally.
    handle.await_open().await;
    handle.link_up();
    session
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();
}
