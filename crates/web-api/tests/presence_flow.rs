mod support;

use std::time::Duration;

use domain::{PresenceStatus, ServerEvent, UserId};
use support::{assert_silent, connect_ws, wait_for, TestBackend};

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(300);

fn is_status(event: &ServerEvent, user: UserId, status: PresenceStatus) -> bool {
    matches!(
        event,
        ServerEvent::UserStatus {
            user_id,
            status: event_status,
        } if *user_id == user && *event_status == status
    )
}

#[tokio::test]
async fn online_and_offline_are_broadcast_exactly_once() {
    let mut backend = TestBackend::start().await;
    let (_alice, alice_token) = backend.register_user().await;
    let (bob, bob_token) = backend.register_user().await;

    let mut alice_ws = connect_ws(&backend.ws_url(Some(&alice_token))).await;

    // bob 上线：其他连接收到一次 online
    let mut bob_ws = connect_ws(&backend.ws_url(Some(&bob_token))).await;
    wait_for(&mut alice_ws, WAIT, |event| {
        is_status(event, bob, PresenceStatus::Online)
    })
    .await
    .expect("alice should see bob online");
    assert_silent(&mut alice_ws, QUIET, |event| {
        is_status(event, bob, PresenceStatus::Online)
    })
    .await;

    // bob 下线：恰好一次 offline
    bob_ws.close(None).await.expect("close bob");
    wait_for(&mut alice_ws, WAIT, |event| {
        is_status(event, bob, PresenceStatus::Offline)
    })
    .await
    .expect("alice should see bob offline");
    assert_silent(&mut alice_ws, QUIET, |event| {
        is_status(event, bob, PresenceStatus::Offline)
    })
    .await;

    // 重连：恰好一次新的 online
    let _bob_ws2 = connect_ws(&backend.ws_url(Some(&bob_token))).await;
    wait_for(&mut alice_ws, WAIT, |event| {
        is_status(event, bob, PresenceStatus::Online)
    })
    .await
    .expect("alice should see bob online again");

    backend.shutdown();
}

#[tokio::test]
async fn concurrent_connections_are_reference_counted() {
    let mut backend = TestBackend::start().await;
    let (_alice, alice_token) = backend.register_user().await;
    let (bob, bob_token) = backend.register_user().await;

    let mut alice_ws = connect_ws(&backend.ws_url(Some(&alice_token))).await;

    // bob 开两条并发连接：只广播一次 online
    let mut bob_first = connect_ws(&backend.ws_url(Some(&bob_token))).await;
    wait_for(&mut alice_ws, WAIT, |event| {
        is_status(event, bob, PresenceStatus::Online)
    })
    .await
    .expect("first connection announces online");

    let mut bob_second = connect_ws(&backend.ws_url(Some(&bob_token))).await;
    assert_silent(&mut alice_ws, QUIET, |event| {
        is_status(event, bob, PresenceStatus::Online)
    })
    .await;

    // 关掉其中一条：还有连接存活，不广播 offline
    bob_first.close(None).await.expect("close first");
    assert_silent(&mut alice_ws, QUIET, |event| {
        is_status(event, bob, PresenceStatus::Offline)
    })
    .await;

    // 关掉最后一条：此时才广播 offline
    bob_second.close(None).await.expect("close second");
    wait_for(&mut alice_ws, WAIT, |event| {
        is_status(event, bob, PresenceStatus::Offline)
    })
    .await
    .expect("offline after last connection closes");

    backend.shutdown();
}

#[tokio::test]
async fn unbound_connections_do_not_affect_presence() {
    let mut backend = TestBackend::start().await;
    let (_alice, alice_token) = backend.register_user().await;

    let mut alice_ws = connect_ws(&backend.ws_url(Some(&alice_token))).await;

    // 匿名连接来去：没有任何 user_status 广播
    let mut anon_ws = connect_ws(&backend.ws_url(None)).await;
    assert_silent(&mut alice_ws, QUIET, |event| {
        matches!(event, ServerEvent::UserStatus { .. })
    })
    .await;

    anon_ws.close(None).await.expect("close anon");
    assert_silent(&mut alice_ws, QUIET, |event| {
        matches!(event, ServerEvent::UserStatus { .. })
    })
    .await;

    backend.shutdown();
}
