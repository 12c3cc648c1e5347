use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use application::store::memory::{InMemoryMessageStore, InMemoryUserDirectory};
use application::{
    Clock, MessageRelay, MessageRelayDependencies, PresenceTracker, RoomRegistry, SignalRouter,
    SystemClock,
};
use config::SessionConfig;
use domain::{ClientEvent, ServerEvent, UserId};
use web_api::{router, AppState, SessionTokens};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 用内存网关组装的测试后端，不依赖外部服务。
pub struct TestBackend {
    pub addr: SocketAddr,
    pub directory: Arc<InMemoryUserDirectory>,
    pub tokens: Arc<SessionTokens>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestBackend {
    pub async fn start() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryMessageStore::new(clock.clone()));
        let directory = Arc::new(InMemoryUserDirectory::new());
        let rooms = Arc::new(RoomRegistry::new());
        let presence = Arc::new(PresenceTracker::new());
        let signals = Arc::new(SignalRouter::new(rooms.clone(), clock));
        let relay = Arc::new(MessageRelay::new(MessageRelayDependencies {
            store: store.clone(),
            directory: directory.clone(),
            rooms: rooms.clone(),
        }));
        let tokens = Arc::new(SessionTokens::new(SessionConfig {
            secret: "integration-test-secret-key-32-chars!!".to_string(),
            expiration_hours: 24,
        }));

        let state = AppState::new(
            relay,
            rooms,
            presence,
            signals,
            store,
            directory.clone(),
            tokens.clone(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            directory,
            tokens,
            shutdown: Some(shutdown_tx),
        }
    }

    /// 在用户目录注册一个用户并签发会话令牌。
    pub async fn register_user(&self) -> (UserId, String) {
        let id = UserId::new(Uuid::new_v4());
        self.directory.add_user(id).await;
        let token = self.tokens.issue(id).expect("issue token");
        (id, token)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/ws?token={}", self.addr, token),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn connect_ws(url: &str) -> WsClient {
    let (ws, _response) = connect_async(url).await.expect("ws connect");
    ws
}

pub async fn send_event(ws: &mut WsClient, event: &ClientEvent) {
    let json = serde_json::to_string(event).expect("serialize client event");
    ws.send(WsMessage::Text(json.into())).await.expect("ws send");
}

/// 读取下一个服务端事件，忽略非文本帧。
pub async fn next_event(ws: &mut WsClient, timeout: Duration) -> Option<ServerEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => return Some(event),
                    Err(_) => continue,
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

/// 跳过无关事件直到命中谓词。
pub async fn wait_for(
    ws: &mut WsClient,
    timeout: Duration,
    predicate: impl Fn(&ServerEvent) -> bool,
) -> Option<ServerEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match next_event(ws, remaining).await {
            Some(event) if predicate(&event) => return Some(event),
            Some(_) => continue,
            None => return None,
        }
    }
}

/// 在窗口期内断言没有命中谓词的事件出现。
pub async fn assert_silent(
    ws: &mut WsClient,
    window: Duration,
    predicate: impl Fn(&ServerEvent) -> bool,
) {
    if let Some(event) = wait_for(ws, window, &predicate).await {
        panic!("unexpected event during quiet window: {event:?}");
    }
}
