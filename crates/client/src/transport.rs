//! 长连接传输
//!
//! 每个客户端会话持有一条自动重连的 WebSocket 连接。监督任务负责
//! 建连与退避重连；读写各占一个任务；回执通过客户端生成的 nonce
//! 与发送配对，等待有界超时。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use uuid::Uuid;

use domain::{
    ClientEvent, MessageDraft, MessageId, SendFailureCode, ServerEvent, Timestamp, UserId,
};

/// 重连策略：延迟从起始值翻倍增长，封顶后恒定，尝试次数有界。
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// 第 `attempt` 次重试前的等待时长（attempt 从 0 开始）。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let factor = 1u64 << exp;
        let delay = Duration::from_millis(
            (self.initial_delay.as_millis() as u64).saturating_mul(factor),
        );
        delay.min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let jitter_ceiling = base.as_millis() as u64 / 10;
        if jitter_ceiling == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..jitter_ceiling);
        base + Duration::from_millis(jitter)
    }
}

/// 传输层错误。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 当前没有可用连接；条目留在队列里等重连。
    #[error("传输未连接")]
    Disconnected,

    /// 等待回执超时；为避免误判，条目视作仍在排队而非失败。
    #[error("等待回执超时")]
    AckTimeout,

    /// 服务端明确拒绝。
    #[error("发送被拒绝: {code:?}: {message}")]
    Rejected {
        code: SendFailureCode,
        message: String,
    },
}

impl TransportError {
    /// 是否为服务端的明确拒绝（计入重试上限的失败）。
    pub fn is_definitive(&self) -> bool {
        matches!(self, TransportError::Rejected { .. })
    }
}

/// 私信发送成功的回执。
#[derive(Debug, Clone)]
pub struct DeliveryAck {
    pub message_id: MessageId,
    pub recipient_id: UserId,
    pub timestamp: Timestamp,
}

/// 传输层对外发布的事件。
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// 连接（重新）建立；投递队列收到后立即冲刷排队消息。
    Up,
    Down,
    /// 服务端推送的业务事件。
    Server(ServerEvent),
}

/// 投递队列依赖的传输契约。
#[async_trait]
pub trait MessageTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// 发送一条私信并等待回执。
    async fn send_private_message(
        &self,
        recipient_id: UserId,
        draft: MessageDraft,
    ) -> Result<DeliveryAck, TransportError>;
}

type PendingAcks = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Result<DeliveryAck, TransportError>>>>>;

/// 基于 tokio-tungstenite 的长连接实现。
pub struct SocketTransport {
    connected: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    events: broadcast::Sender<TransportEvent>,
    pending_acks: PendingAcks,
    shutdown: watch::Sender<bool>,
    ack_timeout: Duration,
}

impl SocketTransport {
    /// 建立传输并启动监督任务。URL 可以携带会话令牌查询参数，
    /// 服务端据此在握手时绑定身份。
    pub fn connect(url: String, policy: ReconnectPolicy, ack_timeout: Duration) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(256);
        let pending_acks: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(supervise(
            url,
            policy,
            connected.clone(),
            Arc::new(Mutex::new(outgoing_rx)),
            events_tx.clone(),
            pending_acks.clone(),
            shutdown_rx,
        ));

        Self {
            connected,
            outgoing: outgoing_tx,
            events: events_tx,
            pending_acks,
            shutdown: shutdown_tx,
            ack_timeout,
        }
    }

    /// 订阅传输事件（连接状态变化与服务端推送）。
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// 发后即忘地发送一个事件（输入指示、已读回执）。
    pub fn send(&self, event: ClientEvent) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.outgoing
            .send(event)
            .map_err(|_| TransportError::Disconnected)
    }

    /// 主动断开；监督任务随之退出，不再重连。
    pub fn disconnect(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl MessageTransport for SocketTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_private_message(
        &self,
        recipient_id: UserId,
        draft: MessageDraft,
    ) -> Result<DeliveryAck, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let nonce = Uuid::new_v4();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_acks.lock().await.insert(nonce, ack_tx);

        let event = ClientEvent::PrivateMessage {
            nonce,
            recipient_id,
            draft,
        };
        if self.outgoing.send(event).is_err() {
            self.pending_acks.lock().await.remove(&nonce);
            return Err(TransportError::Disconnected);
        }

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(outcome)) => outcome,
            // 等待期间连接断开，回执发送端被清理
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                self.pending_acks.lock().await.remove(&nonce);
                Err(TransportError::AckTimeout)
            }
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// 监督循环：建连、分派读写任务、断线后按策略退避重连。
async fn supervise(
    url: String,
    policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
    outgoing: Arc<Mutex<mpsc::UnboundedReceiver<ClientEvent>>>,
    events: broadcast::Sender<TransportEvent>,
    pending_acks: PendingAcks,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                attempt = 0;
                connected.store(true, Ordering::SeqCst);
                let _ = events.send(TransportEvent::Up);
                tracing::info!("传输已连接");

                let (mut write, mut read) = stream.split();
                let (close_tx, mut close_rx) = mpsc::unbounded_channel::<()>();

                let read_task = {
                    let events = events.clone();
                    let pending_acks = pending_acks.clone();
                    let close_tx = close_tx.clone();
                    tokio::spawn(async move {
                        while let Some(frame) = read.next().await {
                            match frame {
                                Ok(WsMessage::Text(text)) => {
                                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                        Ok(event) => {
                                            resolve_ack(&pending_acks, &event).await;
                                            let _ = events.send(TransportEvent::Server(event));
                                        }
                                        Err(err) => {
                                            tracing::warn!(error = %err, "解析服务端事件失败");
                                        }
                                    }
                                }
                                Ok(WsMessage::Close(_)) => break,
                                Ok(_) => {}
                                Err(err) => {
                                    tracing::warn!(error = %err, "传输读取错误");
                                    break;
                                }
                            }
                        }
                        let _ = close_tx.send(());
                    })
                };

                let write_task = {
                    let outgoing = outgoing.clone();
                    tokio::spawn(async move {
                        loop {
                            let event = {
                                let mut rx = outgoing.lock().await;
                                rx.recv().await
                            };
                            match event {
                                Some(event) => {
                                    let payload = match serde_json::to_string(&event) {
                                        Ok(json) => json,
                                        Err(err) => {
                                            tracing::warn!(error = %err, "序列化客户端事件失败");
                                            continue;
                                        }
                                    };
                                    if write.send(WsMessage::Text(payload.into())).await.is_err() {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                        let _ = close_tx.send(());
                    })
                };

                tokio::select! {
                    _ = close_rx.recv() => {}
                    _ = shutdown.changed() => {}
                }

                read_task.abort();
                write_task.abort();
                connected.store(false, Ordering::SeqCst);
                fail_pending(&pending_acks).await;
                let _ = events.send(TransportEvent::Down);
                tracing::info!("传输已断开");
            }
            Err(err) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(error = %err, attempts = attempt, "重连次数耗尽，停止重连");
                    break;
                }
                let delay = policy.jittered_delay(attempt);
                tracing::info!(
                    error = %err,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "连接失败，稍后重连"
                );
                attempt += 1;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
}

/// 把 nonce 配对的回执送回等待中的发送调用。
async fn resolve_ack(pending_acks: &PendingAcks, event: &ServerEvent) {
    match event {
        ServerEvent::MessageSent {
            nonce,
            message_id,
            recipient_id,
            timestamp,
            ..
        } => {
            if let Some(tx) = pending_acks.lock().await.remove(nonce) {
                let _ = tx.send(Ok(DeliveryAck {
                    message_id: *message_id,
                    recipient_id: *recipient_id,
                    timestamp: *timestamp,
                }));
            }
        }
        ServerEvent::SendFailed {
            nonce,
            code,
            message,
        } => {
            if let Some(tx) = pending_acks.lock().await.remove(nonce) {
                let _ = tx.send(Err(TransportError::Rejected {
                    code: *code,
                    message: message.clone(),
                }));
            }
        }
        _ => {}
    }
}

/// 断线时让所有等待中的回执立刻以断连失败返回。
async fn fail_pending(pending_acks: &PendingAcks) {
    let mut acks = pending_acks.lock().await;
    for (_, tx) in acks.drain() {
        let _ = tx.send(Err(TransportError::Disconnected));
    }
}
