use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;
use domain::{
    AckStatus, ClientEvent, ConnectionId, PresenceStatus, ServerEvent, UserId,
};

/// WebSocket 连接管理器
///
/// 封装单条连接的全部状态和逻辑，包括：
/// - 身份绑定与房间加入
/// - 客户端事件分发
/// - 在线状态广播
/// - 资源清理
pub struct ChannelConnection {
    socket: Option<WebSocket>,
    state: AppState,
    connection_id: ConnectionId,
    identity: Option<UserId>,
}

/// WebSocket 写操作命令，统一管理所有对 sender 的写入。
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

impl ChannelConnection {
    pub fn new(socket: WebSocket, state: AppState, identity: Option<UserId>) -> Self {
        Self {
            socket: Some(socket),
            state,
            connection_id: ConnectionId::generate(),
            identity,
        }
    }

    /// 运行连接主循环。
    pub async fn run(mut self) {
        let socket = self.socket.take().expect("Socket should be available");
        let (mut sender, mut incoming) = socket.split();

        let connection_id = self.connection_id;
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        self.state.rooms.register(connection_id, event_tx).await;

        // 绑定身份：加入 user_<id> 房间，首条连接才广播上线
        if let Some(user_id) = self.identity {
            self.state.rooms.bind(connection_id, user_id).await;
            let came_online = self
                .state
                .presence
                .connection_bound(user_id, connection_id)
                .await;
            if came_online {
                self.state
                    .rooms
                    .broadcast_except(
                        connection_id,
                        ServerEvent::UserStatus {
                            user_id,
                            status: PresenceStatus::Online,
                        },
                    )
                    .await;
            }
            tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket 连接已绑定身份");
        } else {
            tracing::info!(connection_id = %connection_id, "WebSocket 连接未携带有效会话，保持未绑定");
        }

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理写命令与房间推送
        let send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let result = match cmd {
                            WsCommand::SendText(text) => sender.send(WsMessage::Text(text.into())).await,
                            WsCommand::SendPong(data) => sender.send(WsMessage::Pong(data.into())).await,
                        };
                        if result.is_err() {
                            break;
                        }
                    }
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if sender.send(WsMessage::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "序列化服务端事件失败");
                            }
                        }
                    }
                }
            }
        });

        // 接收任务：解析并分发客户端事件
        let recv_state = self.state.clone();
        let recv_identity = self.identity;
        let recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                match message {
                    WsMessage::Text(text) => {
                        handle_client_event(&recv_state, connection_id, recv_identity, text.as_str())
                            .await;
                    }
                    WsMessage::Ping(data) => {
                        if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        });

        // 等待任一任务结束（连接断开）
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }

        // 清理：退出房间，末条连接才广播下线
        self.state.rooms.unregister(connection_id).await;
        if let Some(user_id) = self.identity {
            let went_offline = self
                .state
                .presence
                .connection_closed(user_id, connection_id)
                .await;
            if went_offline {
                self.state
                    .rooms
                    .broadcast_except(
                        connection_id,
                        ServerEvent::UserStatus {
                            user_id,
                            status: PresenceStatus::Offline,
                        },
                    )
                    .await;
            }
        }
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已断开并清理");
    }
}

/// 处理单个客户端事件。
///
/// 每个事件的失败只影响本次调用：解析失败或中继出错时记录日志、
/// 尽量回失败回执，绝不关闭连接或波及其他连接。
async fn handle_client_event(
    state: &AppState,
    connection_id: ConnectionId,
    identity: Option<UserId>,
    text: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(connection_id = %connection_id, error = %err, "无法解析客户端事件");
            return;
        }
    };

    match event {
        ClientEvent::PrivateMessage {
            nonce,
            recipient_id,
            draft,
        } => {
            let Some(sender_id) = identity else {
                tracing::warn!(connection_id = %connection_id, "未绑定连接试图发送私信，已忽略");
                return;
            };
            match state.relay.relay(sender_id, recipient_id, draft).await {
                Ok(message) => {
                    state
                        .rooms
                        .send_to_connection(
                            connection_id,
                            ServerEvent::MessageSent {
                                nonce,
                                message_id: message.id,
                                recipient_id,
                                status: AckStatus::Sent,
                                timestamp: message.created_at,
                            },
                        )
                        .await;
                }
                Err(err) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        sender_id = %sender_id,
                        error = %err,
                        "私信中继失败"
                    );
                    state
                        .rooms
                        .send_to_connection(
                            connection_id,
                            ServerEvent::SendFailed {
                                nonce,
                                code: err.failure_code(),
                                message: err.to_string(),
                            },
                        )
                        .await;
                }
            }
        }
        ClientEvent::Typing {
            sender_id,
            recipient_id,
            is_typing,
        } => {
            // 只接受与绑定身份一致的信号
            if identity != Some(sender_id) {
                tracing::warn!(connection_id = %connection_id, "输入指示身份不匹配，已忽略");
                return;
            }
            state
                .signals
                .forward_typing(sender_id, recipient_id, is_typing)
                .await;
        }
        ClientEvent::MessageRead {
            sender_id,
            message_ids,
        } => {
            if identity.is_none() {
                tracing::warn!(connection_id = %connection_id, "未绑定连接试图发送已读回执，已忽略");
                return;
            }
            state.signals.forward_read(sender_id, message_ids).await;
        }
    }
}
