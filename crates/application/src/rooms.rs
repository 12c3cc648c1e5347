//! 房间注册表
//!
//! 维护每条活跃连接的出站事件通道，以及按用户分组的广播房间
//! （即 `user_<id>` 房间）。推送一律走 `unbounded_send`，不阻塞、
//! 不保证相互顺序；空房间推送是 no-op 而非错误。

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

use domain::{ConnectionId, ServerEvent, UserId};

struct Seat {
    user_id: Option<UserId>,
    sender: UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Seat>,
    rooms: HashMap<UserId, HashMap<ConnectionId, UnboundedSender<ServerEvent>>>,
}

#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条新连接（尚未绑定身份）。
    pub async fn register(&self, connection_id: ConnectionId, sender: UnboundedSender<ServerEvent>) {
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            Seat {
                user_id: None,
                sender,
            },
        );
    }

    /// 把连接绑定到身份并加入其 `user_<id>` 房间。
    pub async fn bind(&self, connection_id: ConnectionId, user_id: UserId) {
        let mut state = self.state.write().await;
        let Some(seat) = state.connections.get_mut(&connection_id) else {
            tracing::warn!(connection_id = %connection_id, "绑定失败：连接不存在");
            return;
        };
        seat.user_id = Some(user_id);
        let sender = seat.sender.clone();
        state
            .rooms
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);
        tracing::debug!(connection_id = %connection_id, user_id = %user_id, "连接加入用户房间");
    }

    /// 注销连接并退出房间；返回曾绑定的身份。
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<UserId> {
        let mut state = self.state.write().await;
        let seat = state.connections.remove(&connection_id)?;
        if let Some(user_id) = seat.user_id {
            if let Some(room) = state.rooms.get_mut(&user_id) {
                room.remove(&connection_id);
                if room.is_empty() {
                    state.rooms.remove(&user_id);
                }
            }
            return Some(user_id);
        }
        None
    }

    /// 推送事件到指定用户房间内的全部连接，返回送达的连接数。
    /// 房间为空时不报错——离线收件人下次连接后通过历史查询补齐。
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> usize {
        let state = self.state.read().await;
        let Some(room) = state.rooms.get(&user_id) else {
            return 0;
        };
        let mut delivered = 0;
        for (connection_id, sender) in room {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(connection_id = %connection_id, "推送失败：连接已关闭");
            }
        }
        delivered
    }

    /// 推送事件到单条连接。
    pub async fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection_id)
            .map(|seat| seat.sender.send(event).is_ok())
            .unwrap_or(false)
    }

    /// 广播事件到除指定连接外的全部连接（含未绑定连接），
    /// 用于 `user_status` 上下线通知。
    pub async fn broadcast_except(&self, origin: ConnectionId, event: ServerEvent) -> usize {
        let state = self.state.read().await;
        let mut delivered = 0;
        for (connection_id, seat) in &state.connections {
            if *connection_id == origin {
                continue;
            }
            if seat.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// 房间内的连接数（空房间为 0）。
    pub async fn room_size(&self, user_id: UserId) -> usize {
        let state = self.state.read().await;
        state.rooms.get(&user_id).map(|r| r.len()).unwrap_or(0)
    }
}
