//! 在线状态追踪
//!
//! 同一身份允许多条并发连接，这里按身份对连接做引用计数：
//! 第一条连接绑定时上线，最后一条连接关闭时下线。中间的连接增减
//! 不产生任何广播。

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use domain::{ConnectionId, UserId};

#[derive(Default)]
pub struct PresenceTracker {
    connections: RwLock<HashMap<UserId, HashSet<ConnectionId>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条绑定到身份的连接；返回该身份是否因此上线。
    pub async fn connection_bound(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let set = connections.entry(user_id).or_default();
        let was_offline = set.is_empty();
        set.insert(connection_id);
        if was_offline {
            tracing::info!(user_id = %user_id, "用户上线");
        }
        was_offline
    }

    /// 移除一条连接；返回该身份是否因此下线。
    pub async fn connection_closed(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let Some(set) = connections.get_mut(&user_id) else {
            return false;
        };
        set.remove(&connection_id);
        if set.is_empty() {
            connections.remove(&user_id);
            tracing::info!(user_id = %user_id, "用户下线");
            return true;
        }
        false
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }
}
