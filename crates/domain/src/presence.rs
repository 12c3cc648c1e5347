use serde::{Deserialize, Serialize};

/// 用户在线状态，随 `user_status` 事件广播，不落库。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}
