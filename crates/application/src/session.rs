use async_trait::async_trait;

use domain::UserId;

/// 会话解析器。
///
/// 握手阶段把连接携带的会话令牌解析为身份；令牌缺失或无效时返回
/// `None`，连接保持未绑定状态，不加入任何房间。
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<UserId>;
}
