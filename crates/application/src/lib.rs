//! 应用层实现。
//!
//! 这里提供实时投递的核心服务：消息中继、在线状态追踪、房间注册表与
//! 瞬时信号路由，以及对外部适配器（持久化网关、用户目录、会话解析、
//! 时钟）的抽象。

pub mod clock;
pub mod presence;
pub mod relay;
pub mod rooms;
pub mod session;
pub mod signals;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use presence::PresenceTracker;
pub use relay::{MessageRelay, MessageRelayDependencies, RelayError};
pub use rooms::RoomRegistry;
pub use session::SessionResolver;
pub use signals::SignalRouter;
pub use store::{MessageStore, StoreError, UserDirectory};
