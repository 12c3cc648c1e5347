//! 客户端实时层。
//!
//! 包含自动重连的长连接传输与投递队列：消息先入队，传输可用时发送，
//! 断线与超时自动重试，直到拿到服务端回执或耗尽重试次数。

pub mod delivery;
pub mod transport;

pub use delivery::{DeliveryConfig, DeliveryNotice, DeliveryQueue};
pub use transport::{
    DeliveryAck, MessageTransport, ReconnectPolicy, SocketTransport, TransportError, TransportEvent,
};
