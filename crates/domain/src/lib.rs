//! 私信投递系统核心领域模型
//!
//! 包含消息实体、在线状态以及实时通道上的类型化事件定义。

pub mod errors;
pub mod events;
pub mod message;
pub mod presence;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::*;
pub use presence::*;
pub use value_objects::*;
