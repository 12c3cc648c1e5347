//! Web API 层。
//!
//! 提供 Axum 路由，把 HTTP / WebSocket 请求委托给应用层的中继、
//! 信号路由与在线状态追踪。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::SessionTokens;
pub use routes::router;
pub use state::AppState;
