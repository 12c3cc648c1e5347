//! 基础设施层实现。
//!
//! 提供 PostgreSQL 持久化网关与用户目录，实现应用层定义的接口。

pub mod migrations;
pub mod repository;

pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageStore, PgUserDirectory};
