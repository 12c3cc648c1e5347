//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 消息正文与附件引用同时缺失
    #[error("消息内容为空")]
    EmptyMessage,
}
