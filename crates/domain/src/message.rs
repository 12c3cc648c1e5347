use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 已持久化的私信。
///
/// `id` 与 `created_at` 由持久化网关在写入时分配；除 `read_at` 外，
/// 消息一经持久化不再变更。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: Option<String>,
    pub attachment_ref: Option<String>,
    pub created_at: Timestamp,
    pub read_at: Option<Timestamp>,
}

/// 客户端提交的消息草稿。
///
/// 不变量：正文与附件引用不能同时缺失，空白正文视同缺失。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub content: Option<String>,
    pub attachment_ref: Option<String>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            attachment_ref: None,
        }
    }

    pub fn attachment(attachment_ref: impl Into<String>) -> Self {
        Self {
            content: None,
            attachment_ref: Some(attachment_ref.into()),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let has_content = self
            .content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if !has_content && self.attachment_ref.is_none() {
            return Err(DomainError::EmptyMessage);
        }
        Ok(())
    }
}
