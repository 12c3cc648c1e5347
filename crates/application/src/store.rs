//! 持久化网关与用户目录契约
//!
//! 中继只依赖这两个接口；数据库实现位于基础设施层，内存实现用于测试
//! 与单进程部署。

use async_trait::async_trait;
use thiserror::Error;

use domain::{Message, MessageDraft, UserId};

/// 持久化层错误。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl StoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 消息持久化网关。
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化一条消息，由存储分配 id 与 created_at。
    /// 草稿在调用前已通过校验；重复写入由调用方的至少一次语义承担。
    async fn insert_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        draft: MessageDraft,
    ) -> Result<Message, StoreError>;

    /// 返回两个用户之间的全部消息，按 created_at 升序。
    async fn find_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<Message>, StoreError>;
}

/// 用户目录，中继用它把收件人 id 解析为真实存在的用户。
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, id: UserId) -> Result<bool, StoreError>;
}

/// 内存实现（用于测试与不依赖数据库的场景）
pub mod memory {
    use std::collections::HashSet;
    use std::sync::Arc;

    use tokio::sync::RwLock;
    use uuid::Uuid;

    use super::*;
    use crate::clock::Clock;
    use domain::MessageId;

    pub struct InMemoryMessageStore {
        messages: RwLock<Vec<Message>>,
        clock: Arc<dyn Clock>,
    }

    impl InMemoryMessageStore {
        pub fn new(clock: Arc<dyn Clock>) -> Self {
            Self {
                messages: RwLock::new(Vec::new()),
                clock,
            }
        }

        /// 当前持久化的消息总数。
        pub async fn len(&self) -> usize {
            self.messages.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.messages.read().await.is_empty()
        }
    }

    #[async_trait]
    impl MessageStore for InMemoryMessageStore {
        async fn insert_message(
            &self,
            sender_id: UserId,
            recipient_id: UserId,
            draft: MessageDraft,
        ) -> Result<Message, StoreError> {
            let message = Message {
                id: MessageId::new(Uuid::new_v4()),
                sender_id,
                recipient_id,
                content: draft.content,
                attachment_ref: draft.attachment_ref,
                created_at: self.clock.now(),
                read_at: None,
            };
            self.messages.write().await.push(message.clone());
            Ok(message)
        }

        async fn find_conversation(
            &self,
            user_a: UserId,
            user_b: UserId,
        ) -> Result<Vec<Message>, StoreError> {
            let messages = self.messages.read().await;
            let mut conversation: Vec<Message> = messages
                .iter()
                .filter(|m| {
                    (m.sender_id == user_a && m.recipient_id == user_b)
                        || (m.sender_id == user_b && m.recipient_id == user_a)
                })
                .cloned()
                .collect();
            conversation.sort_by_key(|m| m.created_at);
            Ok(conversation)
        }
    }

    #[derive(Default)]
    pub struct InMemoryUserDirectory {
        users: RwLock<HashSet<UserId>>,
    }

    impl InMemoryUserDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_user(&self, id: UserId) {
            self.users.write().await.insert(id);
        }
    }

    #[async_trait]
    impl UserDirectory for InMemoryUserDirectory {
        async fn user_exists(&self, id: UserId) -> Result<bool, StoreError> {
            Ok(self.users.read().await.contains(&id))
        }
    }
}
