//! 消息中继
//!
//! 服务端私信投递的核心操作：校验草稿、解析收件人、持久化、
//! 向收件人房间扇出。持久化是唯一需要等待的步骤；房间推送
//! 发后即忘，空房间不算失败。

use std::sync::Arc;

use thiserror::Error;

use crate::rooms::RoomRegistry;
use crate::store::{MessageStore, StoreError, UserDirectory};
use domain::{DomainError, Message, MessageDraft, SendFailureCode, ServerEvent, UserId};

/// 中继错误分类。
///
/// 三类错误都会以失败回执的形式返回给发送方；`Persistence` 不做
/// 服务端重试，客户端投递队列的重发会作为新消息写入（至少一次语义）。
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("无效消息: {0}")]
    InvalidMessage(#[from] DomainError),

    #[error("收件人不存在: {0}")]
    RecipientNotFound(UserId),

    #[error("持久化失败: {0}")]
    Persistence(#[from] StoreError),
}

impl RelayError {
    /// 映射到回执里的失败码。
    pub fn failure_code(&self) -> SendFailureCode {
        match self {
            RelayError::InvalidMessage(_) => SendFailureCode::InvalidMessage,
            RelayError::RecipientNotFound(_) => SendFailureCode::RecipientNotFound,
            RelayError::Persistence(_) => SendFailureCode::PersistenceError,
        }
    }
}

pub struct MessageRelayDependencies {
    pub store: Arc<dyn MessageStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub rooms: Arc<RoomRegistry>,
}

pub struct MessageRelay {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn UserDirectory>,
    rooms: Arc<RoomRegistry>,
}

impl MessageRelay {
    pub fn new(deps: MessageRelayDependencies) -> Self {
        Self {
            store: deps.store,
            directory: deps.directory,
            rooms: deps.rooms,
        }
    }

    /// 投递一条私信。
    ///
    /// 返回已持久化的消息；调用方据此向发送方回执 `messageSent`。
    /// 成功返回意味着消息已经落库，不代表收件人此刻在线收到。
    pub async fn relay(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        draft: MessageDraft,
    ) -> Result<Message, RelayError> {
        draft.validate()?;

        if !self.directory.user_exists(recipient_id).await? {
            return Err(RelayError::RecipientNotFound(recipient_id));
        }

        let message = self
            .store
            .insert_message(sender_id, recipient_id, draft)
            .await?;

        let delivered = self
            .rooms
            .send_to_user(
                recipient_id,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;

        tracing::info!(
            message_id = %message.id,
            sender_id = %sender_id,
            recipient_id = %recipient_id,
            delivered,
            "私信已持久化并推送"
        );

        Ok(message)
    }
}
