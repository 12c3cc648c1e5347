//! 实时通道上的类型化事件
//!
//! 客户端与服务端之间的全部实时事件都收敛在两个带标签的联合类型里，
//! 事件名沿用线上协议：`privateMessage` / `newMessage` / `messageSent` /
//! `sendFailed` / `typing` / `userTyping` / `messageRead` / `messageStatus` /
//! `user_status`。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, MessageDraft};
use crate::presence::PresenceStatus;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 客户端发往服务端的事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// 私信发送请求；`nonce` 由客户端生成，服务端在回执中原样带回，
    /// 用于把确认对应到具体的一次发送。
    #[serde(rename = "privateMessage")]
    PrivateMessage {
        nonce: Uuid,
        recipient_id: UserId,
        draft: MessageDraft,
    },

    /// 输入指示，发后即忘。
    #[serde(rename = "typing")]
    Typing {
        sender_id: UserId,
        recipient_id: UserId,
        is_typing: bool,
    },

    /// 已读回执；`sender_id` 是被读消息的作者，回执路由到其房间。
    #[serde(rename = "messageRead")]
    MessageRead {
        sender_id: UserId,
        message_ids: Vec<MessageId>,
    },
}

/// 服务端发往客户端的事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// 推送给收件人房间的完整消息。
    #[serde(rename = "newMessage")]
    NewMessage { message: Message },

    /// 发送成功回执；意味着消息已经持久化，不代表对方在线收到。
    #[serde(rename = "messageSent")]
    MessageSent {
        nonce: Uuid,
        message_id: MessageId,
        recipient_id: UserId,
        status: AckStatus,
        timestamp: Timestamp,
    },

    /// 发送失败回执。
    #[serde(rename = "sendFailed")]
    SendFailed {
        nonce: Uuid,
        code: SendFailureCode,
        message: String,
    },

    /// 对方正在输入。
    #[serde(rename = "userTyping")]
    UserTyping { user_id: UserId, is_typing: bool },

    /// 已读回执，推送到原作者房间。
    #[serde(rename = "messageStatus")]
    MessageStatus {
        message_ids: Vec<MessageId>,
        status: ReceiptStatus,
        timestamp: Timestamp,
    },

    /// 在线状态广播。
    #[serde(rename = "user_status")]
    UserStatus {
        user_id: UserId,
        status: PresenceStatus,
    },
}

/// 发送回执状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Sent,
}

/// 已读回执状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Read,
}

/// 发送失败原因，对应中继的错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendFailureCode {
    InvalidMessage,
    RecipientNotFound,
    PersistenceError,
}
