//! 瞬时信号路由
//!
//! 输入指示与已读回执只路由到目标房间，不持久化、不回执、不重试，
//! 丢失可接受。

use std::sync::Arc;

use crate::clock::Clock;
use crate::rooms::RoomRegistry;
use domain::{MessageId, ReceiptStatus, ServerEvent, UserId};

pub struct SignalRouter {
    rooms: Arc<RoomRegistry>,
    clock: Arc<dyn Clock>,
}

impl SignalRouter {
    pub fn new(rooms: Arc<RoomRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { rooms, clock }
    }

    /// 把输入指示转发到收件人房间（`userTyping`）。
    pub async fn forward_typing(&self, sender_id: UserId, recipient_id: UserId, is_typing: bool) {
        self.rooms
            .send_to_user(
                recipient_id,
                ServerEvent::UserTyping {
                    user_id: sender_id,
                    is_typing,
                },
            )
            .await;
    }

    /// 把已读回执转发到原作者房间（`messageStatus`）。
    pub async fn forward_read(&self, author_id: UserId, message_ids: Vec<MessageId>) {
        self.rooms
            .send_to_user(
                author_id,
                ServerEvent::MessageStatus {
                    message_ids,
                    status: ReceiptStatus::Read,
                    timestamp: self.clock.now(),
                },
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use domain::ConnectionId;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    async fn joined(registry: &RoomRegistry, user_id: UserId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::generate();
        registry.register(conn, tx).await;
        registry.bind(conn, user_id).await;
        rx
    }

    #[tokio::test]
    async fn typing_reaches_only_the_recipient_room() {
        let rooms = Arc::new(RoomRegistry::new());
        let router = SignalRouter::new(rooms.clone(), Arc::new(SystemClock));
        let alice = user();
        let bob = user();

        let mut bob_rx = joined(&rooms, bob).await;
        let mut alice_rx = joined(&rooms, alice).await;

        router.forward_typing(alice, bob, true).await;

        match bob_rx.recv().await {
            Some(ServerEvent::UserTyping { user_id, is_typing }) => {
                assert_eq!(user_id, alice);
                assert!(is_typing);
            }
            other => panic!("expected userTyping, got {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_receipt_reaches_the_author_room() {
        let rooms = Arc::new(RoomRegistry::new());
        let router = SignalRouter::new(rooms.clone(), Arc::new(SystemClock));
        let author = user();
        let ids = vec![domain::MessageId::new(Uuid::new_v4())];

        let mut author_rx = joined(&rooms, author).await;
        router.forward_read(author, ids.clone()).await;

        match author_rx.recv().await {
            Some(ServerEvent::MessageStatus {
                message_ids,
                status,
                ..
            }) => {
                assert_eq!(message_ids, ids);
                assert_eq!(status, ReceiptStatus::Read);
            }
            other => panic!("expected messageStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn signals_to_empty_rooms_are_dropped() {
        let rooms = Arc::new(RoomRegistry::new());
        let router = SignalRouter::new(rooms, Arc::new(SystemClock));
        // 没有任何连接：转发不报错
        router.forward_typing(user(), user(), false).await;
        router.forward_read(user(), Vec::new()).await;
    }
}
