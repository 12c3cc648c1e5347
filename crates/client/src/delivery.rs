//! 投递队列
//!
//! 持有所有尚未拿到发送回执的出站消息。入队即尝试发送；周期扫描
//! 与重连事件共同驱动同一个重试执行器，条目级别的在飞标记保证
//! 同一条消息同时只有一次中继调用。重试耗尽不再静默丢弃，而是
//! 向 UI 通道发出终态失败通知。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::transport::{MessageTransport, TransportEvent};
use domain::{MessageDraft, MessageId, Timestamp, UserId};

/// 投递队列参数。
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// 周期重试间隔。
    pub retry_interval: Duration,
    /// 明确失败的重试上限，达到后条目被移除并通知 UI。
    pub max_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// 投递结果通知，面向 UI 层。
#[derive(Debug, Clone)]
pub enum DeliveryNotice {
    /// 服务端已确认持久化。
    Delivered {
        pending_id: Uuid,
        message_id: MessageId,
        recipient_id: UserId,
    },
    /// 重试耗尽，消息被放弃。
    Failed {
        pending_id: Uuid,
        recipient_id: UserId,
        draft: MessageDraft,
    },
}

struct PendingDelivery {
    id: Uuid,
    recipient_id: UserId,
    draft: MessageDraft,
    attempts: u32,
    enqueued_at: Timestamp,
    in_flight: bool,
}

pub struct DeliveryQueue<T: MessageTransport> {
    transport: Arc<T>,
    pending: Mutex<Vec<PendingDelivery>>,
    notices: mpsc::UnboundedSender<DeliveryNotice>,
    config: DeliveryConfig,
}

impl<T: MessageTransport> DeliveryQueue<T> {
    /// 创建队列，返回队列与 UI 通知接收端。
    pub fn new(
        transport: Arc<T>,
        config: DeliveryConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DeliveryNotice>) {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            transport,
            pending: Mutex::new(Vec::new()),
            notices: notices_tx,
            config,
        });
        (queue, notices_rx)
    }

    /// 入队并立即尝试发送；返回条目 id。
    pub async fn enqueue(&self, recipient_id: UserId, draft: MessageDraft) -> Uuid {
        let id = Uuid::new_v4();
        {
            let mut pending = self.pending.lock().await;
            pending.push(PendingDelivery {
                id,
                recipient_id,
                draft,
                attempts: 0,
                enqueued_at: chrono::Utc::now(),
                in_flight: false,
            });
        }
        self.attempt_send(id).await;
        id
    }

    /// 尝试发送一个条目。
    ///
    /// 可以被定时器与重连回调并发地重复调用：在飞检查与标记在同一
    /// 把锁内完成，已在发送中的条目直接返回。传输未连接时条目留在
    /// 队列里（软失败，只记一次尝试）。
    pub async fn attempt_send(&self, id: Uuid) {
        let (recipient_id, draft) = {
            let mut pending = self.pending.lock().await;
            let Some(item) = pending.iter_mut().find(|item| item.id == id) else {
                return;
            };
            if item.in_flight {
                return;
            }
            item.attempts += 1;
            if !self.transport.is_connected() {
                return;
            }
            item.in_flight = true;
            (item.recipient_id, item.draft.clone())
        };

        let outcome = self.transport.send_private_message(recipient_id, draft).await;

        let mut pending = self.pending.lock().await;
        let Some(index) = pending.iter().position(|item| item.id == id) else {
            return;
        };
        match outcome {
            Ok(ack) => {
                let item = pending.remove(index);
                tracing::debug!(
                    pending_id = %item.id,
                    message_id = %ack.message_id,
                    "消息送达确认"
                );
                let _ = self.notices.send(DeliveryNotice::Delivered {
                    pending_id: item.id,
                    message_id: ack.message_id,
                    recipient_id: item.recipient_id,
                });
            }
            Err(err) if err.is_definitive() => {
                if pending[index].attempts >= self.config.max_attempts {
                    let item = pending.remove(index);
                    tracing::warn!(
                        pending_id = %item.id,
                        attempts = item.attempts,
                        queued_ms = (chrono::Utc::now() - item.enqueued_at).num_milliseconds(),
                        "重试耗尽，放弃投递"
                    );
                    let _ = self.notices.send(DeliveryNotice::Failed {
                        pending_id: item.id,
                        recipient_id: item.recipient_id,
                        draft: item.draft,
                    });
                } else {
                    tracing::debug!(pending_id = %id, error = %err, "发送失败，等待重试");
                    pending[index].in_flight = false;
                }
            }
            Err(err) => {
                // 断连或回执超时：不计入丢弃判定，等下个重试周期
                tracing::debug!(pending_id = %id, error = %err, "发送未完成，保持排队");
                pending[index].in_flight = false;
            }
        }
    }

    /// 重试所有仍在排队的条目；同一轮内各条目相互独立并发。
    pub async fn retry_pending(&self) {
        let ids: Vec<Uuid> = {
            let pending = self.pending.lock().await;
            pending
                .iter()
                .filter(|item| !item.in_flight)
                .map(|item| item.id)
                .collect()
        };
        if ids.is_empty() {
            return;
        }
        tracing::debug!(count = ids.len(), "重试排队中的消息");
        let attempts = ids.into_iter().map(|id| self.attempt_send(id));
        futures_util::future::join_all(attempts).await;
    }

    /// 重试驱动器：周期定时器与传输恢复事件喂同一个执行器，
    /// 重连后立即冲刷队列而不等下一个刻度。
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        let mut ticker = tokio::time::interval(self.config.retry_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval 的首个刻度立即触发，跳过避免空扫
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.retry_pending().await,
                event = events.recv() => match event {
                    Ok(TransportEvent::Up) => self.retry_pending().await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "传输事件滞后");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// 当前排队条目数。
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
