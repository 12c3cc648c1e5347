use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use application::{MessageStore, StoreError, UserDirectory};
use domain::{Message, MessageDraft, MessageId, UserId};

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    StoreError::storage(err.to_string())
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    content: Option<String>,
    attachment_ref: Option<String>,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl From<MessageRecord> for Message {
    fn from(value: MessageRecord) -> Self {
        Message {
            id: MessageId::from(value.id),
            sender_id: UserId::from(value.sender_id),
            recipient_id: UserId::from(value.recipient_id),
            content: value.content,
            attachment_ref: value.attachment_ref,
            created_at: value.created_at,
            read_at: value.read_at,
        }
    }
}

/// PostgreSQL 消息持久化网关。
///
/// `id` 与 `created_at` 由数据库在写入时分配；并发写入的顺序由
/// 存储层裁决。
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        draft: MessageDraft,
    ) -> Result<Message, StoreError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (sender_id, recipient_id, content, attachment_ref)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender_id, recipient_id, content, attachment_ref, created_at, read_at
            "#,
        )
        .bind(Uuid::from(sender_id))
        .bind(Uuid::from(recipient_id))
        .bind(draft.content)
        .bind(draft.attachment_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        tracing::debug!(message_id = %record.id, "消息已写入数据库");

        Ok(record.into())
    }

    async fn find_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<Message>, StoreError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, sender_id, recipient_id, content, attachment_ref, created_at, read_at
            FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(Uuid::from(user_a))
        .bind(Uuid::from(user_b))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Message::from).collect())
    }
}

/// PostgreSQL 用户目录。
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn user_exists(&self, id: UserId) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(Uuid::from(id))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(exists)
    }
}
