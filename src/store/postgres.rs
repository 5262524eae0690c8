use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message};
use crate::store::ChatStore;

#[derive(Clone)]
pub struct PgChatStore {
    pool: Pool<Postgres>,
}

impl PgChatStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: MessageRow) -> AppResult<Message> {
        let seen_by: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM message_receipts WHERE message_id = $1",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let reaction_rows = sqlx::query(
            "SELECT user_id, reaction FROM message_reactions WHERE message_id = $1",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        let mut reactions = HashMap::new();
        for r in reaction_rows {
            reactions.insert(r.get::<Uuid, _>("user_id"), r.get::<String, _>("reaction"));
        }

        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            body: row.body,
            media: row.media,
            created_at: row.created_at,
            seen_by,
            reactions,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    body: String,
    media: Vec<String>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn resolve_conversation(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let (user_a, user_b) = Conversation::normalize_pair(a, b);

        // Idempotent upsert: the unique index on the pair makes concurrent
        // first contact from both ends collapse onto one row.
        sqlx::query(
            "INSERT INTO conversations (id, user_a, user_b) VALUES ($1, $2, $3)
             ON CONFLICT (user_a, user_b) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_a)
        .bind(user_b)
        .execute(&self.pool)
        .await?;

        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_a, user_b, created_at FROM conversations
             WHERE user_a = $1 AND user_b = $2",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_a, user_b, created_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
        media: &[String],
    ) -> AppResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (id, conversation_id, sender_id, body, media)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, conversation_id, sender_id, body, media, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .bind(media)
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            body: row.body,
            media: row.media,
            created_at: row.created_at,
            seen_by: Vec::new(),
            reactions: HashMap::new(),
        })
    }

    async fn message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, sender_id, body, media, created_at
             FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn upsert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_reactions (message_id, user_id, reaction)
             VALUES ($1, $2, $3)
             ON CONFLICT (message_id, user_id)
             DO UPDATE SET reaction = EXCLUDED.reaction, created_at = NOW()",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(reaction)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader: Uuid,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "INSERT INTO message_receipts (message_id, user_id)
             SELECT m.id, $2 FROM messages m
             WHERE m.conversation_id = $1
               AND m.sender_id <> $2
               AND NOT EXISTS (
                   SELECT 1 FROM message_receipts r
                   WHERE r.message_id = m.id AND r.user_id = $2
               )
             ON CONFLICT DO NOTHING",
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE (c.user_a = $1 OR c.user_b = $1)
               AND m.sender_id <> $1
               AND NOT EXISTS (
                   SELECT 1 FROM message_receipts r
                   WHERE r.message_id = m.id AND r.user_id = $1
               )",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
