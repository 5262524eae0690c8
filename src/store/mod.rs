//! Persistence seam for conversations, messages, receipts, and reactions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message};

pub mod memory;
pub mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

/// Storage contract shared by the Postgres and in-memory backends.
///
/// `resolve_conversation` must be idempotent under concurrent first contact
/// from both ends of a pair; implementations rely on a uniqueness constraint
/// on the normalized pair key, not on caller-side locking.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Find or lazily create the conversation for an unordered user pair.
    async fn resolve_conversation(&self, a: Uuid, b: Uuid) -> AppResult<Conversation>;

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
        media: &[String],
    ) -> AppResult<Message>;

    async fn message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Replace the user's reaction on a message (one live reaction per user).
    async fn upsert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: &str,
    ) -> AppResult<()>;

    /// Mark every counterpart-authored, not-yet-seen message in the
    /// conversation as seen by `reader`. Returns how many were marked.
    async fn mark_conversation_read(&self, conversation_id: Uuid, reader: Uuid)
        -> AppResult<u64>;

    /// Aggregate unread total for a user across all their conversations.
    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64>;
}
