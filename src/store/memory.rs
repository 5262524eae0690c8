//! In-memory store used by the protocol test harness and local development.
//!
//! Mirrors the Postgres backend's contract, including the idempotent
//! find-or-create on the normalized pair key. All mutations happen under one
//! async mutex; no I/O occurs while it is held.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message};
use crate::store::ChatStore;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
    // Insertion order doubles as chronological order.
    messages: Vec<Message>,
}

#[derive(Default, Clone)]
pub struct MemoryChatStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn resolve_conversation(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let pair = Conversation::normalize_pair(a, b);
        let mut inner = self.inner.lock().await;
        if let Some(id) = inner.by_pair.get(&pair) {
            return Ok(inner.conversations[id].clone());
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_a: pair.0,
            user_b: pair.1,
            created_at: Utc::now(),
        };
        inner.by_pair.insert(pair, conversation.id);
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
        media: &[String],
    ) -> AppResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.to_string(),
            media: media.to_vec(),
            created_at: Utc::now(),
            seen_by: Vec::new(),
            reactions: HashMap::new(),
        };
        let mut inner = self.inner.lock().await;
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn upsert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(message) = inner.messages.iter_mut().find(|m| m.id == message_id) {
            message.reactions.insert(user_id, reaction.to_string());
        }
        Ok(())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader: Uuid,
    ) -> AppResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut marked = 0;
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader)
        {
            if !message.seen_by.contains(&reader) {
                message.seen_by.push(reader);
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.lock().await;
        let count = inner
            .messages
            .iter()
            .filter(|m| {
                m.sender_id != user_id
                    && !m.seen_by.contains(&user_id)
                    && inner
                        .conversations
                        .get(&m.conversation_id)
                        .is_some_and(|c| c.involves(user_id))
            })
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_is_idempotent_and_order_independent() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = store.resolve_conversation(a, b).await.unwrap();
        let second = store.resolve_conversation(b, a).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_one_conversation() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (left, right) = tokio::join!(
            {
                let store = store.clone();
                async move { store.resolve_conversation(a, b).await.unwrap() }
            },
            {
                let store = store.clone();
                async move { store.resolve_conversation(b, a).await.unwrap() }
            }
        );
        assert_eq!(left.id, right.id);
    }

    #[tokio::test]
    async fn unread_counts_follow_inserts_and_reads() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = store.resolve_conversation(a, b).await.unwrap();

        store.insert_message(conv.id, a, "hi", &[]).await.unwrap();
        store
            .insert_message(conv.id, a, "there", &[])
            .await
            .unwrap();

        assert_eq!(store.unread_count(b).await.unwrap(), 2);
        // The author has nothing unread.
        assert_eq!(store.unread_count(a).await.unwrap(), 0);

        let marked = store.mark_conversation_read(conv.id, b).await.unwrap();
        assert_eq!(marked, 2);
        assert_eq!(store.unread_count(b).await.unwrap(), 0);

        // Re-reading is idempotent.
        let marked = store.mark_conversation_read(conv.id, b).await.unwrap();
        assert_eq!(marked, 0);
    }

    #[tokio::test]
    async fn a_second_reaction_replaces_the_first() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = store.resolve_conversation(a, b).await.unwrap();
        let message = store.insert_message(conv.id, a, "hi", &[]).await.unwrap();

        store
            .upsert_reaction(message.id, b, "like")
            .await
            .unwrap();
        store
            .upsert_reaction(message.id, b, "celebrate")
            .await
            .unwrap();

        let stored = store.message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.reactions.len(), 1);
        assert_eq!(stored.reactions[&b], "celebrate");
    }
}
