use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::conversation_service;
use crate::store::ChatStore;

pub const MAX_REACTION_CHARS: usize = 32;

/// Upsert `user_id`'s reaction on a message after membership and ownership
/// checks. Returns the counterpart to notify.
pub async fn react(
    store: &dyn ChatStore,
    user_id: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
    reaction: &str,
) -> AppResult<Uuid> {
    if reaction.is_empty() || reaction.chars().count() > MAX_REACTION_CHARS {
        return Err(AppError::Validation("invalid reaction".into()));
    }

    let conversation =
        conversation_service::member_conversation(store, conversation_id, user_id).await?;

    let message = store.message(message_id).await?.ok_or(AppError::NotFound)?;
    if message.conversation_id != conversation_id {
        return Err(AppError::NotFound);
    }

    store.upsert_reaction(message_id, user_id, reaction).await?;

    // Membership guarantees a counterpart.
    conversation.peer_of(user_id).ok_or(AppError::Forbidden)
}

/// Mark every counterpart-authored message in the conversation as seen by
/// `reader`. Returns the counterpart and how many messages were newly
/// marked; zero is not an error, repeated reads are idempotent.
pub async fn mark_read(
    store: &dyn ChatStore,
    reader: Uuid,
    conversation_id: Uuid,
) -> AppResult<(Uuid, u64)> {
    let conversation =
        conversation_service::member_conversation(store, conversation_id, reader).await?;

    let marked = store.mark_conversation_read(conversation_id, reader).await?;
    let peer = conversation.peer_of(reader).ok_or(AppError::Forbidden)?;
    Ok((peer, marked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryChatStore;

    #[tokio::test]
    async fn reacting_to_a_message_in_another_conversation_is_not_found() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let d = Uuid::new_v4();

        let ab = store.resolve_conversation(a, b).await.unwrap();
        let ad = store.resolve_conversation(a, d).await.unwrap();
        let in_ad = store.insert_message(ad.id, a, "hi d", &[]).await.unwrap();

        // b names its own conversation but a message that lives elsewhere.
        let result = react(&store, b, ab.id, in_ad.id, "like").await;
        assert!(matches!(result, Err(AppError::NotFound)));

        let untouched = store.message(in_ad.id).await.unwrap().unwrap();
        assert!(untouched.reactions.is_empty());
    }

    #[tokio::test]
    async fn react_returns_the_counterpart() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ab = store.resolve_conversation(a, b).await.unwrap();
        let message = store.insert_message(ab.id, a, "hi", &[]).await.unwrap();

        let peer = react(&store, b, ab.id, message.id, "like").await.unwrap();
        assert_eq!(peer, a);

        let stored = store.message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.reactions[&b], "like");
    }

    #[tokio::test]
    async fn an_overlong_reaction_is_rejected() {
        let store = MemoryChatStore::new();
        let result = react(
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            &"x".repeat(MAX_REACTION_CHARS + 1),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn mark_read_by_an_outsider_is_rejected_without_mutation() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ab = store.resolve_conversation(a, b).await.unwrap();
        store.insert_message(ab.id, a, "hi", &[]).await.unwrap();

        let result = mark_read(&store, Uuid::new_v4(), ab.id).await;
        assert!(matches!(result, Err(AppError::Forbidden)));
        assert_eq!(store.unread_count(b).await.unwrap(), 1);
    }
}
