use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Conversation;
use crate::store::ChatStore;

/// Find-or-create the conversation for an unordered user pair.
pub async fn resolve(store: &dyn ChatStore, a: Uuid, b: Uuid) -> AppResult<Conversation> {
    store.resolve_conversation(a, b).await
}

/// Fetch a conversation and require `user_id` to be one of its two
/// participants. Unknown ids and non-membership both come back as
/// `NotFound`/`Forbidden`, which share one generic client message.
pub async fn member_conversation(
    store: &dyn ChatStore,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<Conversation> {
    let conversation = store
        .conversation(conversation_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !conversation.involves(user_id) {
        return Err(AppError::Forbidden);
    }
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryChatStore;

    #[tokio::test]
    async fn member_conversation_rejects_outsiders() {
        let store = MemoryChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = resolve(&store, a, b).await.unwrap();

        assert!(member_conversation(&store, conv.id, a).await.is_ok());
        assert!(matches!(
            member_conversation(&store, conv.id, Uuid::new_v4()).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            member_conversation(&store, Uuid::new_v4(), a).await,
            Err(AppError::NotFound)
        ));
    }
}
