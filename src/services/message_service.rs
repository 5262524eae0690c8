use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::media::{self, MediaStore};
use crate::models::Message;
use crate::services::conversation_service;
use crate::store::ChatStore;

pub const MAX_BODY_CHARS: usize = 10_000;

/// Validate, resolve the conversation, offload media, and persist one
/// private message. Delivery fan-out is the caller's job; nothing here is
/// emitted, so a failure at any step leaves no partial delivery.
pub async fn send_private_message(
    store: &dyn ChatStore,
    media_store: &dyn MediaStore,
    sender_id: Uuid,
    recipient_id: Uuid,
    body: &str,
    media: &[String],
) -> AppResult<Message> {
    if recipient_id == sender_id {
        return Err(AppError::Validation(
            "recipient must be another user".into(),
        ));
    }
    validate_body(body, media)?;
    media::validate_media(media)?;

    let conversation = conversation_service::resolve(store, sender_id, recipient_id).await?;

    let mut stored_media = Vec::with_capacity(media.len());
    for entry in media {
        stored_media.push(media_store.store(entry).await?);
    }

    store
        .insert_message(conversation.id, sender_id, body, &stored_media)
        .await
}

fn validate_body(body: &str, media: &[String]) -> AppResult<()> {
    if body.trim().is_empty() && media.is_empty() {
        return Err(AppError::Validation("message body is empty".into()));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::Validation(format!(
            "message body exceeds {MAX_BODY_CHARS} characters"
        )));
    }
    Ok(())
}
