use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted private message as it travels on the wire.
///
/// `seen_by` is the set of users that have marked the message read, and
/// `reactions` maps each reacting user to their single live reaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub media: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub seen_by: Vec<Uuid>,
    pub reactions: HashMap<Uuid, String>,
}

impl Message {
    pub fn is_seen_by(&self, user_id: Uuid) -> bool {
        self.seen_by.contains(&user_id)
    }
}
