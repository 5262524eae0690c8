use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod handlers;
pub mod message_types;
pub mod typing;

use self::message_types::ServerEvent;

/// Unique identifier for one live WebSocket connection.
///
/// A user may hold several connections at once (one per device); the id
/// makes unregistration precise so one closing device never tears down its
/// siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Connection {
    id: ConnectionId,
    sender: UnboundedSender<ServerEvent>,
}

/// Presence source of truth: user id to live connections.
///
/// A user is online iff they hold at least one registered connection.
/// Sends are fire-and-forget over unbounded channels; a receiver that went
/// away is reaped on the next send touching it.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user. Returns true when this is the user's
    /// first live connection (the caller announces presence exactly then).
    pub async fn register(
        &self,
        user_id: Uuid,
        id: ConnectionId,
        sender: UnboundedSender<ServerEvent>,
    ) -> bool {
        let mut guard = self.inner.write().await;
        let connections = guard.entry(user_id).or_default();
        let first = connections.is_empty();
        connections.push(Connection { id, sender });
        first
    }

    /// Remove one connection. Returns true when it was the user's last
    /// (the caller announces offline exactly then).
    pub async fn unregister(&self, user_id: Uuid, id: ConnectionId) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(&user_id) else {
            return false;
        };
        connections.retain(|c| c.id != id);
        if connections.is_empty() {
            guard.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Deliver an event to every connection of one user.
    pub async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        let mut guard = self.inner.write().await;
        if let Some(connections) = guard.get_mut(&user_id) {
            connections.retain(|c| c.sender.send(event.clone()).is_ok());
            if connections.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    /// Deliver an event to every registered user except `except`; used for
    /// presence deltas, which broadcast globally.
    pub async fn broadcast_to_others(&self, except: Uuid, event: &ServerEvent) {
        let mut guard = self.inner.write().await;
        for (user_id, connections) in guard.iter_mut() {
            if *user_id == except {
                continue;
            }
            connections.retain(|c| c.sender.send(event.clone()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn first_and_last_connection_flags() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = unbounded_channel();
        let (tx2, _rx2) = unbounded_channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();

        assert!(registry.register(user, c1, tx1).await);
        assert!(!registry.register(user, c2, tx2).await);
        assert!(registry.is_online(user).await);

        assert!(!registry.unregister(user, c1).await);
        assert!(registry.is_online(user).await);
        assert!(registry.unregister(user, c2).await);
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_device() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        registry.register(user, ConnectionId::new(), tx1).await;
        registry.register(user, ConnectionId::new(), tx2).await;

        registry
            .send_to_user(user, &ServerEvent::UnreadMessagesCount { count: 1 })
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_skips_the_subject() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        registry.register(a, ConnectionId::new(), tx_a).await;
        registry.register(b, ConnectionId::new(), tx_b).await;

        registry
            .broadcast_to_others(a, &ServerEvent::UserOnline { user_id: a })
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dead_receivers_are_reaped_on_send() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        registry.register(user, ConnectionId::new(), tx).await;
        drop(rx);

        registry
            .send_to_user(user, &ServerEvent::UnreadMessagesCount { count: 0 })
            .await;
        assert!(!registry.is_online(user).await);
    }
}
