//! Typing indicator state, keyed by (conversation, user).
//!
//! Each entry owns a cancellable expiry timer. Entries carry a generation
//! counter: a refresh bumps the generation and aborts the old timer, and a
//! timer only acts if its captured generation is still current, so a timer
//! that lost the race to a refresh or an explicit stop can never fire a
//! stale stop-typing broadcast.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct TypingEntry {
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Clone)]
pub struct TypingTracker {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<(Uuid, Uuid), TypingEntry>>>,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enter or refresh the Typing state for (conversation, user).
    ///
    /// Returns true on the Idle -> Typing transition, false on a refresh.
    /// `on_expire` runs if the expiry window elapses with no refresh, stop,
    /// or disconnect in between.
    pub async fn start<F>(&self, conversation_id: Uuid, user_id: Uuid, on_expire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut map = self.inner.lock().await;
        match map.entry((conversation_id, user_id)) {
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.generation += 1;
                entry.timer.abort();
                entry.timer =
                    self.spawn_timer(conversation_id, user_id, entry.generation, on_expire);
                false
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let timer = self.spawn_timer(conversation_id, user_id, 0, on_expire);
                vacant.insert(TypingEntry {
                    generation: 0,
                    timer,
                });
                true
            }
        }
    }

    /// Explicit Typing -> Idle transition. Returns whether the user was
    /// typing; Idle stop is a no-op.
    pub async fn stop(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        let mut map = self.inner.lock().await;
        match map.remove(&(conversation_id, user_id)) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Destroy every typing state owned by a user, across all
    /// conversations. Used on the user's last disconnect; no broadcasts.
    pub async fn clear_user(&self, user_id: Uuid) {
        let mut map = self.inner.lock().await;
        map.retain(|(_, owner), entry| {
            if *owner == user_id {
                entry.timer.abort();
                false
            } else {
                true
            }
        });
    }

    fn spawn_timer<F>(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        generation: u64,
        on_expire: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tracker = self.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if tracker
                .take_if_current(conversation_id, user_id, generation)
                .await
            {
                on_expire.await;
            }
        })
    }

    /// Timeout transition: remove the entry only if the firing timer's
    /// generation is still current.
    async fn take_if_current(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        generation: u64,
    ) -> bool {
        let mut map = self.inner.lock().await;
        match map.get(&(conversation_id, user_id)) {
            Some(entry) if entry.generation == generation => {
                map.remove(&(conversation_id, user_id));
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> ExpireFut) {
        let count = Arc::new(AtomicUsize::new(0));
        let for_closure = Arc::clone(&count);
        let make = move || {
            let count = Arc::clone(&for_closure);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            }) as ExpireFut
        };
        (count, make)
    }

    type ExpireFut = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    #[tokio::test]
    async fn expiry_fires_exactly_once() {
        let tracker = TypingTracker::new(Duration::from_millis(50));
        let (count, expire) = counter();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(tracker.start(conv, user, expire()).await);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Expired entries are gone; the next start is a fresh transition.
        assert!(tracker.start(conv, user, expire()).await);
    }

    #[tokio::test]
    async fn refresh_is_not_a_new_transition_and_delays_expiry() {
        let tracker = TypingTracker::new(Duration::from_millis(250));
        let (count, expire) = counter();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(tracker.start(conv, user, expire()).await);
        sleep(Duration::from_millis(100)).await;
        assert!(!tracker.start(conv, user, expire()).await);

        // The original window has elapsed, the refreshed one has not.
        sleep(Duration::from_millis(180)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_stop_cancels_the_timer() {
        let tracker = TypingTracker::new(Duration::from_millis(50));
        let (count, expire) = counter();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();

        tracker.start(conv, user, expire()).await;
        assert!(tracker.stop(conv, user).await);
        assert!(!tracker.stop(conv, user).await);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_user_cancels_across_conversations_only_for_that_user() {
        let tracker = TypingTracker::new(Duration::from_millis(80));
        let (count, expire) = counter();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        tracker.start(Uuid::new_v4(), user, expire()).await;
        tracker.start(Uuid::new_v4(), user, expire()).await;
        tracker.start(Uuid::new_v4(), other, expire()).await;
        tracker.clear_user(user).await;

        sleep(Duration::from_millis(200)).await;
        // Only the untouched user's timer fired.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
