//! Process-lifetime user cache with single-flight fetches
//!
//! The ingestion fan-out can ask for the same unknown user from many tasks
//! at once. The cache coalesces those into one remote call: every key owns a
//! `OnceCell` slot, the first waiter runs the fetch, and all waiters observe
//! the same result or the same error. Entries are never evicted during a
//! run.
//!
//! The cache is an injected collaborator, not an ambient singleton, so tests
//! supply deterministic substitutes via [`UserCache::seed`].

use crate::client::ChatApi;
use crate::error::{Error, Result};
use crate::types::ChatUser;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Outcome stored per key: the profile, or the error message every
/// coalesced waiter shares.
type Slot = Arc<OnceCell<std::result::Result<ChatUser, String>>>;

/// Concurrent `user_id → profile` map with single-flight misses.
#[derive(Default)]
pub struct UserCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an entry (tests, warm starts).
    pub fn seed(&self, user: ChatUser) {
        let slot = self.slot(&user.id);
        let _ = slot.set(Ok(user));
    }

    /// Look up a profile, fetching through `client` on miss.
    ///
    /// Concurrent calls for the same unknown ID perform exactly one remote
    /// fetch; the failure of that fetch is shared by all waiters and cached,
    /// so a broken profile is not re-fetched within the run.
    pub async fn get_or_fetch<C: ChatApi>(&self, client: &C, user_id: &str) -> Result<ChatUser> {
        let slot = self.slot(user_id);
        let outcome = slot
            .get_or_init(|| async {
                match client.user(user_id).await {
                    Ok(user) => Ok(user),
                    Err(e) => {
                        tracing::warn!(user = %user_id, error = %e, "User fetch failed");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match outcome {
            Ok(user) => Ok(user.clone()),
            Err(message) => Err(Error::Api(format!("user {}: {}", user_id, message))),
        }
    }

    /// Profile for an ID that is already resolved, if any.
    pub fn get(&self, user_id: &str) -> Option<ChatUser> {
        let slots = self.slots.lock().expect("user cache lock");
        slots
            .get(user_id)
            .and_then(|slot| slot.get())
            .and_then(|outcome| outcome.as_ref().ok())
            .cloned()
    }

    /// Owned copy of every successfully resolved profile.
    ///
    /// Returned by value so callers never hold the internal lock.
    pub fn snapshot(&self) -> HashMap<String, ChatUser> {
        let slots = self.slots.lock().expect("user cache lock");
        slots
            .iter()
            .filter_map(|(id, slot)| {
                slot.get()
                    .and_then(|outcome| outcome.as_ref().ok())
                    .map(|user| (id.clone(), user.clone()))
            })
            .collect()
    }

    /// Number of resolved profiles.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().expect("user cache lock");
        slots
            .values()
            .filter(|slot| matches!(slot.get(), Some(Ok(_))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, user_id: &str) -> Slot {
        let mut slots = self.slots.lock().expect("user cache lock");
        slots.entry(user_id.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Page;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingClient {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingClient {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl ChatApi for CountingClient {
        async fn history(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
            Ok(Page::default())
        }

        async fn replies(&self, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
            Ok(Page::default())
        }

        async fn user(&self, user_id: &str) -> Result<ChatUser> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                return Err(Error::NotFound(format!("user {}", user_id)));
            }
            Ok(ChatUser {
                id: user_id.to_string(),
                name: Some("alice".to_string()),
                real_name: Some("Alice Chen".to_string()),
                display_name: None,
                email: None,
                is_bot: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_coalesces_concurrent_misses() {
        let cache = Arc::new(UserCache::new());
        let client = Arc::new(CountingClient::new(false));

        let start = tokio::time::Instant::now();
        let lookups: Vec<_> = (0..100)
            .map(|_| {
                let cache = cache.clone();
                let client = client.clone();
                async move { cache.get_or_fetch(client.as_ref(), "U1").await }
            })
            .collect();
        let results = futures::future::join_all(lookups).await;

        // Exactly one underlying fetch; every caller saw the same record
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().id, "U1");
        }
        // Wall clock is one fetch latency, not a hundred
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(150), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_shared_and_cached() {
        let cache = Arc::new(UserCache::new());
        let client = Arc::new(CountingClient::new(true));

        let lookups: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                let client = client.clone();
                async move { cache.get_or_fetch(client.as_ref(), "U404").await }
            })
            .collect();
        let results = futures::future::join_all(lookups).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.is_err()));

        // The failure is cached for the run: a later lookup does not retry
        assert!(cache.get_or_fetch(client.as_ref(), "U404").await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(cache.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_hit_skips_remote() {
        let cache = UserCache::new();
        let client = CountingClient::new(false);

        cache.seed(ChatUser {
            id: "U2".to_string(),
            name: Some("bob".to_string()),
            real_name: Some("Bob Lee".to_string()),
            display_name: None,
            email: None,
            is_bot: false,
        });

        let user = cache.get_or_fetch(&client, "U2").await.unwrap();
        assert_eq!(user.preferred_name(), "Bob Lee");
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let cache = UserCache::new();
        cache.seed(ChatUser {
            id: "U3".to_string(),
            name: None,
            real_name: None,
            display_name: None,
            email: None,
            is_bot: true,
        });

        let mut snapshot = cache.snapshot();
        snapshot.remove("U3");

        // Mutating the snapshot leaves the cache untouched
        assert!(cache.get("U3").is_some());
    }
}
