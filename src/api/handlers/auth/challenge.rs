//! One-time wallet challenges.
//!
//! Challenges live in process memory and expire lazily by timestamp
//! comparison; an entry past its window is simply treated as absent.
//! `take` removes the entry atomically under the store lock, so two
//! concurrent verifications for the same address resolve to at most one
//! winner — the loser observes "not found".

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Key/value store for pending challenges, keyed by lowercase wallet
/// address. Swappable for a shared cache in multi-node deployments.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store a challenge message, superseding any earlier one for the
    /// same address.
    async fn set(&self, address: &str, message: String);

    /// Remove and return the live challenge for an address, if any.
    /// Expired entries are reported as absent.
    async fn take(&self, address: &str) -> Option<String>;
}

struct ChallengeEntry {
    message: String,
    issued_at: Instant,
}

/// Single-process implementation backed by a mutex-guarded map.
pub struct InMemoryChallengeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, ChallengeEntry>>,
}

impl InMemoryChallengeStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn set(&self, address: &str, message: String) {
        let mut entries = self.entries.lock().await;
        // Drop expired entries while we hold the lock to bound memory.
        entries.retain(|_, entry| entry.issued_at.elapsed() < self.ttl);
        entries.insert(
            address.to_string(),
            ChallengeEntry {
                message,
                issued_at: Instant::now(),
            },
        );
    }

    async fn take(&self, address: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(address)?;
        if entry.issued_at.elapsed() < self.ttl {
            Some(entry.message)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_consumes_the_challenge() {
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        store.set("0xabc", "sign me".to_string()).await;

        assert_eq!(store.take("0xabc").await.as_deref(), Some("sign me"));
        assert_eq!(store.take("0xabc").await, None);
    }

    #[tokio::test]
    async fn unknown_address_is_absent() {
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        assert_eq!(store.take("0xdef").await, None);
    }

    #[tokio::test]
    async fn newer_challenge_supersedes_older() {
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        store.set("0xabc", "first".to_string()).await;
        store.set("0xabc", "second".to_string()).await;

        assert_eq!(store.take("0xabc").await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn expired_challenge_is_absent() {
        let store = InMemoryChallengeStore::new(Duration::from_millis(5));
        store.set("0xabc", "sign me".to_string()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.take("0xabc").await, None);
    }
}
