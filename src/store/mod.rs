//! Keyed TTL store shared by short-lived auth state.
//!
//! One-time codes, rate-limit counters, cached responses, and both token
//! registries all live behind [`TtlStore`]. The trait is the contract for a
//! multi-instance deployment: swap [`MemoryStore`] for an implementation
//! backed by a shared keyed store and every consumer keeps a single logical
//! view of revocation and quota state.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Expiring key-value operations used across the auth service.
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Fetch the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` with a TTL measured from now.
    /// Overwrites any previous entry and its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove `key`. Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every live key matching `pattern` (a literal prefix, with an
    /// optional trailing `*`). Returns the number of entries removed.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;

    /// Atomic fixed-window counter: the first call within a window stores 1
    /// with the given TTL, later calls increment without touching the TTL.
    /// Returns the post-increment count.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Membership check without copying the value out.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process [`TtlStore`] built on a mutex-guarded map with lazy expiry.
///
/// Expired entries are dropped on read and swept opportunistically on write,
/// so memory stays bounded by the live working set.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn expires_at(ttl: Duration) -> Instant {
        Instant::now()
            .checked_add(ttl)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX.into()))
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .remove(key)
            .is_some_and(|entry| entry.live(now)))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|key, entry| entry.live(now) && !key.starts_with(prefix));
        Ok(u64::try_from(before.saturating_sub(entries.len())).unwrap_or(u64::MAX))
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.live(now) => {
                let count = entry.value.parse::<i64>().unwrap_or(0).saturating_add(1);
                entry.value = count.to_string();
                Ok(count)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: Self::expires_at(ttl),
                    },
                );
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_get_round_trips() -> Result<()> {
        let store = MemoryStore::new();
        store.set("k", "v", MINUTE).await?;
        assert_eq!(store.get("k").await?, Some("v".to_string()));
        assert!(store.contains("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn zero_ttl_entries_are_expired_immediately() -> Result<()> {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::ZERO).await?;
        assert_eq!(store.get("k").await?, None);
        assert!(!store.contains("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn set_overwrites_value_and_ttl() -> Result<()> {
        let store = MemoryStore::new();
        store.set("k", "old", Duration::ZERO).await?;
        store.set("k", "new", MINUTE).await?;
        assert_eq!(store.get("k").await?, Some("new".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_whether_entry_existed() -> Result<()> {
        let store = MemoryStore::new();
        store.set("k", "v", MINUTE).await?;
        assert!(store.delete("k").await?);
        assert!(!store.delete("k").await?);
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_expired_entry_reports_missing() -> Result<()> {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::ZERO).await?;
        assert!(!store.delete("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn delete_by_pattern_removes_prefix_matches_only() -> Result<()> {
        let store = MemoryStore::new();
        store.set("users:/v1/users/1", "a", MINUTE).await?;
        store.set("users:/v1/users/2", "b", MINUTE).await?;
        store.set("otp:123456", "123456", MINUTE).await?;

        let removed = store.delete_by_pattern("users:*").await?;
        assert_eq!(removed, 2);
        assert_eq!(store.get("users:/v1/users/1").await?, None);
        assert_eq!(store.get("otp:123456").await?, Some("123456".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn incr_counts_within_a_window() -> Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.incr("rate", MINUTE).await?, 1);
        assert_eq!(store.incr("rate", MINUTE).await?, 2);
        assert_eq!(store.incr("rate", MINUTE).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn incr_resets_after_window_expiry() -> Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.incr("rate", Duration::ZERO).await?, 1);
        // Window elapsed: the counter starts over instead of carrying the old value.
        assert_eq!(store.incr("rate", MINUTE).await?, 1);
        Ok(())
    }
}
