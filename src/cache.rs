// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Keyed cache with a time-to-live and stale fallback
//!
//! A refresh that fails serves the previous value, however old, when one
//! exists. Refreshes are serialized per key: concurrent readers of one
//! expired key trigger a single upstream call, while other keys stay
//! readable and refreshable in the meantime.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A value read through the cache
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<V> {
    pub value: V,
    /// Served from an earlier refresh rather than produced by this call
    pub from_cache: bool,
    /// Served in place of a refresh that failed
    pub stale: bool,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    refreshed_at: DateTime<Utc>,
}

impl<V: Clone> Entry<V> {
    fn cached(&self, stale: bool) -> Cached<V> {
        Cached {
            value: self.value.clone(),
            from_cache: true,
            stale,
            refreshed_at: self.refreshed_at,
        }
    }
}

/// One key's entry; its lock is held for the whole of a refresh
type Slot<V> = Arc<Mutex<Option<Entry<V>>>>;

/// Cache of `V` per `K`, each entry fresh for `ttl`
pub struct TtlCache<K, V> {
    // only held long enough to find or create a slot
    slots: Mutex<HashMap<K, Slot<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        let age = (self.clock.now() - entry.refreshed_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    async fn slot(&self, key: &K) -> Slot<V> {
        self.slots
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<Cached<V>> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let entry = slot.lock().await;
        entry
            .as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.cached(false))
    }

    pub async fn insert(&self, key: K, value: V) {
        let refreshed_at = self.clock.now();
        let slot = self.slot(&key).await;
        *slot.lock().await = Some(Entry { value, refreshed_at });
    }

    pub async fn invalidate(&self, key: &K) {
        let slot = self.slots.lock().await.get(key).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    /// Fresh cached value, or the result of `refresh`.
    ///
    /// When `refresh` fails and a stale value exists, the stale value is
    /// returned instead of the error.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, refresh: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.load(key, false, refresh).await
    }

    /// Like `get_or_refresh`, but always calls `refresh` first.
    pub async fn force_refresh<F, Fut>(&self, key: K, refresh: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.load(key, true, refresh).await
    }

    async fn load<F, Fut>(&self, key: K, force: bool, refresh: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let slot = self.slot(&key).await;
        let mut entry = slot.lock().await;

        if !force {
            if let Some(fresh) = entry.as_ref().filter(|entry| self.is_fresh(entry)) {
                tracing::debug!(target: "chatline.cache", key = ?key, "cache hit");
                return Ok(fresh.cached(false));
            }
        }

        match refresh().await {
            Ok(value) => {
                let refreshed_at = self.clock.now();
                *entry = Some(Entry {
                    value: value.clone(),
                    refreshed_at,
                });
                Ok(Cached {
                    value,
                    from_cache: false,
                    stale: false,
                    refreshed_at,
                })
            }
            Err(e) => match entry.as_ref() {
                Some(stale) => {
                    tracing::warn!(
                        target: "chatline.cache",
                        key = ?key,
                        error = %e,
                        refreshed_at = %stale.refreshed_at,
                        "refresh failed, serving stale value"
                    );
                    Ok(stale.cached(true))
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ChatError;
    use std::sync::Mutex as StdMutex;

    /// Manually advanced clock
    pub(crate) struct TestClock(StdMutex<DateTime<Utc>>);

    impl TestClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self(StdMutex::new(Utc::now())))
        }

        pub(crate) fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_get_or_refresh_caches_within_ttl() {
        let clock = TestClock::new();
        let cache: TtlCache<&str, u32> = TtlCache::with_clock(12 * HOUR, clock.clone());

        let first = cache.get_or_refresh("en", || async { Ok(1) }).await.unwrap();
        assert_eq!(first.value, 1);
        assert!(!first.from_cache);

        clock.advance(11 * HOUR);
        let second = cache.get_or_refresh("en", || async { Ok(2) }).await.unwrap();
        assert_eq!(second.value, 1);
        assert!(second.from_cache);
        assert!(!second.stale);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let clock = TestClock::new();
        let cache: TtlCache<&str, u32> = TtlCache::with_clock(12 * HOUR, clock.clone());
        cache.insert("en", 1).await;

        clock.advance(12 * HOUR);
        assert!(cache.get(&"en").await.is_none());
        let refreshed = cache.get_or_refresh("en", || async { Ok(2) }).await.unwrap();
        assert_eq!(refreshed.value, 2);
        assert!(!refreshed.from_cache);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_fresh_entry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(HOUR);
        cache.insert("zh", 1).await;
        let forced = cache.force_refresh("zh", || async { Ok(5) }).await.unwrap();
        assert_eq!(forced.value, 5);
        assert!(!forced.from_cache);
        assert_eq!(cache.get(&"zh").await.unwrap().value, 5);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale() {
        let clock = TestClock::new();
        let cache: TtlCache<&str, u32> = TtlCache::with_clock(HOUR, clock.clone());
        cache.insert("en", 7).await;
        clock.advance(48 * HOUR);

        let served = cache
            .get_or_refresh("en", || async { Err(ChatError::ToolCallFailed("down".into())) })
            .await
            .unwrap();
        assert_eq!(served.value, 7);
        assert!(served.from_cache);
        assert!(served.stale);
    }

    #[tokio::test]
    async fn test_failed_refresh_without_entry_errors() {
        let cache: TtlCache<&str, u32> = TtlCache::new(HOUR);
        let result = cache
            .force_refresh("en", || async { Err(ChatError::ToolCallFailed("down".into())) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache: TtlCache<&str, u32> = TtlCache::new(HOUR);
        cache.insert("en", 1).await;
        assert!(cache.get(&"zh").await.is_none());
        cache.invalidate(&"en").await;
        assert!(cache.get(&"en").await.is_none());
    }

    #[tokio::test]
    async fn test_pending_refresh_does_not_block_other_keys() {
        let cache: Arc<TtlCache<&'static str, u32>> = Arc::new(TtlCache::new(HOUR));
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_refresh("zh", || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(1)
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            cache.get_or_refresh("en", || async { Ok(2) }),
        )
        .await
        .expect("refresh of another key finished while zh was pending")
        .unwrap();
        assert_eq!(other.value, 2);
        assert_eq!(cache.get(&"en").await.unwrap().value, 2);

        release_tx.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap().value, 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_of_one_key_refresh_once() {
        let cache: Arc<TtlCache<&'static str, u32>> = Arc::new(TtlCache::new(HOUR));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_refresh("en", || async move {
                            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(9)
                        })
                        .await
                })
            })
            .collect();

        for reader in readers {
            assert_eq!(reader.await.unwrap().unwrap().value, 9);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
