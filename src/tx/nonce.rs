//! Nonce cache for reliable transaction submission
//!
//! Handles:
//! - Local tracking of the next nonce per account, without a node round-trip
//! - Forced resynchronization from the node after drift
//! - A per-account critical section around read-use-increment sequences

use dashmap::DashMap;
use ethers::types::Address;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Process-wide cache of the next nonce for each sending account.
///
/// Values and locks are kept apart: `get`, `incr` and `sync` never wait on the
/// critical section, which lets them run from inside it.
#[derive(Debug, Default)]
pub struct NonceCache {
    /// Next nonce to use, per account
    nonces: DashMap<Address, u64>,
    /// One critical-section lock per account
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl NonceCache {
    /// Create an empty nonce cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cached nonce, if the account has been synced
    pub fn get(&self, account: Address) -> Option<u64> {
        self.nonces.get(&account).map(|nonce| *nonce)
    }

    /// Advance the cached nonce by one and return the new value
    pub fn incr(&self, account: Address) -> u64 {
        let mut nonce = self.nonces.entry(account).or_insert(0);
        *nonce += 1;
        debug!("Advanced nonce for {:?} to {}", account, *nonce);
        *nonce
    }

    /// Replace the cached nonce with the value produced by `fetch`.
    ///
    /// On failure the cached value is left untouched and the error is returned.
    pub async fn sync<F, Fut, E>(&self, account: Address, fetch: F) -> Result<u64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, E>>,
    {
        let nonce = fetch().await?;
        let previous = self.nonces.insert(account, nonce);
        debug!(
            "Synced nonce for {:?}: {:?} -> {}",
            account, previous, nonce
        );
        Ok(nonce)
    }

    /// Run `critical_section` while holding the account's exclusive lock.
    ///
    /// The lock is released on every exit path, including panics and the
    /// returned future being dropped. Accounts never contend with each other.
    pub async fn serialize<F, Fut, T>(&self, account: Address, critical_section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // Clone the Arc out so no map shard stays locked across the await
        let lock = self
            .locks
            .entry(account)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;
        critical_section().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn account(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_get_unknown_account() {
        let cache = NonceCache::new();
        assert_eq!(cache.get(account(1)), None);
    }

    #[test]
    fn test_incr_returns_new_value() {
        let cache = NonceCache::new();
        assert_eq!(cache.incr(account(1)), 1);
        assert_eq!(cache.incr(account(1)), 2);
        assert_eq!(cache.get(account(1)), Some(2));
        assert_eq!(cache.get(account(2)), None);
    }

    #[tokio::test]
    async fn test_sync_replaces_value() {
        let cache = NonceCache::new();
        cache.incr(account(1));

        let synced: Result<u64, String> = cache.sync(account(1), || async { Ok(42) }).await;
        assert_eq!(synced.unwrap(), 42);
        assert_eq!(cache.get(account(1)), Some(42));
    }

    #[tokio::test]
    async fn test_failed_sync_leaves_cache_unchanged() {
        let cache = NonceCache::new();
        cache
            .sync::<_, _, String>(account(1), || async { Ok(7) })
            .await
            .unwrap();

        let err = cache
            .sync(account(1), || async { Err::<u64, _>("node unreachable".to_string()) })
            .await
            .unwrap_err();

        assert_eq!(err, "node unreachable");
        assert_eq!(cache.get(account(1)), Some(7));
    }

    #[tokio::test]
    async fn test_serialize_is_exclusive_per_account() {
        let cache = Arc::new(NonceCache::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .serialize(account(1), || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        let nonce = cache.get(account(1)).unwrap_or(0);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        cache.incr(account(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        nonce
                    })
                    .await
            }));
        }

        let mut seen: Vec<u64> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        seen.sort_unstable();

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(seen, (0..16).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_accounts_do_not_contend() {
        let cache = Arc::new(NonceCache::new());
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .serialize(account(1), || async move {
                        entered_tx.send(()).unwrap();
                        release_rx.await.ok();
                    })
                    .await
            })
        };
        entered_rx.await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            cache.serialize(account(2), || async { "done" }),
        )
        .await;
        assert_eq!(other.unwrap(), "done");

        release_tx.send(()).unwrap();
        holder.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_after_error_and_panic() {
        let cache = Arc::new(NonceCache::new());

        let failed: Result<(), String> = cache
            .serialize(account(1), || async { Err("boom".to_string()) })
            .await;
        assert!(failed.is_err());

        let panicked = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .serialize(account(1), || async { panic!("critical section panicked") })
                    .await
            })
            .await
        };
        assert!(panicked.unwrap_err().is_panic());

        let after = tokio::time::timeout(
            Duration::from_secs(1),
            cache.serialize(account(1), || async { 1 }),
        )
        .await;
        assert_eq!(after.unwrap(), 1);
    }
}
