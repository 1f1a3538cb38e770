//! Single-flight locking per wallet address.
//!
//! [`WalletLocks`] keeps one [`tokio::sync::Mutex`] per wallet. A sync holds
//! the wallet's guard for its whole run, so two syncs of the same wallet
//! never interleave history appends while different wallets proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Registry of per-wallet mutexes.
///
/// # Concurrency
///
/// - Syncs of the same wallet are serialized.
/// - Syncs of different wallets run concurrently.
#[derive(Debug, Default)]
pub struct WalletLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl WalletLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `wallet`. Addresses differing only in
    /// case share one lock.
    pub async fn acquire(&self, wallet: &str) -> OwnedMutexGuard<()> {
        let key = wallet.to_ascii_lowercase();
        let existing = self.locks.read().await.get(&key).map(Arc::clone);
        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut map = self.locks.write().await;
                Arc::clone(map.entry(key).or_default())
            }
        };
        lock.lock_owned().await
    }

    /// Drops entries nobody holds or waits on.
    pub async fn prune_idle(&self) {
        let mut map = self.locks.write().await;
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of tracked wallets.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    /// Returns `true` if no wallet is tracked.
    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}
