//! Short-lived balance cache.
//!
//! Entries are checked for staleness on access only; there is no background
//! sweeper. Time comes from `tokio::time`, so paused-clock tests can step
//! across the TTL boundary exactly.

use std::{collections::HashMap, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tracing::debug;
use zkpf_balance_tree::{Principal, TokenDescriptor};

/// Default time-to-live for cached balances.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(30_000);

/// Identifies one cached balance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub canister: String,
    pub owner: String,
    pub sub_token: Option<String>,
}

impl CacheKey {
    pub fn new(token: &TokenDescriptor, owner: &Principal) -> Self {
        Self {
            canister: token.id.to_text(),
            owner: owner.to_text(),
            sub_token: token.sub_token.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    balance: u128,
    captured_at: Instant,
}

/// TTL cache of raw balances keyed by token and owner.
pub struct BalanceCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    enabled: bool,
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl BalanceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            enabled: true,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cached balance for `key` if it is younger than the TTL.
    pub async fn get(&self, key: &CacheKey) -> Option<u128> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.entries.lock().await;
        let entry = *entries.get(key)?;
        if entry.captured_at.elapsed() < self.ttl {
            debug!(canister = %key.canister, owner = %key.owner, "balance cache hit");
            Some(entry.balance)
        } else {
            debug!(canister = %key.canister, owner = %key.owner, "balance cache entry expired");
            entries.remove(key);
            None
        }
    }

    pub async fn put(&self, key: CacheKey, balance: u128) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry {
            balance,
            captured_at: Instant::now(),
        };
        self.entries.lock().await.insert(key, entry);
    }

    /// Number of stored entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
