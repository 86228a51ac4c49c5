//! Concurrent balance aggregation across configured tokens.

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use zkpf_balance_tree::{BalanceRecord, Principal, TokenDescriptor};

use crate::{
    agent::QueryAgent,
    cache::{BalanceCache, CacheKey, DEFAULT_CACHE_TTL},
    error::BalanceError,
    source::source_for,
};

/// Default cap on concurrent balance queries.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Aggregator tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Upper bound on in-flight balance queries.
    pub max_concurrent_fetches: usize,
    /// How long a fetched balance is reused.
    pub cache_ttl: Duration,
    /// When false every fetch goes to the source.
    pub cache_enabled: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_enabled: true,
        }
    }
}

impl AggregatorConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_concurrent_fetches = env_parse("ZKPF_MAX_CONCURRENT_FETCHES")?
            .unwrap_or(defaults.max_concurrent_fetches);
        let cache_ttl = env_parse("ZKPF_BALANCE_CACHE_TTL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.cache_ttl);
        let cache_enabled =
            env_parse("ZKPF_BALANCE_CACHE_ENABLED")?.unwrap_or(defaults.cache_enabled);

        Ok(Self {
            max_concurrent_fetches,
            cache_ttl,
            cache_enabled,
        })
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    fn build_cache(&self) -> BalanceCache {
        if self.cache_enabled {
            BalanceCache::new(self.cache_ttl)
        } else {
            BalanceCache::disabled()
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(None),
    }
}

/// How a token's record was obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenBalanceOutcome {
    /// Fetched from the source during this pass.
    Fresh(BalanceRecord),
    /// Served from the cache.
    Cached(BalanceRecord),
    /// The fetch failed; a zero balance stands in.
    Degraded {
        record: BalanceRecord,
        error: BalanceError,
    },
}

impl TokenBalanceOutcome {
    pub fn record(&self) -> &BalanceRecord {
        match self {
            TokenBalanceOutcome::Fresh(record)
            | TokenBalanceOutcome::Cached(record)
            | TokenBalanceOutcome::Degraded { record, .. } => record,
        }
    }

    pub fn into_record(self) -> BalanceRecord {
        match self {
            TokenBalanceOutcome::Fresh(record)
            | TokenBalanceOutcome::Cached(record)
            | TokenBalanceOutcome::Degraded { record, .. } => record,
        }
    }

    pub fn error(&self) -> Option<&BalanceError> {
        match self {
            TokenBalanceOutcome::Degraded { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error().is_some()
    }
}

/// Fetches one record per configured token for an owner.
pub struct BalanceAggregator {
    agent: Arc<dyn QueryAgent>,
    tokens: Vec<TokenDescriptor>,
    cache: Arc<BalanceCache>,
    config: AggregatorConfig,
}

impl BalanceAggregator {
    pub fn new(
        agent: Arc<dyn QueryAgent>,
        tokens: Vec<TokenDescriptor>,
        config: AggregatorConfig,
    ) -> Self {
        let cache = Arc::new(config.build_cache());
        Self {
            agent,
            tokens,
            cache,
            config,
        }
    }

    /// Share `cache` with other aggregators instead of the one built from
    /// the config.
    pub fn with_cache(mut self, cache: Arc<BalanceCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn tokens(&self) -> &[TokenDescriptor] {
        &self.tokens
    }

    pub fn cache(&self) -> &Arc<BalanceCache> {
        &self.cache
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// One record per configured token, in configured order.
    ///
    /// Never fails: a token whose fetch fails is committed with a zero
    /// balance.
    pub async fn fetch_all(&self, owner: &Principal) -> Vec<BalanceRecord> {
        self.fetch_detailed(owner)
            .await
            .into_iter()
            .map(TokenBalanceOutcome::into_record)
            .collect()
    }

    /// Like [`fetch_all`](Self::fetch_all), keeping how each record was
    /// obtained.
    pub async fn fetch_detailed(&self, owner: &Principal) -> Vec<TokenBalanceOutcome> {
        let workers = self
            .tokens
            .len()
            .min(self.config.max_concurrent_fetches)
            .max(1);
        debug!(
            owner = %owner,
            tokens = self.tokens.len(),
            workers,
            "aggregating balances"
        );

        stream::iter(self.tokens.iter())
            .map(|token| self.fetch_one(token, owner))
            .buffered(workers)
            .collect()
            .await
    }

    async fn fetch_one(&self, token: &TokenDescriptor, owner: &Principal) -> TokenBalanceOutcome {
        let key = CacheKey::new(token, owner);
        if let Some(raw) = self.cache.get(&key).await {
            return TokenBalanceOutcome::Cached(BalanceRecord::for_token(token, owner, raw));
        }

        let source = source_for(token.standard);
        match source.balance_of(self.agent.as_ref(), token, owner).await {
            Ok(raw) => {
                self.cache.put(key, raw).await;
                TokenBalanceOutcome::Fresh(BalanceRecord::for_token(token, owner, raw))
            }
            Err(error) => {
                warn!(
                    token = %token.symbol,
                    canister = %token.id,
                    standard = %token.standard,
                    %error,
                    "balance fetch failed, committing zero balance"
                );
                TokenBalanceOutcome::Degraded {
                    record: BalanceRecord::zero(token, owner),
                    error,
                }
            }
        }
    }
}
