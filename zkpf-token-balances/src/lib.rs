//! zkpf-token-balances
//!
//! Reads one owner's balances across the configured tokens and turns them
//! into [`BalanceRecord`](zkpf_balance_tree::BalanceRecord)s ready to be
//! committed into a balance tree.
//!
//! ```text
//! QueryAgent ──► BalanceSource (per standard) ──► BalanceCache ──► BalanceAggregator
//! ```
//!
//! Aggregation never fails as a whole. A token whose query fails is logged
//! and committed with a zero balance so the leaf set stays stable.

pub mod agent;
pub mod aggregator;
pub mod cache;
pub mod error;
pub mod registry;
pub mod source;

pub use agent::{HttpQueryAgent, HttpQueryAgentConfig, QueryAgent};
pub use aggregator::{
    AggregatorConfig, BalanceAggregator, TokenBalanceOutcome, DEFAULT_MAX_CONCURRENT_FETCHES,
};
pub use cache::{BalanceCache, CacheKey, DEFAULT_CACHE_TTL};
pub use error::{BalanceError, BalanceResult};
pub use registry::{default_token_set, known_token, known_tokens};
pub use source::{parse_nat, source_for, BalanceSource};
