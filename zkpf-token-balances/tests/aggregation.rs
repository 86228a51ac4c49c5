//! Aggregation tests against a scripted query agent.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use zkpf_balance_tree::{BalanceRecord, BalanceTree, TokenDescriptor};
use zkpf_test_fixtures::{
    ext_err_reply, ext_ok_reply, fixtures, init_tracing, ledger_reply, nat_reply,
    ScriptedQueryAgent,
};
use zkpf_token_balances::{
    known_token, known_tokens, AggregatorConfig, BalanceAggregator, BalanceCache, BalanceError,
    TokenBalanceOutcome,
};

// ============================================================================
// Helpers
// ============================================================================

fn healthy_agent() -> ScriptedQueryAgent {
    let f = fixtures();
    ScriptedQueryAgent::new()
        .with_reply(&f.ledger().id, ledger_reply(150_000_000))
        .with_reply(&f.fungible().id, nat_reply(2_500))
        .with_reply(&f.legacy().id, json!(77))
        .with_reply(&f.ext().id, ext_ok_reply(3))
}

fn aggregator(agent: Arc<ScriptedQueryAgent>, config: AggregatorConfig) -> BalanceAggregator {
    BalanceAggregator::new(agent, fixtures().tokens().to_vec(), config)
}

fn balances(records: &[BalanceRecord]) -> Vec<u128> {
    records.iter().map(|r| r.balance).collect()
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_fetch_all_returns_one_record_per_token_in_order() {
    init_tracing();
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let aggregator = aggregator(agent, AggregatorConfig::default());

    let records = aggregator.fetch_all(f.owner()).await;

    assert_eq!(records.len(), 4);
    assert_eq!(balances(&records), vec![150_000_000, 2_500, 77, 3]);
    for (record, token) in records.iter().zip(f.tokens()) {
        assert_eq!(record.token_id, token.token_id());
        assert_eq!(record.owner_hash, f.owner().owner_hash());
        assert_eq!(record.metadata, token.metadata_bytes());
    }
}

#[tokio::test]
async fn test_partial_failure_degrades_to_zero() {
    init_tracing();
    let f = fixtures();
    let agent = Arc::new(
        healthy_agent().with_failure(&f.fungible().id, BalanceError::Transport("timeout".into())),
    );
    let tokens = f.tokens()[..3].to_vec();
    let aggregator = BalanceAggregator::new(agent, tokens, AggregatorConfig::default());

    let records = aggregator.fetch_all(f.owner()).await;

    assert_eq!(records.len(), 3, "a failed token should still produce a record");
    assert_eq!(balances(&records), vec![150_000_000, 0, 77]);
    assert_eq!(records[1], BalanceRecord::zero(f.fungible(), f.owner()));
}

#[tokio::test]
async fn test_fetch_detailed_reports_outcomes() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent().with_reply(&f.ext().id, ext_err_reply("unknown token")));
    let aggregator = aggregator(agent, AggregatorConfig::default());

    let outcomes = aggregator.fetch_detailed(f.owner()).await;

    assert!(matches!(outcomes[0], TokenBalanceOutcome::Fresh(_)));
    assert!(matches!(
        outcomes[3].error(),
        Some(BalanceError::Rejected { method, .. }) if method == "balance"
    ));
    assert_eq!(outcomes[3].record().balance, 0);

    let again = aggregator.fetch_detailed(f.owner()).await;
    assert!(matches!(again[0], TokenBalanceOutcome::Cached(_)));
    assert!(again[3].is_degraded(), "failures should not be cached");
}

#[tokio::test]
async fn test_ext_without_sub_token_is_not_queried() {
    let f = fixtures();
    let mut ext = f.ext().clone();
    ext.sub_token = None;
    let agent = Arc::new(healthy_agent());
    let aggregator = BalanceAggregator::new(agent.clone(), vec![ext], AggregatorConfig::default());

    let outcomes = aggregator.fetch_detailed(f.owner()).await;

    assert!(matches!(
        outcomes[0].error(),
        Some(BalanceError::MissingSubToken { .. })
    ));
    assert_eq!(agent.call_count(), 0);
}

#[tokio::test]
async fn test_query_arguments_per_standard() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let aggregator = aggregator(agent.clone(), AggregatorConfig::default());

    aggregator.fetch_all(f.owner()).await;

    let calls = agent.calls();
    let owner_text = f.owner().to_text();
    let call_for = |token: &TokenDescriptor| {
        calls
            .iter()
            .find(|c| c.canister == token.id.to_text())
            .cloned()
            .expect("token should have been queried")
    };

    let ledger = call_for(f.ledger());
    assert_eq!(ledger.method, "account_balance");
    assert_eq!(
        ledger.arg,
        json!({ "account": f.owner().account_identifier().to_hex() })
    );

    let fungible = call_for(f.fungible());
    assert_eq!(fungible.method, "icrc1_balance_of");
    assert_eq!(fungible.arg, json!({ "owner": owner_text, "subaccount": null }));

    let legacy = call_for(f.legacy());
    assert_eq!(legacy.method, "balanceOf");
    assert_eq!(legacy.arg, json!([owner_text]));

    let ext = call_for(f.ext());
    assert_eq!(ext.method, "balance");
    assert_eq!(
        ext.arg,
        json!({ "user": owner_text, "token": "ext-token-0001" })
    );
}

#[tokio::test]
async fn test_wide_balances_are_committed_exactly() {
    let f = fixtures();
    let cketh = known_token(known_tokens::CKETH_LEDGER).expect("ckETH should be a known token");

    // 20 and 30 ckETH at 18 decimals, both beyond u64.
    let mut roots = Vec::new();
    for raw in [20_000_000_000_000_000_000u128, 30_000_000_000_000_000_000u128] {
        let agent = Arc::new(ScriptedQueryAgent::new().with_reply(&cketh.id, nat_reply(raw)));
        let aggregator =
            BalanceAggregator::new(agent, vec![cketh.clone()], AggregatorConfig::default());

        let records = aggregator.fetch_all(f.owner()).await;
        assert_eq!(records[0].balance, raw);
        roots.push(BalanceTree::build(&records).root());
    }
    assert_ne!(roots[0], roots[1], "distinct balances must commit to distinct roots");

    let agent = Arc::new(healthy_agent().with_reply(&f.fungible().id, nat_reply(u128::MAX)));
    let records = aggregator(agent, AggregatorConfig::default())
        .fetch_all(f.owner())
        .await;
    assert_eq!(records[1].balance, u128::MAX);
}

#[tokio::test]
async fn test_empty_token_list() {
    let agent = Arc::new(ScriptedQueryAgent::new());
    let aggregator = BalanceAggregator::new(agent, Vec::new(), AggregatorConfig::default());
    assert!(aggregator.fetch_all(fixtures().owner()).await.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrency_bounded_by_worker_budget() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent().with_latency(Duration::from_millis(100)));
    let config = AggregatorConfig::default().with_max_concurrent_fetches(2);
    let aggregator = aggregator(agent.clone(), config);

    let records = aggregator.fetch_all(f.owner()).await;

    assert_eq!(balances(&records), vec![150_000_000, 2_500, 77, 3]);
    assert_eq!(agent.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fetches_run_in_parallel() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent().with_latency(Duration::from_millis(100)));
    let aggregator = aggregator(agent.clone(), AggregatorConfig::default());

    let started = tokio::time::Instant::now();
    aggregator.fetch_all(f.owner()).await;

    assert_eq!(agent.max_in_flight(), 4);
    assert!(started.elapsed() < Duration::from_millis(200));
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cache_ttl_boundary() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let tokens = vec![f.ledger().clone()];
    let aggregator = BalanceAggregator::new(agent.clone(), tokens, AggregatorConfig::default());

    aggregator.fetch_all(f.owner()).await;
    assert_eq!(agent.call_count(), 1);

    tokio::time::advance(Duration::from_millis(29_999)).await;
    let outcomes = aggregator.fetch_detailed(f.owner()).await;
    assert!(matches!(outcomes[0], TokenBalanceOutcome::Cached(_)));
    assert_eq!(agent.call_count(), 1, "entry should still be fresh at 29 999 ms");

    tokio::time::advance(Duration::from_millis(2)).await;
    let outcomes = aggregator.fetch_detailed(f.owner()).await;
    assert!(matches!(outcomes[0], TokenBalanceOutcome::Fresh(_)));
    assert_eq!(agent.call_count(), 2, "entry should be refetched at 30 001 ms");
}

#[tokio::test]
async fn test_cached_value_survives_source_change() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let tokens = vec![f.ledger().clone()];
    let aggregator = BalanceAggregator::new(agent.clone(), tokens, AggregatorConfig::default());

    aggregator.fetch_all(f.owner()).await;
    agent.set_reply(&f.ledger().id, ledger_reply(1));

    let records = aggregator.fetch_all(f.owner()).await;
    assert_eq!(records[0].balance, 150_000_000);
}

#[tokio::test]
async fn test_cache_is_keyed_by_owner() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let tokens = vec![f.ledger().clone()];
    let aggregator = BalanceAggregator::new(agent.clone(), tokens, AggregatorConfig::default());

    aggregator.fetch_all(f.owner()).await;
    let other = aggregator.fetch_all(f.other_owner()).await;

    assert_eq!(agent.call_count(), 2);
    assert_eq!(other[0].owner_hash, f.other_owner().owner_hash());
}

#[tokio::test]
async fn test_disabled_cache_always_queries() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let config = AggregatorConfig::default().with_cache_enabled(false);
    let aggregator = aggregator(agent.clone(), config);

    aggregator.fetch_all(f.owner()).await;
    aggregator.fetch_all(f.owner()).await;

    assert_eq!(agent.call_count(), 8);
}

#[tokio::test]
async fn test_shared_cache_between_aggregators() {
    let f = fixtures();
    let agent = Arc::new(healthy_agent());
    let cache = Arc::new(BalanceCache::default());

    let first = aggregator(agent.clone(), AggregatorConfig::default()).with_cache(cache.clone());
    let second = aggregator(agent.clone(), AggregatorConfig::default()).with_cache(cache.clone());

    first.fetch_all(f.owner()).await;
    second.fetch_all(f.owner()).await;

    assert_eq!(agent.call_count(), 4);
    assert_eq!(cache.len().await, 4);
}
