//! `HttpQueryAgent` against a loopback gateway serving canned responses.

use std::sync::Arc;

use serde_json::{json, Value};
use zkpf_test_fixtures::{fixtures, init_tracing, CannedHttpServer, CannedResponse};
use zkpf_token_balances::{
    AggregatorConfig, BalanceAggregator, BalanceError, HttpQueryAgent, QueryAgent,
};

// ============================================================================
// Helpers
// ============================================================================

async fn gateway(responses: Vec<CannedResponse>) -> (CannedHttpServer, HttpQueryAgent) {
    let server = CannedHttpServer::start(responses)
        .await
        .expect("loopback listener should bind");
    let agent = HttpQueryAgent::with_url(server.base_url()).expect("agent should build");
    (server, agent)
}

// ============================================================================
// Envelope handling
// ============================================================================

#[tokio::test]
async fn test_reply_envelope_returns_value() {
    init_tracing();
    let f = fixtures();
    let (server, agent) = gateway(vec![CannedResponse::ok(r#"{"reply":{"e8s":42}}"#)]).await;

    let reply = agent
        .query(&f.ledger().id, "account_balance", json!({ "account": "00" }))
        .await
        .expect("reply envelope should decode");
    assert_eq!(reply, json!({ "e8s": 42 }));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(
        requests[0].path,
        format!("/api/v1/canister/{}/query", f.ledger().id)
    );
    let body: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(
        body,
        json!({ "method": "account_balance", "arg": { "account": "00" } })
    );
}

#[tokio::test]
async fn test_reject_envelope_maps_to_rejected() {
    let f = fixtures();
    let (_server, agent) =
        gateway(vec![CannedResponse::ok(r#"{"reject":"canister is stopped"}"#)]).await;

    let err = agent
        .query(&f.fungible().id, "icrc1_balance_of", Value::Null)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BalanceError::Rejected {
            canister: f.fungible().id.to_text(),
            method: "icrc1_balance_of".to_string(),
            message: "canister is stopped".to_string(),
        }
    );
}

#[tokio::test]
async fn test_server_error_maps_to_query_error() {
    let f = fixtures();
    let (_server, agent) = gateway(vec![CannedResponse::new(500, "replica down")]).await;

    let err = agent
        .query(&f.legacy().id, "balanceOf", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BalanceError::Query { ref method, ref message, .. }
            if method == "balanceOf" && message.contains("HTTP 500") && message.contains("replica down")
    ));
}

#[tokio::test]
async fn test_undecodable_reply_maps_to_query_error() {
    let f = fixtures();
    let (_server, agent) = gateway(vec![CannedResponse::ok(r#"{"unexpected":1}"#)]).await;

    let err = agent
        .query(&f.legacy().id, "balanceOf", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, BalanceError::Query { .. }));
}

// ============================================================================
// Aggregation over HTTP
// ============================================================================

#[tokio::test]
async fn test_aggregator_over_http_gateway() {
    let f = fixtures();
    let (server, agent) = gateway(vec![CannedResponse::ok(
        r#"{"reply":{"e8s":"250000000"}}"#,
    )])
    .await;
    let aggregator = BalanceAggregator::new(
        Arc::new(agent),
        vec![f.ledger().clone()],
        AggregatorConfig::default(),
    );

    let records = aggregator.fetch_all(f.owner()).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].balance, 250_000_000);
    assert_eq!(server.request_count(), 1);
}
