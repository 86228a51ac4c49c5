//! Query session handle for read-only canister calls.
//!
//! Balance sources never reach for a global wallet object. The caller owns a
//! [`QueryAgent`] and hands it to the aggregator; tests substitute a scripted
//! one.

use std::{env, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zkpf_balance_tree::Principal;

use crate::error::BalanceError;

/// Issues read-only queries against canisters.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    /// Call `method` on `canister` with a JSON-encoded argument and return
    /// the decoded reply.
    async fn query(
        &self,
        canister: &Principal,
        method: &str,
        arg: Value,
    ) -> Result<Value, BalanceError>;
}

/// Configuration for [`HttpQueryAgent`].
#[derive(Clone, Debug)]
pub struct HttpQueryAgentConfig {
    /// Base URL of the JSON query gateway.
    pub gateway_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpQueryAgentConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:4943".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpQueryAgentConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gateway_url = env::var("ZKPF_QUERY_GATEWAY_URL").unwrap_or(defaults.gateway_url);
        let timeout = match env::var("ZKPF_QUERY_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("ZKPF_QUERY_TIMEOUT_SECS is not an integer: {raw}"))?,
            ),
            Err(_) => defaults.timeout,
        };

        Ok(Self {
            gateway_url,
            timeout,
        })
    }

    pub fn with_gateway(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    method: &'a str,
    arg: &'a Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum QueryReply {
    Reply(Value),
    Reject(String),
}

/// [`QueryAgent`] speaking JSON to a query gateway.
///
/// `POST {gateway}/api/v1/canister/{canister}/query` with
/// `{"method": .., "arg": ..}`; the gateway answers `{"reply": ..}` or
/// `{"reject": ".."}`.
pub struct HttpQueryAgent {
    config: HttpQueryAgentConfig,
    http_client: reqwest::Client,
}

impl HttpQueryAgent {
    pub fn new(config: HttpQueryAgentConfig) -> Result<Self, BalanceError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Create an agent for a specific gateway URL.
    pub fn with_url(gateway_url: impl Into<String>) -> Result<Self, BalanceError> {
        Self::new(HttpQueryAgentConfig::default().with_gateway(gateway_url))
    }

    pub fn config(&self) -> &HttpQueryAgentConfig {
        &self.config
    }

    fn query_url(&self, canister: &Principal) -> String {
        format!(
            "{}/api/v1/canister/{}/query",
            self.config.gateway_url.trim_end_matches('/'),
            canister
        )
    }
}

#[async_trait]
impl QueryAgent for HttpQueryAgent {
    async fn query(
        &self,
        canister: &Principal,
        method: &str,
        arg: Value,
    ) -> Result<Value, BalanceError> {
        let query_error = |message: String| BalanceError::Query {
            canister: canister.to_text(),
            method: method.to_string(),
            message,
        };

        let response = self
            .http_client
            .post(self.query_url(canister))
            .json(&QueryRequest { method, arg: &arg })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(query_error(format!("HTTP {status}: {body}")));
        }

        let reply: QueryReply = response
            .json()
            .await
            .map_err(|e| query_error(format!("undecodable reply: {e}")))?;

        match reply {
            QueryReply::Reply(value) => Ok(value),
            QueryReply::Reject(message) => Err(BalanceError::Rejected {
                canister: canister.to_text(),
                method: method.to_string(),
                message,
            }),
        }
    }
}
