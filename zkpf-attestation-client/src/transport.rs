//! Prover wire contract and HTTP transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zkpf_balance_tree::TokenStandard;

use crate::error::RATE_LIMITED_TAG;

/// Token identity as the prover sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadataInput {
    pub canister_id: String,
    pub token_standard: TokenStandard,
    pub decimals: Option<u8>,
}

/// Ownership proof request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOwnershipInput {
    pub token_metadata: TokenMetadataInput,
    /// Big-endian u64.
    pub token_id: Vec<u8>,
    /// Big-endian u128.
    pub balance: Vec<u8>,
    pub owner_hash: Vec<u8>,
    pub merkle_path: Vec<Vec<u8>>,
    pub path_indices: Vec<u8>,
    /// `merkle_root ‖ minimum_balance_be16`.
    pub token_specific_data: Option<Vec<u8>>,
}

/// Structured prover reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProverReply<T> {
    Ok(T),
    Err(String),
}

impl<T> ProverReply<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            ProverReply::Ok(value) => Ok(value),
            ProverReply::Err(message) => Err(message),
        }
    }
}

/// The prover could not be reached or answered outside the contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("prover unreachable: {0}")]
    Connection(String),

    #[error("prover returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable prover reply: {0}")]
    Decode(String),
}

/// Request/response channel to the remote prover.
#[async_trait]
pub trait ProverTransport: Send + Sync {
    async fn prove_ownership(
        &self,
        param_id: &str,
        input: &TokenOwnershipInput,
    ) -> Result<ProverReply<Vec<u8>>, TransportError>;

    async fn verify_proof(
        &self,
        proof: &[u8],
        public_inputs: &[String],
        standard: TokenStandard,
    ) -> Result<ProverReply<bool>, TransportError>;
}

#[derive(Serialize)]
struct ProveOwnershipBody<'a> {
    param_id: &'a str,
    input: &'a TokenOwnershipInput,
}

#[derive(Serialize)]
struct VerifyProofBody<'a> {
    proof_bytes: &'a [u8],
    public_inputs: &'a [String],
    token_standard: TokenStandard,
}

/// [`ProverTransport`] over JSON HTTP.
///
/// `POST {base}/prove_ownership` and `POST {base}/verify_proof`. An HTTP 429
/// is reported as a `RATE_LIMITED` reply so the client's backoff applies.
pub struct HttpProverTransport {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpProverTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<ProverReply<T>, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            debug!(%url, "prover answered 429");
            return Ok(ProverReply::Err(RATE_LIMITED_TAG.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProverTransport for HttpProverTransport {
    async fn prove_ownership(
        &self,
        param_id: &str,
        input: &TokenOwnershipInput,
    ) -> Result<ProverReply<Vec<u8>>, TransportError> {
        self.post("prove_ownership", &ProveOwnershipBody { param_id, input })
            .await
    }

    async fn verify_proof(
        &self,
        proof: &[u8],
        public_inputs: &[String],
        standard: TokenStandard,
    ) -> Result<ProverReply<bool>, TransportError> {
        let body = VerifyProofBody {
            proof_bytes: proof,
            public_inputs,
            token_standard: standard,
        };
        self.post("verify_proof", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_wire_shape() {
        let ok: ProverReply<bool> = serde_json::from_str(r#"{"Ok":true}"#).unwrap();
        assert_eq!(ok, ProverReply::Ok(true));

        let err: ProverReply<Vec<u8>> =
            serde_json::from_str(r#"{"Err":"RATE_LIMITED"}"#).unwrap();
        assert_eq!(err.into_result(), Err("RATE_LIMITED".to_string()));
    }

    #[test]
    fn test_verify_body_shape() {
        let inputs = vec!["1".to_string()];
        let body = VerifyProofBody {
            proof_bytes: &[1, 2],
            public_inputs: &inputs,
            token_standard: TokenStandard::FungibleV1,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "proof_bytes": [1, 2],
                "public_inputs": ["1"],
                "token_standard": "ICRC1"
            })
        );
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let transport =
            HttpProverTransport::new("http://prover.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.endpoint("verify_proof"),
            "http://prover.local/verify_proof"
        );
    }
}
