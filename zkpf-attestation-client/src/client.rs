//! Retrying prover client.
//!
//! Each request runs as a bounded loop:
//!
//! ```text
//! Pending ──Ok──────────────► Success
//!    │
//!    ├─RATE_LIMITED, attempt < max ──► sleep(base * (attempt + 1)) ──► Pending
//!    │
//!    └─anything else ────────► Failed
//! ```
//!
//! Cancellation is observed before each attempt and raced against both the
//! call and the backoff sleep.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zkpf_balance_tree::TokenStandard;

use crate::{
    config::AttestationClientConfig,
    error::{AttestationError, ProverFailure},
    request::ProofReceipt,
    transport::{
        HttpProverTransport, ProverReply, ProverTransport, TokenOwnershipInput, TransportError,
    },
};

/// Backoff schedule for rate-limited replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

impl From<&AttestationClientConfig> for RetryPolicy {
    fn from(config: &AttestationClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    GenerateProof,
    VerifyProof,
}

impl Operation {
    fn failure(self) -> fn(String) -> AttestationError {
        match self {
            Operation::GenerateProof => AttestationError::ProofGenerationFailed,
            Operation::VerifyProof => AttestationError::VerificationFailed,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::GenerateProof => f.write_str("prove_ownership"),
            Operation::VerifyProof => f.write_str("verify_proof"),
        }
    }
}

/// Client for the remote ownership prover.
pub struct AttestationClient {
    transport: Arc<dyn ProverTransport>,
    config: AttestationClientConfig,
    policy: RetryPolicy,
}

impl AttestationClient {
    pub fn new(transport: Arc<dyn ProverTransport>, config: AttestationClientConfig) -> Self {
        let policy = RetryPolicy::from(&config);
        Self {
            transport,
            config,
            policy,
        }
    }

    /// Client over HTTP to `config.prover_url`.
    ///
    /// A malformed prover URL or an HTTP client that cannot be built is
    /// reported as `InvalidInput`; no request is made here.
    pub fn connect(config: AttestationClientConfig) -> Result<Self, AttestationError> {
        let url = reqwest::Url::parse(&config.prover_url).map_err(|e| {
            AttestationError::InvalidInput(format!("prover url {:?}: {e}", config.prover_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AttestationError::InvalidInput(format!(
                "prover url {:?}: unsupported scheme {}",
                config.prover_url,
                url.scheme()
            )));
        }

        let transport = HttpProverTransport::new(&config.prover_url, config.request_timeout)
            .map_err(|e| AttestationError::InvalidInput(format!("prover client: {e}")))?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &AttestationClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Request an ownership proof for `input`.
    pub async fn generate_proof(
        &self,
        input: &TokenOwnershipInput,
        cancel: &CancellationToken,
    ) -> Result<ProofReceipt, AttestationError> {
        let transport = self.transport.as_ref();
        let param_id = self.config.param_id.as_str();
        let proof_bytes = self
            .call_with_retry(Operation::GenerateProof, cancel, move || {
                transport.prove_ownership(param_id, input)
            })
            .await?;

        let receipt = ProofReceipt::from_proof_bytes(proof_bytes);
        info!(
            proof_id = %receipt.proof_id,
            proof_len = receipt.proof_bytes.len(),
            "ownership proof generated"
        );
        Ok(receipt)
    }

    /// Ask the prover whether `proof` is valid for `public_inputs`.
    pub async fn verify_proof(
        &self,
        proof: &[u8],
        public_inputs: &[String],
        standard: TokenStandard,
        cancel: &CancellationToken,
    ) -> Result<bool, AttestationError> {
        let transport = self.transport.as_ref();
        let valid = self
            .call_with_retry(Operation::VerifyProof, cancel, move || {
                transport.verify_proof(proof, public_inputs, standard)
            })
            .await?;

        info!(valid, standard = %standard, "proof verification answered");
        Ok(valid)
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, AttestationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ProverReply<T>, TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(AttestationError::Cancelled);
            }

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AttestationError::Cancelled),
                reply = call() => reply,
            };

            let raw = match reply {
                Ok(ProverReply::Ok(value)) => return Ok(value),
                Ok(ProverReply::Err(raw)) => raw,
                Err(e) => {
                    warn!(%operation, attempt, error = %e, "prover transport failed");
                    return Err((operation.failure())(e.to_string()));
                }
            };

            let failure = ProverFailure::parse(&raw);
            if failure.is_rate_limited() && attempt < self.policy.max_retries {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    %operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "prover rate limited, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AttestationError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
                continue;
            }

            let error = failure.into_error(operation.failure());
            warn!(%operation, attempts = attempt + 1, %error, "prover request failed");
            return Err(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(2_000),
        };
        let delays: Vec<_> = (0..3).map(|a| policy.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![2_000, 4_000, 6_000]);
    }

    #[test]
    fn test_connect_rejects_bad_prover_url() {
        for url in ["not a url", "ftp://prover.local"] {
            let config = AttestationClientConfig::builder().prover_url(url).build();
            assert!(
                matches!(
                    AttestationClient::connect(config),
                    Err(AttestationError::InvalidInput(_))
                ),
                "url {url}"
            );
        }

        let config = AttestationClientConfig::builder()
            .prover_url("http://127.0.0.1:9")
            .build();
        let client = AttestationClient::connect(config).expect("valid url should connect");
        assert_eq!(client.config().prover_url, "http://127.0.0.1:9");
    }

    #[test]
    fn test_policy_from_config() {
        let config = AttestationClientConfig::builder()
            .max_retries(1)
            .retry_delay_ms(5)
            .build();
        assert_eq!(
            RetryPolicy::from(&config),
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(5)
            }
        );
    }
}
