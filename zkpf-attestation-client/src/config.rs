//! Attestation client configuration.

use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};

/// Default number of retries after a rate-limited reply.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base backoff; attempt `n` waits `base * (n + 1)`.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(2_000);
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the attestation client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationClientConfig {
    /// Base URL of the prover service.
    pub prover_url: String,
    /// Proving parameter set the prover should use.
    pub param_id: String,
    /// Retries after a rate-limited reply.
    pub max_retries: u32,
    /// Backoff unit between retries.
    pub retry_base_delay: Duration,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for AttestationClientConfig {
    fn default() -> Self {
        Self {
            prover_url: "http://localhost:8080".to_string(),
            param_id: "default".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AttestationClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let prover_url = env::var("ZKPF_PROVER_URL").context("ZKPF_PROVER_URL must be set")?;
        let param_id = env::var("ZKPF_PROVER_PARAM_ID").unwrap_or(defaults.param_id);
        let max_retries = env_parse("ZKPF_MAX_RETRIES")?.unwrap_or(defaults.max_retries);
        let retry_base_delay = env_parse("ZKPF_RETRY_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay);
        let request_timeout = env_parse("ZKPF_REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Ok(Self {
            prover_url,
            param_id,
            max_retries,
            retry_base_delay,
            request_timeout,
        })
    }

    pub fn builder() -> AttestationClientConfigBuilder {
        AttestationClientConfigBuilder::new()
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

/// Builder for AttestationClientConfig.
pub struct AttestationClientConfigBuilder {
    config: AttestationClientConfig,
}

impl AttestationClientConfigBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: AttestationClientConfig::default(),
        }
    }

    pub fn prover_url(mut self, url: impl Into<String>) -> Self {
        self.config.prover_url = url.into();
        self
    }

    pub fn param_id(mut self, param_id: impl Into<String>) -> Self {
        self.config.param_id = param_id.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay_ms(mut self, delay: u64) -> Self {
        self.config.retry_base_delay = Duration::from_millis(delay);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> AttestationClientConfig {
        self.config
    }
}

impl Default for AttestationClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
