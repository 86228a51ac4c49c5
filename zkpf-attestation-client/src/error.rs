//! Attestation errors and prover error-tag decoding.

use thiserror::Error;

/// Errors surfaced by the attestation client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttestationError {
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// The prover kept rate limiting after every retry was spent.
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("unsupported token standard: {0}")]
    UnsupportedTokenStandard(String),

    #[error("request cancelled")]
    Cancelled,
}

impl AttestationError {
    /// Whether a caller-initiated retry of the whole request can help.
    ///
    /// Independent of the client's own rate-limit backoff, which has already
    /// run by the time an error is surfaced.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttestationError::RateLimitExceeded(_) | AttestationError::ProofGenerationFailed(_)
        )
    }

    /// Short text suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AttestationError::NotAuthorized(_) => {
                "You are not authorized to perform this action."
            }
            AttestationError::InvalidInput(_) => "The provided input is invalid.",
            AttestationError::ProofGenerationFailed(_) => {
                "Failed to generate the proof. Please try again."
            }
            AttestationError::VerificationFailed(_) => "The proof verification failed.",
            AttestationError::RateLimitExceeded(_) => {
                "Too many requests. Please wait a moment and try again."
            }
            AttestationError::UnsupportedTokenStandard(_) => {
                "This token standard is not supported."
            }
            AttestationError::Cancelled => "The request was cancelled.",
        }
    }
}

/// Tag the prover sends when it is throttling callers.
pub const RATE_LIMITED_TAG: &str = "RATE_LIMITED";

/// Classified prover error tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProverErrorKind {
    RateLimited,
    NotAuthorized,
    InvalidInput,
    UnsupportedStandard,
    VerificationFailed,
    ProofGenerationFailed,
    /// No known tag.
    Opaque,
}

const TAGS: &[(&str, ProverErrorKind)] = &[
    (RATE_LIMITED_TAG, ProverErrorKind::RateLimited),
    ("RateLimitExceeded", ProverErrorKind::RateLimited),
    ("NOT_AUTHORIZED", ProverErrorKind::NotAuthorized),
    ("NotAuthorized", ProverErrorKind::NotAuthorized),
    ("INVALID_INPUT", ProverErrorKind::InvalidInput),
    ("InvalidInput", ProverErrorKind::InvalidInput),
    ("UNSUPPORTED_STANDARD", ProverErrorKind::UnsupportedStandard),
    ("UnsupportedTokenStandard", ProverErrorKind::UnsupportedStandard),
    ("VERIFICATION_FAILED", ProverErrorKind::VerificationFailed),
    ("VerificationFailed", ProverErrorKind::VerificationFailed),
    ("PROOF_GENERATION_FAILED", ProverErrorKind::ProofGenerationFailed),
    ("ProofGenerationFailed", ProverErrorKind::ProofGenerationFailed),
];

/// A prover `Err` string split into its tag and detail.
///
/// Accepted shapes are `TAG` and `TAG: detail`. Anything else is opaque and
/// keeps the whole string as its detail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProverFailure {
    pub kind: ProverErrorKind,
    pub detail: String,
}

impl ProverFailure {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        for (tag, kind) in TAGS {
            let Some(rest) = trimmed.strip_prefix(tag) else {
                continue;
            };
            let rest = rest.trim_start();
            if rest.is_empty() {
                return Self {
                    kind: *kind,
                    detail: String::new(),
                };
            }
            if let Some(detail) = rest.strip_prefix(':') {
                return Self {
                    kind: *kind,
                    detail: detail.trim().to_string(),
                };
            }
        }

        Self {
            kind: ProverErrorKind::Opaque,
            detail: trimmed.to_string(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ProverErrorKind::RateLimited
    }

    /// Map to the error surfaced to callers. Opaque failures become the
    /// failure of the operation in flight.
    pub fn into_error(self, opaque: fn(String) -> AttestationError) -> AttestationError {
        let detail = self.detail;
        match self.kind {
            ProverErrorKind::RateLimited => AttestationError::RateLimitExceeded(detail),
            ProverErrorKind::NotAuthorized => AttestationError::NotAuthorized(detail),
            ProverErrorKind::InvalidInput => AttestationError::InvalidInput(detail),
            ProverErrorKind::UnsupportedStandard => {
                AttestationError::UnsupportedTokenStandard(detail)
            }
            ProverErrorKind::VerificationFailed => AttestationError::VerificationFailed(detail),
            ProverErrorKind::ProofGenerationFailed => {
                AttestationError::ProofGenerationFailed(detail)
            }
            ProverErrorKind::Opaque => opaque(detail),
        }
    }
}
