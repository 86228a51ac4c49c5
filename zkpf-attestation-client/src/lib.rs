//! zkpf-attestation-client
//!
//! Proves statements of the form "this owner holds at least N of token T"
//! against a committed balance tree, using a remote prover reached through
//! [`ProverTransport`].
//!
//! The prover may throttle callers. Rate-limited requests are retried with a
//! linear backoff (2 s, 4 s, 6 s by default) before the error is surfaced;
//! every other prover error is surfaced at once. All requests take a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod session;
pub mod transport;

pub use client::{AttestationClient, RetryPolicy};
pub use config::{AttestationClientConfig, AttestationClientConfigBuilder};
pub use error::{AttestationError, ProverErrorKind, ProverFailure, RATE_LIMITED_TAG};
pub use request::{build_ownership_input, AttestationRequest, ProofReceipt};
pub use session::{AttestationOutcome, AttestationSession, BalanceCommitment};
pub use transport::{
    HttpProverTransport, ProverReply, ProverTransport, TokenMetadataInput, TokenOwnershipInput,
    TransportError,
};
