//! Scripted prover transport.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use zkpf_attestation_client::{ProverReply, ProverTransport, TokenOwnershipInput, TransportError};
use zkpf_balance_tree::TokenStandard;

/// Length of a simulated proof: a 32-byte hash and three 32-byte commitments.
pub const SIMULATED_PROOF_LEN: usize = 32 * 4;

type ProveResult = Result<ProverReply<Vec<u8>>, TransportError>;
type VerifyResult = Result<ProverReply<bool>, TransportError>;

/// [`ProverTransport`] that replays queued replies.
///
/// Once a queue runs dry, `prove_ownership` answers with
/// [`simulated_proof`] and `verify_proof` accepts any proof of
/// [`SIMULATED_PROOF_LEN`] bytes.
#[derive(Default)]
pub struct ScriptedProver {
    prove_replies: Mutex<VecDeque<ProveResult>>,
    verify_replies: Mutex<VecDeque<VerifyResult>>,
    prove_calls: Mutex<Vec<(Instant, TokenOwnershipInput)>>,
    verify_calls: Mutex<Vec<Instant>>,
}

impl ScriptedProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `count` copies of a prove reply.
    pub fn push_prove(self, reply: ProveResult, count: usize) -> Self {
        self.prove_replies
            .lock()
            .unwrap()
            .extend(std::iter::repeat(reply).take(count));
        self
    }

    /// Queue `count` copies of a verify reply.
    pub fn push_verify(self, reply: VerifyResult, count: usize) -> Self {
        self.verify_replies
            .lock()
            .unwrap()
            .extend(std::iter::repeat(reply).take(count));
        self
    }

    /// Queue `count` rate-limited prove replies.
    pub fn rate_limited(self, count: usize) -> Self {
        self.push_prove(Ok(ProverReply::Err("RATE_LIMITED".to_string())), count)
    }

    /// Instants (tokio clock) at which `prove_ownership` was called.
    pub fn prove_call_times(&self) -> Vec<Instant> {
        self.prove_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn prove_call_count(&self) -> usize {
        self.prove_calls.lock().unwrap().len()
    }

    pub fn verify_call_count(&self) -> usize {
        self.verify_calls.lock().unwrap().len()
    }

    pub fn last_input(&self) -> Option<TokenOwnershipInput> {
        self.prove_calls
            .lock()
            .unwrap()
            .last()
            .map(|(_, input)| input.clone())
    }
}

#[async_trait]
impl ProverTransport for ScriptedProver {
    async fn prove_ownership(
        &self,
        param_id: &str,
        input: &TokenOwnershipInput,
    ) -> Result<ProverReply<Vec<u8>>, TransportError> {
        self.prove_calls
            .lock()
            .unwrap()
            .push((Instant::now(), input.clone()));

        let queued = self.prove_replies.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(ProverReply::Ok(simulated_proof(param_id, input))))
    }

    async fn verify_proof(
        &self,
        proof: &[u8],
        _public_inputs: &[String],
        _standard: TokenStandard,
    ) -> Result<ProverReply<bool>, TransportError> {
        self.verify_calls.lock().unwrap().push(Instant::now());

        let queued = self.verify_replies.lock().unwrap().pop_front();
        queued.unwrap_or(Ok(ProverReply::Ok(proof.len() == SIMULATED_PROOF_LEN)))
    }
}

/// Hash-based stand-in for a real proof: `h ‖ H(h ‖ 0) ‖ H(h ‖ 1) ‖ H(h ‖ 2)`
/// where `h` commits to every field of the input.
pub fn simulated_proof(param_id: &str, input: &TokenOwnershipInput) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(input.token_metadata.canister_id.as_bytes());
    hasher.update(&input.token_id);
    hasher.update(&input.balance);
    hasher.update(&input.owner_hash);
    for node in &input.merkle_path {
        hasher.update(node);
    }
    hasher.update(&input.path_indices);
    if let Some(data) = &input.token_specific_data {
        hasher.update(data);
    }
    hasher.update(param_id.as_bytes());
    let head = hasher.finalize();

    let mut proof = Vec::with_capacity(SIMULATED_PROOF_LEN);
    proof.extend_from_slice(&head);
    for i in 0u8..3 {
        let mut commitment = Sha256::new();
        commitment.update(head);
        commitment.update([i]);
        proof.extend_from_slice(&commitment.finalize());
    }
    proof
}
