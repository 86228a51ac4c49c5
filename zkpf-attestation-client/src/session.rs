//! End-to-end attestation: aggregate, commit, prove.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zkpf_balance_tree::{BalanceRecord, BalanceTree, MerkleProof, Principal, TokenDescriptor};
use zkpf_token_balances::BalanceAggregator;

use crate::{
    client::AttestationClient,
    error::AttestationError,
    request::{build_ownership_input, AttestationRequest, ProofReceipt},
};

/// Balances of one aggregation pass and the tree committing them.
#[derive(Clone, Debug)]
pub struct BalanceCommitment {
    pub records: Vec<BalanceRecord>,
    pub tree: BalanceTree,
}

impl BalanceCommitment {
    pub fn root_hex(&self) -> String {
        self.tree.root_hex()
    }
}

/// Result of a successful attestation.
#[derive(Clone, Debug)]
pub struct AttestationOutcome {
    pub merkle_root_hex: String,
    pub token: TokenDescriptor,
    pub record: BalanceRecord,
    pub proof: MerkleProof,
    pub request: AttestationRequest,
    pub receipt: ProofReceipt,
}

/// Aggregator, tree and prover client wired together.
pub struct AttestationSession {
    aggregator: BalanceAggregator,
    client: AttestationClient,
}

impl AttestationSession {
    pub fn new(aggregator: BalanceAggregator, client: AttestationClient) -> Self {
        Self { aggregator, client }
    }

    pub fn aggregator(&self) -> &BalanceAggregator {
        &self.aggregator
    }

    pub fn client(&self) -> &AttestationClient {
        &self.client
    }

    /// Fetch every configured balance for `owner` and commit them.
    pub async fn commit(&self, owner: &Principal) -> BalanceCommitment {
        let records = self.aggregator.fetch_all(owner).await;
        let tree = BalanceTree::build(&records);
        debug!(owner = %owner, leaves = tree.leaf_count(), root = %tree.root_hex(), "balances committed");
        BalanceCommitment { records, tree }
    }

    /// Prove that `owner` holds at least `minimum_balance` of the token at
    /// `token_index` in the configured token list.
    pub async fn attest(
        &self,
        owner: &Principal,
        token_index: usize,
        minimum_balance: u128,
        cancel: &CancellationToken,
    ) -> Result<AttestationOutcome, AttestationError> {
        if cancel.is_cancelled() {
            return Err(AttestationError::Cancelled);
        }

        let token = self
            .aggregator
            .tokens()
            .get(token_index)
            .cloned()
            .ok_or_else(|| {
                AttestationError::InvalidInput(format!(
                    "token index {token_index} out of range ({} configured)",
                    self.aggregator.tokens().len()
                ))
            })?;

        let BalanceCommitment { records, tree } = self.commit(owner).await;
        let record = records
            .get(token_index)
            .cloned()
            .ok_or_else(|| AttestationError::InvalidInput("missing balance record".to_string()))?;
        let proof = tree.prove_record(&record).ok_or_else(|| {
            AttestationError::InvalidInput("record is not in the committed tree".to_string())
        })?;

        let request = AttestationRequest {
            token_id: record.token_id,
            minimum_balance,
            owner: owner.clone(),
            merkle_root: tree.root(),
        };
        let input = build_ownership_input(&token, &record, &proof, &request)?;
        let receipt = self.client.generate_proof(&input, cancel).await?;

        info!(
            token = %token.symbol,
            root = %tree.root_hex(),
            proof_id = %receipt.proof_id,
            "balance attestation complete"
        );

        Ok(AttestationOutcome {
            merkle_root_hex: tree.root_hex(),
            token,
            record,
            proof,
            request,
            receipt,
        })
    }

    /// Ask the prover to verify a previous outcome.
    pub async fn verify(
        &self,
        outcome: &AttestationOutcome,
        cancel: &CancellationToken,
    ) -> Result<bool, AttestationError> {
        self.client
            .verify_proof(
                &outcome.receipt.proof_bytes,
                &outcome.request.public_inputs(),
                outcome.token.standard,
                cancel,
            )
            .await
    }
}
