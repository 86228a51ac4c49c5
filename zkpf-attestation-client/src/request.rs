//! Ownership proof requests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zkpf_balance_tree::{
    hash_leaf, verify_inclusion, BalanceRecord, MerkleProof, NodeHash, Principal, TokenDescriptor,
};

use crate::{
    error::AttestationError,
    transport::{TokenMetadataInput, TokenOwnershipInput},
};

/// Statement to prove: `owner` holds at least `minimum_balance` of
/// `token_id` in the tree with root `merkle_root`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub token_id: u64,
    pub minimum_balance: u128,
    pub owner: Principal,
    #[serde(with = "hex_root")]
    pub merkle_root: NodeHash,
}

impl AttestationRequest {
    /// Public inputs for verification: token id and minimum balance in
    /// decimal, then the root in hex.
    pub fn public_inputs(&self) -> Vec<String> {
        vec![
            self.token_id.to_string(),
            self.minimum_balance.to_string(),
            hex::encode(self.merkle_root),
        ]
    }
}

/// Proof returned by the prover.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReceipt {
    pub proof_id: String,
    pub proof_bytes: Vec<u8>,
}

impl ProofReceipt {
    /// The prover leads each proof with its 32-byte hash; that hash names
    /// the proof. Shorter proofs are named by their SHA-256.
    pub fn from_proof_bytes(proof_bytes: Vec<u8>) -> Self {
        let proof_id = match proof_bytes.get(..32) {
            Some(head) => hex::encode(head),
            None => hex::encode(Sha256::digest(&proof_bytes)),
        };
        Self {
            proof_id,
            proof_bytes,
        }
    }
}

/// Assemble the prover input for `record`, checking that the statement in
/// `request` actually holds for it.
pub fn build_ownership_input(
    token: &TokenDescriptor,
    record: &BalanceRecord,
    proof: &MerkleProof,
    request: &AttestationRequest,
) -> Result<TokenOwnershipInput, AttestationError> {
    if record.token_id != request.token_id {
        return Err(AttestationError::InvalidInput(format!(
            "record is for token {}, request is for token {}",
            record.token_id, request.token_id
        )));
    }
    if record.token_id != token.token_id() {
        return Err(AttestationError::InvalidInput(format!(
            "record token {} does not belong to {}",
            record.token_id, token.symbol
        )));
    }
    if record.owner_hash != request.owner.owner_hash() {
        return Err(AttestationError::InvalidInput(format!(
            "record is not owned by {}",
            request.owner
        )));
    }
    if record.balance < request.minimum_balance {
        return Err(AttestationError::InvalidInput(format!(
            "balance {} is below the minimum {}",
            record.balance, request.minimum_balance
        )));
    }
    if !verify_inclusion(proof, &hash_leaf(record), &request.merkle_root) {
        return Err(AttestationError::InvalidInput(
            "inclusion proof does not match the merkle root".to_string(),
        ));
    }

    let mut token_specific_data = Vec::with_capacity(32 + 16);
    token_specific_data.extend_from_slice(&request.merkle_root);
    token_specific_data.extend_from_slice(&request.minimum_balance.to_be_bytes());

    Ok(TokenOwnershipInput {
        token_metadata: TokenMetadataInput {
            canister_id: token.id.to_text(),
            token_standard: token.standard,
            decimals: Some(token.decimals),
        },
        token_id: record.token_id.to_be_bytes().to_vec(),
        balance: record.balance.to_be_bytes().to_vec(),
        owner_hash: record.owner_hash.to_vec(),
        merkle_path: proof.merkle_path(),
        path_indices: proof.path_indices(),
        token_specific_data: Some(token_specific_data),
    })
}

mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(root: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(root))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut root = [0u8; 32];
        hex::decode_to_slice(&s, &mut root).map_err(D::Error::custom)?;
        Ok(root)
    }
}
