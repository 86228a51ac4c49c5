//! zkpf-balance-tree
//!
//! Commitment layer for token-balance attestation: the identities that own
//! balances, the canonical encoding of one balance as a Merkle leaf, and the
//! binary SHA-256 accumulator that commits a whole aggregation pass.
//!
//! # Leaf layout
//!
//! ```text
//! leaf = SHA-256(token_id_be8 ‖ balance_be16 ‖ owner_hash[32] ‖ metadata)
//! node = SHA-256(left ‖ right)
//! ```
//!
//! Leaves keep the order of the records they were built from, so two passes
//! over the same balances in the same order always produce the same root.

pub mod error;
pub mod merkle;
pub mod principal;
pub mod types;

pub use error::{TreeError, TreeResult};
pub use merkle::{
    hash_leaf, hash_pair, verify_inclusion, BalanceTree, Direction, MerkleNode, MerkleProof,
    NodeHash,
};
pub use principal::{AccountIdentifier, Principal, Subaccount, DEFAULT_SUBACCOUNT};
pub use types::{format_units, BalanceRecord, TokenDescriptor, TokenStandard};
