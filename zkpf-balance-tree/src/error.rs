//! Error types for balance-tree encoding and proofs.

use thiserror::Error;

/// Errors raised while decoding identities or assembling proofs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Principal text or bytes are malformed.
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),

    /// The CRC32 embedded in a principal or account identifier does not match.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    InvalidChecksum { expected: u32, actual: u32 },

    /// Account identifier is not 32 bytes of valid hex.
    #[error("invalid account identifier: {0}")]
    InvalidAccountIdentifier(String),

    /// Sibling path and direction bits differ in length.
    #[error("proof length mismatch: {siblings} siblings, {directions} direction bits")]
    ProofLengthMismatch { siblings: usize, directions: usize },

    /// A digest was not exactly 32 bytes.
    #[error("invalid digest at position {index}: expected 32 bytes, got {len}")]
    InvalidDigest { index: usize, len: usize },

    /// A wire direction byte was neither 0 nor 1.
    #[error("invalid path index {value} at position {index}")]
    InvalidDirection { index: usize, value: u8 },
}

pub type TreeResult<T> = Result<T, TreeError>;
