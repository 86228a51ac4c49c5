//! Balance fetch errors.

use thiserror::Error;

/// A single token's balance could not be fetched.
///
/// The aggregator recovers from every variant by committing a zero balance
/// for the token, so these never escape `fetch_all`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    /// The query could not be issued or its reply could not be read.
    #[error("balance fetch failed: query {method} on {canister}: {message}")]
    Query {
        canister: String,
        method: String,
        message: String,
    },

    /// The canister rejected the call.
    #[error("balance fetch failed: {canister} rejected {method}: {message}")]
    Rejected {
        canister: String,
        method: String,
        message: String,
    },

    /// The reply decoded but did not carry a balance.
    #[error("balance fetch failed: invalid response: {0}")]
    InvalidResponse(String),

    /// An EXT token was configured without its token identifier.
    #[error("balance fetch failed: {symbol} has no sub-token identifier")]
    MissingSubToken { symbol: String },

    /// HTTP transport failure below the query layer.
    #[error("balance fetch failed: transport: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for BalanceError {
    fn from(e: reqwest::Error) -> Self {
        BalanceError::Transport(e.to_string())
    }
}

pub type BalanceResult<T> = Result<T, BalanceError>;
