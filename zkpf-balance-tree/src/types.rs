//! Token descriptors and balance records.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::principal::Principal;

/// Byte length of the canonical leaf preimage before the metadata bytes.
pub const LEAF_FIXED_PREFIX_LEN: usize = 8 + 16 + 32;

/// Token standards with a balance query implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStandard {
    /// Ledger-style account balance keyed by account identifier.
    #[serde(rename = "ICP")]
    Ledger,
    /// ICRC-1 fungible token.
    #[serde(rename = "ICRC1")]
    FungibleV1,
    /// ICRC-2 fungible token (balance query inherited from ICRC-1).
    #[serde(rename = "ICRC2")]
    FungibleV2,
    /// DIP20 fungible token.
    #[serde(rename = "DIP20")]
    LegacyFungible,
    /// EXT token, optionally addressed by a sub-token identifier.
    #[serde(rename = "EXT")]
    Extensible,
}

impl TokenStandard {
    pub const ALL: [TokenStandard; 5] = [
        TokenStandard::Ledger,
        TokenStandard::FungibleV1,
        TokenStandard::FungibleV2,
        TokenStandard::LegacyFungible,
        TokenStandard::Extensible,
    ];

    /// Wire tag used in metadata and prover requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Ledger => "ICP",
            TokenStandard::FungibleV1 => "ICRC1",
            TokenStandard::FungibleV2 => "ICRC2",
            TokenStandard::LegacyFungible => "DIP20",
            TokenStandard::Extensible => "EXT",
        }
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenStandard::ALL
            .into_iter()
            .find(|standard| standard.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported token standard: {s}"))
    }
}

/// Static description of a balance source, fixed at configuration time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Canister hosting the token.
    pub id: Principal,
    pub standard: TokenStandard,
    pub decimals: u8,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// EXT token identifier. Required for [`TokenStandard::Extensible`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_token: Option<String>,
}

#[derive(Serialize)]
struct DescriptorMetadata<'a> {
    standard: TokenStandard,
    symbol: &'a str,
    decimals: u8,
}

impl TokenDescriptor {
    pub fn new(
        id: Principal,
        standard: TokenStandard,
        decimals: u8,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            id,
            standard,
            decimals,
            symbol: symbol.into(),
            name: String::new(),
            sub_token: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sub_token(mut self, sub_token: impl Into<String>) -> Self {
        self.sub_token = Some(sub_token.into());
        self
    }

    /// Numeric token id committed into the leaf.
    ///
    /// Canister principals (`u64 index ‖ 0x01 0x01`) map to their index; any
    /// other principal maps to the first 8 bytes of its SHA-256.
    pub fn token_id(&self) -> u64 {
        let bytes = self.id.as_bytes();
        let mut index = [0u8; 8];
        if bytes.len() == 10 && bytes[8] == 0x01 && bytes[9] == 0x01 {
            index.copy_from_slice(&bytes[..8]);
        } else {
            index.copy_from_slice(&Sha256::digest(bytes)[..8]);
        }
        u64::from_be_bytes(index)
    }

    /// Serialized descriptor info carried in each leaf:
    /// `{"standard":..,"symbol":..,"decimals":..}`.
    pub fn metadata_bytes(&self) -> Vec<u8> {
        let metadata = DescriptorMetadata {
            standard: self.standard,
            symbol: &self.symbol,
            decimals: self.decimals,
        };
        // Strings and integers always serialize.
        serde_json::to_vec(&metadata).unwrap_or_default()
    }

    /// Render a raw integer balance with `decimals` fractional digits.
    pub fn format_balance(&self, raw: u128) -> String {
        format_units(raw, self.decimals)
    }
}

/// Fixed-point rendering with trailing fractional zeros trimmed.
pub fn format_units(raw: u128, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// One committed balance. Produced by an aggregation pass, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub token_id: u64,
    /// Raw ledger units, committed at full width.
    pub balance: u128,
    /// SHA-256 of the owner principal bytes.
    #[serde(with = "hex_array")]
    pub owner_hash: [u8; 32],
    #[serde(with = "hex_vec")]
    pub metadata: Vec<u8>,
}

impl BalanceRecord {
    pub fn new(token_id: u64, balance: u128, owner_hash: [u8; 32], metadata: Vec<u8>) -> Self {
        Self {
            token_id,
            balance,
            owner_hash,
            metadata,
        }
    }

    /// Record for `owner`'s balance of `token`.
    pub fn for_token(token: &TokenDescriptor, owner: &Principal, balance: u128) -> Self {
        Self::new(
            token.token_id(),
            balance,
            owner.owner_hash(),
            token.metadata_bytes(),
        )
    }

    /// Zero-balance stand-in used when a fetch fails.
    pub fn zero(token: &TokenDescriptor, owner: &Principal) -> Self {
        Self::for_token(token, owner, 0)
    }

    /// Canonical leaf preimage:
    /// `token_id_be8 ‖ balance_be16 ‖ owner_hash ‖ metadata`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LEAF_FIXED_PREFIX_LEN + self.metadata.len());
        buf.extend_from_slice(&self.token_id.to_be_bytes());
        buf.extend_from_slice(&self.balance.to_be_bytes());
        buf.extend_from_slice(&self.owner_hash);
        buf.extend_from_slice(&self.metadata);
        buf
    }
}

mod hex_array {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", v.len())))
    }
}

mod hex_vec {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(D::Error::custom)
    }
}
