//! Principal identities and ledger account identifiers.
//!
//! A principal is an opaque byte string of at most 29 bytes. Its textual form
//! is the lowercase, unpadded base32 encoding of `crc32_be(bytes) ‖ bytes`,
//! split into dash-separated groups of five characters.
//!
//! Ledger balances are keyed by an account identifier derived from the owner
//! principal and a 32-byte subaccount:
//!
//! ```text
//! h          = SHA-224("\x0Aaccount-id" ‖ principal ‖ subaccount)
//! account_id = crc32_be(h) ‖ h
//! ```

use std::{fmt, str::FromStr};

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256};

use crate::error::{TreeError, TreeResult};

/// Domain separator mixed into every account identifier hash.
pub const ACCOUNT_DOMAIN_SEPARATOR: &[u8] = b"\x0Aaccount-id";

/// Ledger subaccount.
pub type Subaccount = [u8; 32];

/// The all-zero default subaccount.
pub const DEFAULT_SUBACCOUNT: Subaccount = [0u8; 32];

/// Binary identity of an owner or a canister.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(Vec<u8>);

impl Principal {
    /// Maximum principal length in bytes.
    pub const MAX_LENGTH: usize = 29;

    /// Build a principal from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> TreeResult<Self> {
        if bytes.len() > Self::MAX_LENGTH {
            return Err(TreeError::InvalidPrincipal(format!(
                "principal is {} bytes, maximum is {}",
                bytes.len(),
                Self::MAX_LENGTH
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// The anonymous principal (`2vxsx-fae`).
    pub fn anonymous() -> Self {
        Self(vec![0x04])
    }

    /// The management canister (`aaaaa-aa`).
    pub fn management_canister() -> Self {
        Self(Vec::new())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse the canonical textual form.
    pub fn from_text(text: &str) -> TreeResult<Self> {
        let compact: String = text
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let decoded = BASE32_NOPAD
            .decode(compact.as_bytes())
            .map_err(|e| TreeError::InvalidPrincipal(format!("{text}: {e}")))?;

        if decoded.len() < 4 {
            return Err(TreeError::InvalidPrincipal(format!(
                "{text}: missing checksum"
            )));
        }

        let (checksum, bytes) = decoded.split_at(4);
        let principal = Self::from_slice(bytes)?;

        let expected = crc32fast::hash(bytes);
        let actual = u32::from_be_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
        if expected != actual {
            return Err(TreeError::InvalidChecksum { expected, actual });
        }

        if principal.to_text() != text {
            return Err(TreeError::InvalidPrincipal(format!(
                "{text}: not in canonical form"
            )));
        }

        Ok(principal)
    }

    /// Render the canonical textual form.
    pub fn to_text(&self) -> String {
        let mut buf = Vec::with_capacity(4 + self.0.len());
        buf.extend_from_slice(&crc32fast::hash(&self.0).to_be_bytes());
        buf.extend_from_slice(&self.0);

        let encoded = BASE32_NOPAD.encode(&buf).to_ascii_lowercase();
        let mut text = String::with_capacity(encoded.len() + encoded.len() / 5);
        for (i, ch) in encoded.chars().enumerate() {
            if i > 0 && i % 5 == 0 {
                text.push('-');
            }
            text.push(ch);
        }
        text
    }

    /// SHA-256 of the principal bytes; the `owner_hash` of a balance record.
    pub fn owner_hash(&self) -> [u8; 32] {
        Sha256::digest(&self.0).into()
    }

    /// Ledger account identifier for the default subaccount.
    pub fn account_identifier(&self) -> AccountIdentifier {
        AccountIdentifier::new(self, &DEFAULT_SUBACCOUNT)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.to_text())
    }
}

impl FromStr for Principal {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = TreeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_text(&value)
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.to_text()
    }
}

/// 32-byte ledger account identifier: `crc32_be(h) ‖ h`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountIdentifier([u8; 32]);

impl AccountIdentifier {
    /// Derive the identifier for `owner` and `subaccount`.
    pub fn new(owner: &Principal, subaccount: &Subaccount) -> Self {
        let mut hasher = Sha224::new();
        hasher.update(ACCOUNT_DOMAIN_SEPARATOR);
        hasher.update(owner.as_bytes());
        hasher.update(subaccount);
        let hash = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&crc32fast::hash(&hash).to_be_bytes());
        bytes[4..].copy_from_slice(&hash);
        Self(bytes)
    }

    /// Parse a 64-character hex identifier, validating its checksum.
    pub fn from_hex(hex_str: &str) -> TreeResult<Self> {
        let decoded = hex::decode(hex_str.trim())
            .map_err(|e| TreeError::InvalidAccountIdentifier(e.to_string()))?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| {
            TreeError::InvalidAccountIdentifier(format!("expected 32 bytes, got {}", v.len()))
        })?;

        let expected = crc32fast::hash(&bytes[4..]);
        let actual = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if expected != actual {
            return Err(TreeError::InvalidChecksum { expected, actual });
        }

        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for AccountIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountIdentifier({})", self.to_hex())
    }
}
