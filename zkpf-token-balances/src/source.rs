//! Per-standard balance queries.
//!
//! | Standard | Method | Argument | Reply |
//! |---|---|---|---|
//! | ICP ledger | `account_balance` | `{"account": hex}` | `{"e8s": nat}` |
//! | ICRC-1 / ICRC-2 | `icrc1_balance_of` | `{"owner": text, "subaccount": null}` | `nat` |
//! | DIP20 | `balanceOf` | `[text]` | `nat` |
//! | EXT | `balance` | `{"user": text, "token": id}` | `{"ok": nat}` or `{"err": ..}` |
//!
//! A `nat` is a JSON unsigned integer or a decimal string, since ledger
//! naturals can exceed what a JSON number holds exactly.

use async_trait::async_trait;
use serde_json::{json, Value};
use zkpf_balance_tree::{Principal, TokenDescriptor, TokenStandard};

use crate::{agent::QueryAgent, error::BalanceError};

/// Fetches one owner's balance for tokens of a single standard.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    fn standard(&self) -> TokenStandard;

    async fn balance_of(
        &self,
        agent: &dyn QueryAgent,
        token: &TokenDescriptor,
        owner: &Principal,
    ) -> Result<u128, BalanceError>;
}

/// The source implementing `standard`.
pub fn source_for(standard: TokenStandard) -> &'static dyn BalanceSource {
    match standard {
        TokenStandard::Ledger => &LedgerSource,
        TokenStandard::FungibleV1 => &FUNGIBLE_V1,
        TokenStandard::FungibleV2 => &FUNGIBLE_V2,
        TokenStandard::LegacyFungible => &LegacyFungibleSource,
        TokenStandard::Extensible => &ExtSource,
    }
}

/// Decode a `nat` reply value.
pub fn parse_nat(value: &Value) -> Result<u128, BalanceError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| BalanceError::InvalidResponse(format!("not a natural: {n}"))),
        Value::String(s) => {
            let digits: String = s.chars().filter(|c| *c != '_').collect();
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(BalanceError::InvalidResponse(format!(
                    "not a natural: {s:?}"
                )));
            }
            digits
                .parse()
                .map_err(|_| BalanceError::InvalidResponse(format!("natural out of range: {s}")))
        }
        other => Err(BalanceError::InvalidResponse(format!(
            "expected a natural, got {other}"
        ))),
    }
}

fn field<'a>(reply: &'a Value, name: &str) -> Result<&'a Value, BalanceError> {
    reply
        .get(name)
        .ok_or_else(|| BalanceError::InvalidResponse(format!("reply has no `{name}` field: {reply}")))
}

/// ICP ledger, keyed by account identifier.
pub struct LedgerSource;

#[async_trait]
impl BalanceSource for LedgerSource {
    fn standard(&self) -> TokenStandard {
        TokenStandard::Ledger
    }

    async fn balance_of(
        &self,
        agent: &dyn QueryAgent,
        token: &TokenDescriptor,
        owner: &Principal,
    ) -> Result<u128, BalanceError> {
        let arg = json!({ "account": owner.account_identifier().to_hex() });
        let reply = agent.query(&token.id, "account_balance", arg).await?;
        parse_nat(field(&reply, "e8s")?)
    }
}

/// ICRC-1 and ICRC-2 tokens. ICRC-2 inherits the ICRC-1 balance query.
pub struct FungibleSource {
    standard: TokenStandard,
}

static FUNGIBLE_V1: FungibleSource = FungibleSource {
    standard: TokenStandard::FungibleV1,
};

static FUNGIBLE_V2: FungibleSource = FungibleSource {
    standard: TokenStandard::FungibleV2,
};

#[async_trait]
impl BalanceSource for FungibleSource {
    fn standard(&self) -> TokenStandard {
        self.standard
    }

    async fn balance_of(
        &self,
        agent: &dyn QueryAgent,
        token: &TokenDescriptor,
        owner: &Principal,
    ) -> Result<u128, BalanceError> {
        let arg = json!({ "owner": owner.to_text(), "subaccount": null });
        let reply = agent.query(&token.id, "icrc1_balance_of", arg).await?;
        parse_nat(&reply)
    }
}

/// DIP20 tokens.
pub struct LegacyFungibleSource;

#[async_trait]
impl BalanceSource for LegacyFungibleSource {
    fn standard(&self) -> TokenStandard {
        TokenStandard::LegacyFungible
    }

    async fn balance_of(
        &self,
        agent: &dyn QueryAgent,
        token: &TokenDescriptor,
        owner: &Principal,
    ) -> Result<u128, BalanceError> {
        let reply = agent
            .query(&token.id, "balanceOf", json!([owner.to_text()]))
            .await?;
        parse_nat(&reply)
    }
}

/// EXT tokens, addressed by the descriptor's sub-token identifier.
pub struct ExtSource;

#[async_trait]
impl BalanceSource for ExtSource {
    fn standard(&self) -> TokenStandard {
        TokenStandard::Extensible
    }

    async fn balance_of(
        &self,
        agent: &dyn QueryAgent,
        token: &TokenDescriptor,
        owner: &Principal,
    ) -> Result<u128, BalanceError> {
        let sub_token = token
            .sub_token
            .as_deref()
            .ok_or_else(|| BalanceError::MissingSubToken {
                symbol: token.symbol.clone(),
            })?;

        let arg = json!({ "user": owner.to_text(), "token": sub_token });
        let reply = agent.query(&token.id, "balance", arg).await?;

        if let Some(ok) = reply.get("ok") {
            return parse_nat(ok);
        }
        if let Some(err) = reply.get("err") {
            return Err(BalanceError::Rejected {
                canister: token.id.to_text(),
                method: "balance".to_string(),
                message: err.to_string(),
            });
        }
        Err(BalanceError::InvalidResponse(format!(
            "EXT balance reply is neither ok nor err: {reply}"
        )))
    }
}
