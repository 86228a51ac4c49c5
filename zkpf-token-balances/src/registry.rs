//! Well-known token canisters.

use zkpf_balance_tree::{Principal, TokenDescriptor, TokenStandard};

/// Canister ids of tokens with a built-in descriptor.
pub mod known_tokens {
    /// ICP ledger.
    pub const ICP_LEDGER: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";
    /// ckBTC ledger (ICRC-2).
    pub const CKBTC_LEDGER: &str = "mxzaz-hqaaa-aaaar-qaada-cai";
    /// ckETH ledger (ICRC-2).
    pub const CKETH_LEDGER: &str = "ss2fx-dyaaa-aaaar-qacoq-cai";
}

/// Descriptor for a well-known token canister, if there is one.
pub fn known_token(canister: &str) -> Option<TokenDescriptor> {
    let id = Principal::from_text(canister).ok()?;
    let descriptor = match canister {
        known_tokens::ICP_LEDGER => TokenDescriptor::new(id, TokenStandard::Ledger, 8, "ICP")
            .with_name("Internet Computer Protocol"),
        known_tokens::CKBTC_LEDGER => {
            TokenDescriptor::new(id, TokenStandard::FungibleV2, 8, "ckBTC").with_name("ckBTC")
        }
        known_tokens::CKETH_LEDGER => {
            TokenDescriptor::new(id, TokenStandard::FungibleV2, 18, "ckETH").with_name("ckETH")
        }
        _ => return None,
    };
    Some(descriptor)
}

/// Tokens aggregated when the caller configures none: the ICP ledger.
pub fn default_token_set() -> Vec<TokenDescriptor> {
    known_token(known_tokens::ICP_LEDGER).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_token_set_is_icp_ledger() {
        let tokens = default_token_set();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol, "ICP");
        assert_eq!(tokens[0].standard, TokenStandard::Ledger);
        assert_eq!(tokens[0].decimals, 8);
        assert_eq!(tokens[0].id.to_text(), known_tokens::ICP_LEDGER);
    }

    #[test]
    fn test_known_token_ids_parse() {
        for id in [
            known_tokens::ICP_LEDGER,
            known_tokens::CKBTC_LEDGER,
            known_tokens::CKETH_LEDGER,
        ] {
            let token = known_token(id).expect("known token should resolve");
            assert_eq!(token.id.to_text(), id);
        }
        assert!(known_token("aaaaa-aa").is_none());
    }
}
