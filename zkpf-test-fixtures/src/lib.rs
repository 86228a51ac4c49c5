pub mod agent;
pub mod http;
pub mod prover;

use once_cell::sync::OnceCell;
use zkpf_balance_tree::{Principal, TokenDescriptor, TokenStandard};
use zkpf_token_balances::known_token;

pub use agent::{ext_err_reply, ext_ok_reply, ledger_reply, nat_reply, ScriptedQueryAgent};
pub use http::{CannedHttpServer, CannedResponse, RecordedRequest};
pub use prover::{simulated_proof, ScriptedProver, SIMULATED_PROOF_LEN};

static FIXTURES: OnceCell<TestFixtures> = OnceCell::new();

/// Sample owner and token set reused across tests.
pub struct TestFixtures {
    owner: Principal,
    other_owner: Principal,
    tokens: Vec<TokenDescriptor>,
}

impl TestFixtures {
    /// A 29-byte self-authenticating-style owner principal.
    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    /// A second owner, distinct from [`owner`](Self::owner).
    pub fn other_owner(&self) -> &Principal {
        &self.other_owner
    }

    /// One token per standard family, in this order:
    /// ICP ledger, ckBTC (ICRC-2), a DIP20 token, an EXT token.
    pub fn tokens(&self) -> &[TokenDescriptor] {
        &self.tokens
    }

    pub fn ledger(&self) -> &TokenDescriptor {
        &self.tokens[0]
    }

    pub fn fungible(&self) -> &TokenDescriptor {
        &self.tokens[1]
    }

    pub fn legacy(&self) -> &TokenDescriptor {
        &self.tokens[2]
    }

    pub fn ext(&self) -> &TokenDescriptor {
        &self.tokens[3]
    }
}

/// Return lazily constructed test fixtures shared across crates.
pub fn fixtures() -> &'static TestFixtures {
    FIXTURES.get_or_init(build_fixtures)
}

fn build_fixtures() -> TestFixtures {
    let mut owner_bytes = [0x5au8; 29];
    owner_bytes[28] = 0x02;
    let mut other_bytes = [0xa5u8; 29];
    other_bytes[28] = 0x02;

    let tokens = vec![
        known_token(zkpf_token_balances::known_tokens::ICP_LEDGER)
            .expect("ICP ledger should be a known token"),
        known_token(zkpf_token_balances::known_tokens::CKBTC_LEDGER)
            .expect("ckBTC should be a known token"),
        TokenDescriptor::new(
            canister(0x0100),
            TokenStandard::LegacyFungible,
            8,
            "XTC",
        )
        .with_name("Cycles Token"),
        TokenDescriptor::new(canister(0x0200), TokenStandard::Extensible, 0, "EXT")
            .with_name("Sample EXT collection")
            .with_sub_token("ext-token-0001"),
    ];

    TestFixtures {
        owner: Principal::from_slice(&owner_bytes).expect("29 bytes is a valid principal"),
        other_owner: Principal::from_slice(&other_bytes).expect("29 bytes is a valid principal"),
        tokens,
    }
}

/// Canister principal with the given index (`index_be8 ‖ 0x01 0x01`).
pub fn canister(index: u64) -> Principal {
    let mut bytes = [0u8; 10];
    bytes[..8].copy_from_slice(&index.to_be_bytes());
    bytes[8] = 0x01;
    bytes[9] = 0x01;
    Principal::from_slice(&bytes).expect("10 bytes is a valid principal")
}

/// Install a test-writer subscriber filtered by `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}
