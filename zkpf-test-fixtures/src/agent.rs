//! Scripted query agent.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use zkpf_balance_tree::Principal;
use zkpf_token_balances::{BalanceError, QueryAgent};

/// One recorded query.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedQuery {
    pub canister: String,
    pub method: String,
    pub arg: Value,
}

#[derive(Clone, Debug)]
enum Scripted {
    Reply(Value),
    Fail(BalanceError),
}

/// [`QueryAgent`] answering from a per-canister script.
///
/// Canisters with no script fail with `BalanceError::Rejected`.
#[derive(Default)]
pub struct ScriptedQueryAgent {
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<RecordedQuery>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedQueryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every query to `canister` with `reply`.
    pub fn with_reply(self, canister: &Principal, reply: Value) -> Self {
        self.set_reply(canister, reply);
        self
    }

    /// Fail every query to `canister` with `error`.
    pub fn with_failure(self, canister: &Principal, error: BalanceError) -> Self {
        self.set_failure(canister, error);
        self
    }

    /// Hold each query for `latency` (tokio time) before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_reply(&self, canister: &Principal, reply: Value) {
        self.script
            .lock()
            .unwrap()
            .insert(canister.to_text(), Scripted::Reply(reply));
    }

    pub fn set_failure(&self, canister: &Principal, error: BalanceError) {
        self.script
            .lock()
            .unwrap()
            .insert(canister.to_text(), Scripted::Fail(error));
    }

    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, canister: &Principal) -> usize {
        let canister = canister.to_text();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.canister == canister)
            .count()
    }

    /// Highest number of queries observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryAgent for ScriptedQueryAgent {
    async fn query(
        &self,
        canister: &Principal,
        method: &str,
        arg: Value,
    ) -> Result<Value, BalanceError> {
        self.calls.lock().unwrap().push(RecordedQuery {
            canister: canister.to_text(),
            method: method.to_string(),
            arg,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().unwrap().get(&canister.to_text()).cloned();
        match scripted {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(BalanceError::Rejected {
                canister: canister.to_text(),
                method: method.to_string(),
                message: "canister not scripted".to_string(),
            }),
        }
    }
}

/// Ledger `account_balance` reply.
pub fn ledger_reply(e8s: u64) -> Value {
    json!({ "e8s": e8s })
}

/// ICRC-1 / DIP20 reply, as a decimal string so naturals above `u64` fit.
pub fn nat_reply(balance: u128) -> Value {
    Value::String(balance.to_string())
}

/// EXT `balance` success reply.
pub fn ext_ok_reply(balance: u64) -> Value {
    json!({ "ok": balance })
}

/// EXT `balance` error reply.
pub fn ext_err_reply(reason: &str) -> Value {
    json!({ "err": { "InvalidToken": reason } })
}
