//! Scriptable in-memory ledger shared by the unit tests.
use crate::error::QueryError;
use crate::ledger::{AccountInfo, BroadcastMode, BroadcastResponse, Ledger, TxStatus};
use crate::tx::proto::{AuthInfo, MsgSend, TxBody, TxRaw};
use perpx_load_core::Coin;
use prost::Message;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) const DENOM: &str = "aperpx";

/// A decoded broadcast.
#[derive(Clone, Debug)]
pub(crate) struct Broadcast {
    pub hash: String,
    pub sends: Vec<MsgSend>,
    pub auth_info: AuthInfo,
}

impl Broadcast {
    pub fn gas_limit(&self) -> u64 {
        self.auth_info.fee.as_ref().map_or(0, |f| f.gas_limit)
    }

    pub fn fee(&self) -> u128 {
        self.auth_info
            .fee
            .as_ref()
            .and_then(|f| f.amount.first())
            .and_then(|c| c.amount.parse().ok())
            .unwrap_or(0)
    }

    pub fn sequence(&self) -> u64 {
        self.auth_info.signer_infos[0].sequence
    }
}

#[derive(Default)]
struct State {
    balances: HashMap<String, u128>,
    accounts: HashMap<String, AccountInfo>,
    txs: HashMap<String, TxStatus>,
    broadcasts: Vec<Broadcast>,
    height: u64,
    failing_balances: HashSet<String>,
}

/// Applies transfers immediately unless told otherwise.
#[derive(Clone, Default)]
pub(crate) struct MockLedger {
    state: Arc<Mutex<State>>,
    pub never_include: bool,
    pub on_chain_code: u32,
    pub reject_code: u32,
    /// Answer broadcasts with this HTTP status instead of a response body.
    pub refuse_status: Option<u16>,
    /// Fired on every broadcast, after the broadcast is recorded.
    pub cancel_on_broadcast: Option<CancellationToken>,
    pub account_delay: Option<Duration>,
    account_queries: Arc<AtomicUsize>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, address: &str, amount: u128) {
        let mut state = self.state.lock().unwrap();
        *state.balances.entry(address.to_string()).or_default() += amount;
        let next = state.accounts.len() as u64;
        state
            .accounts
            .entry(address.to_string())
            .or_insert(AccountInfo {
                account_number: next,
                sequence: 0,
            });
    }

    pub fn set_account(&self, address: &str, info: AccountInfo) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(address.to_string(), info);
    }

    pub fn fail_balance_queries(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_balances
            .insert(address.to_string());
    }

    pub fn balance(&self, address: &str) -> u128 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn account_queries(&self) -> usize {
        self.account_queries.load(Ordering::SeqCst)
    }

    fn apply(&self, hash: &str, broadcast: &Broadcast) {
        let mut state = self.state.lock().unwrap();
        state.height += 1;
        let height = state.height;

        if self.on_chain_code == 0 {
            for send in &broadcast.sends {
                let amount: u128 = send.amount[0].amount.parse().unwrap();
                *state.balances.entry(send.from_address.clone()).or_default() -= amount;
                *state.balances.entry(send.to_address.clone()).or_default() += amount;
                let next = state.accounts.len() as u64;
                state
                    .accounts
                    .entry(send.to_address.clone())
                    .or_insert(AccountInfo {
                        account_number: next,
                        sequence: 0,
                    });
            }
            if let Some(from) = broadcast.sends.first().map(|s| s.from_address.clone()) {
                *state.balances.entry(from.clone()).or_default() -= broadcast.fee();
                if let Some(account) = state.accounts.get_mut(&from) {
                    account.sequence += 1;
                }
            }
        }

        state.txs.insert(
            hash.to_string(),
            TxStatus {
                height,
                code: self.on_chain_code,
                log: if self.on_chain_code == 0 {
                    String::new()
                } else {
                    "insufficient fee".to_string()
                },
            },
        );
    }
}

fn not_found(what: &str) -> QueryError {
    QueryError::NotFound {
        url: format!("mock://{what}"),
    }
}

impl Ledger for MockLedger {
    async fn balances(&self, address: &str) -> Result<Vec<Coin>, QueryError> {
        let state = self.state.lock().unwrap();
        if state.failing_balances.contains(address) {
            return Err(QueryError::Status {
                url: format!("mock://balances/{address}"),
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(state
            .balances
            .get(address)
            .map(|amount| vec![Coin::new(*amount, DENOM)])
            .unwrap_or_default())
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, QueryError> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.account_delay {
            tokio::time::sleep(delay).await;
        }
        let info = self.state.lock().unwrap().accounts.get(address).copied();
        info.ok_or_else(|| not_found(address))
    }

    async fn tx_status(&self, hash: &str) -> Result<TxStatus, QueryError> {
        let status = self.state.lock().unwrap().txs.get(hash).cloned();
        status.ok_or_else(|| not_found(hash))
    }

    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        _mode: BroadcastMode,
    ) -> Result<BroadcastResponse, QueryError> {
        let hash = hex::encode_upper(Sha256::digest(tx_bytes));
        let raw = TxRaw::decode(tx_bytes).unwrap();
        let body = TxBody::decode(raw.body_bytes.as_slice()).unwrap();
        let broadcast = Broadcast {
            hash: hash.clone(),
            sends: body
                .messages
                .iter()
                .map(|any| MsgSend::decode(any.value.as_slice()).unwrap())
                .collect(),
            auth_info: AuthInfo::decode(raw.auth_info_bytes.as_slice()).unwrap(),
        };

        self.state
            .lock()
            .unwrap()
            .broadcasts
            .push(broadcast.clone());
        if let Some(cancel) = &self.cancel_on_broadcast {
            cancel.cancel();
        }

        if let Some(status) = self.refuse_status {
            return Err(QueryError::Status {
                url: "mock://txs".into(),
                status,
                body: "invalid tx bytes".into(),
            });
        }
        if self.reject_code != 0 {
            return Ok(BroadcastResponse {
                hash,
                code: self.reject_code,
                log: "account sequence mismatch".into(),
            });
        }
        if !self.never_include {
            self.apply(&hash, &broadcast);
        }
        Ok(BroadcastResponse {
            hash,
            code: 0,
            log: String::new(),
        })
    }
}
