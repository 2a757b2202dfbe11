//! In-memory PerpX node serving the REST routes the load generator talks to.
//!
//! Transactions are decoded and checked for real: the signature over the sign doc, the signer's
//! sequence, fees and balances. Accepted transactions are included at the next height
//! immediately, unless the ledger is told never to include anything.
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use perpx_load_core::ChainConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

mod state;

pub use state::{
    Account, LedgerState, TxResult, CODE_INSUFFICIENT_FEE, CODE_INSUFFICIENT_FUNDS,
    CODE_TX_DECODE, CODE_UNAUTHORIZED, CODE_UNKNOWN_ADDRESS, CODE_WRONG_SEQUENCE,
};

#[derive(Clone, Debug)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl MockLedger {
    pub fn new(chain: ChainConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::new(chain))),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credits `amount` of the chain denom, creating the account if needed.
    pub fn fund(&self, address: &str, amount: u128) {
        let mut state = self.state();
        let denom = state.chain().denom.clone();
        *state
            .account_mut(address)
            .balances
            .entry(denom)
            .or_default() += amount;
    }

    pub fn balance(&self, address: &str) -> u128 {
        let state = self.state();
        state.balance(address, &state.chain().denom)
    }

    pub fn account(&self, address: &str) -> Option<Account> {
        self.state().accounts.get(address).cloned()
    }

    /// Accept transactions without ever including them.
    pub fn set_never_include(&self, never: bool) {
        self.state().never_include = never;
    }

    /// Broadcast requests received, accepted or not.
    pub fn broadcasts(&self) -> u64 {
        self.state().broadcasts
    }

    /// Transactions included so far.
    pub fn included(&self) -> usize {
        self.state().txs.len()
    }

    pub fn height(&self) -> u64 {
        self.state().height
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/cosmos/bank/v1beta1/balances/:address", get(balances))
            .route("/cosmos/auth/v1beta1/accounts/:address", get(account))
            .route("/cosmos/tx/v1beta1/txs/:hash", get(tx))
            .route("/cosmos/tx/v1beta1/txs", post(broadcast))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }

    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Mock ledger listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serves on an ephemeral local port in the background and returns its base URL.
    pub async fn spawn(&self) -> std::io::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let ledger = self.clone();
        tokio::spawn(async move {
            if let Err(err) = ledger.serve(listener).await {
                tracing::error!("Mock ledger stopped: {err}");
            }
        });
        Ok(format!("http://{addr}"))
    }
}

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "code": 5, "message": message, "details": [] })),
    )
        .into_response()
}

fn tx_response(result: &TxResult) -> Value {
    json!({
        "tx_response": {
            "height": result.height.to_string(),
            "txhash": result.hash,
            "code": result.code,
            "raw_log": result.log,
        }
    })
}

async fn balances(State(ledger): State<MockLedger>, Path(address): Path<String>) -> Json<Value> {
    let state = ledger.state();
    let balances = state
        .accounts
        .get(&address)
        .map(|a| {
            a.balances
                .iter()
                .filter(|(_, amount)| **amount > 0)
                .map(|(denom, amount)| json!({ "denom": denom, "amount": amount.to_string() }))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let total = balances.len().to_string();
    Json(json!({ "balances": balances, "pagination": { "next_key": null, "total": total } }))
}

async fn account(State(ledger): State<MockLedger>, Path(address): Path<String>) -> Response {
    let state = ledger.state();
    let Some(account) = state.accounts.get(&address) else {
        return not_found(format!("account {address} not found"));
    };
    Json(json!({
        "account": {
            "@type": "/cosmos.auth.v1beta1.BaseAccount",
            "address": address,
            "pub_key": null,
            "account_number": account.account_number.to_string(),
            "sequence": account.sequence.to_string(),
        }
    }))
    .into_response()
}

async fn tx(State(ledger): State<MockLedger>, Path(hash): Path<String>) -> Response {
    let state = ledger.state();
    match state.txs.get(&hash.to_uppercase()) {
        Some(result) => Json(tx_response(result)).into_response(),
        None => not_found(format!("tx not found: {hash}")),
    }
}

#[derive(Deserialize)]
struct BroadcastRequest {
    tx_bytes: String,
    #[serde(default)]
    mode: String,
}

async fn broadcast(
    State(ledger): State<MockLedger>,
    Json(req): Json<BroadcastRequest>,
) -> Response {
    let Ok(tx_bytes) = STANDARD.decode(&req.tx_bytes) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 3, "message": "tx_bytes is not valid base64", "details": [] })),
        )
            .into_response();
    };
    debug!(mode = %req.mode, size = tx_bytes.len(), "Broadcast");
    let result = ledger.state().broadcast(&tx_bytes);
    Json(tx_response(&result)).into_response()
}
