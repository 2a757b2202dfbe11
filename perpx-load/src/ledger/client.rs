use super::{with_retry, AccountInfo, BroadcastMode, BroadcastResponse, Ledger, TxStatus};
use crate::error::QueryError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use perpx_load_core::{Coin, QUERY_TIMEOUT};
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr};
use tracing::{debug, instrument};

/// HTTP client of a node's REST (LCD) gateway.
///
/// Reads are retried on transient failures. Broadcasts are sent exactly once.
#[derive(Clone, Debug)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl LedgerClient {
    pub fn new(rest_url: &str) -> Result<Self, QueryError> {
        let base_url = rest_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .map_err(|source| QueryError::Transport {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, QueryError> {
        let url = &format!("{}{}", self.base_url, path);
        with_retry(path, || async move {
            debug!("GET {url}");
            let res = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|source| QueryError::Transport {
                    url: url.clone(),
                    source,
                })?;
            decode(url, res).await
        })
        .await
    }
}

async fn decode<T: DeserializeOwned>(url: &str, res: Response) -> Result<T, QueryError> {
    let status = res.status();
    if status == StatusCode::NOT_FOUND {
        return Err(QueryError::NotFound {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(QueryError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let bytes = res.bytes().await.map_err(|source| QueryError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| QueryError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
struct BalancesResponse {
    balances: Vec<Coin>,
}

#[derive(Deserialize)]
struct AccountResponse {
    account: Value,
}

#[derive(Deserialize)]
struct TxResponseEnvelope {
    tx_response: TxResponse,
}

#[serde_as]
#[derive(Deserialize)]
struct TxResponse {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    height: u64,
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

#[derive(Serialize)]
struct BroadcastRequest {
    tx_bytes: String,
    mode: BroadcastMode,
}

/// Plain accounts carry the fields at the top level. Vesting accounts nest them.
fn base_account(account: &Value) -> Option<&Value> {
    if account.get("account_number").is_some() {
        return Some(account);
    }
    ["base_account", "base_vesting_account"]
        .iter()
        .find_map(|key| account.get(key))
        .and_then(base_account)
}

/// uint64 fields are JSON strings; absent means zero.
fn uint_field(account: &Value, key: &str) -> Option<u64> {
    match account.get(key) {
        None | Some(Value::Null) => Some(0),
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        Some(_) => None,
    }
}

fn parse_account(url: &str, account: &Value) -> Result<AccountInfo, QueryError> {
    let decode_error = |reason: &str| QueryError::Decode {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let base = base_account(account).ok_or_else(|| decode_error("no base account"))?;

    Ok(AccountInfo {
        account_number: uint_field(base, "account_number")
            .ok_or_else(|| decode_error("invalid account_number"))?,
        sequence: uint_field(base, "sequence").ok_or_else(|| decode_error("invalid sequence"))?,
    })
}

impl Ledger for LedgerClient {
    #[instrument(skip(self), level = "debug")]
    async fn balances(&self, address: &str) -> Result<Vec<Coin>, QueryError> {
        let res: BalancesResponse = self
            .get_json(&format!("/cosmos/bank/v1beta1/balances/{address}"))
            .await?;
        Ok(res.balances)
    }

    #[instrument(skip(self), level = "debug")]
    async fn account(&self, address: &str) -> Result<AccountInfo, QueryError> {
        let path = format!("/cosmos/auth/v1beta1/accounts/{address}");
        let res: AccountResponse = self.get_json(&path).await?;
        parse_account(&format!("{}{path}", self.base_url), &res.account)
    }

    #[instrument(skip(self), level = "debug")]
    async fn tx_status(&self, hash: &str) -> Result<TxStatus, QueryError> {
        let res: TxResponseEnvelope = self
            .get_json(&format!("/cosmos/tx/v1beta1/txs/{hash}"))
            .await?;
        Ok(TxStatus {
            height: res.tx_response.height,
            code: res.tx_response.code,
            log: res.tx_response.raw_log,
        })
    }

    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        mode: BroadcastMode,
    ) -> Result<BroadcastResponse, QueryError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        let body = BroadcastRequest {
            tx_bytes: STANDARD.encode(tx_bytes),
            mode,
        };

        let res = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| QueryError::Transport {
                url: url.clone(),
                source,
            })?;
        let res: TxResponseEnvelope = decode(&url, res).await?;

        Ok(BroadcastResponse {
            hash: res.tx_response.txhash,
            code: res.tx_response.code,
            log: res.tx_response.raw_log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_account() {
        let account = json!({
            "@type": "/cosmos.auth.v1beta1.BaseAccount",
            "address": "perpx1w508d6qejxtdg4y5r3zarvary0c5xw7knvnrya",
            "account_number": "12",
            "sequence": "4"
        });
        assert_eq!(
            parse_account("url", &account).unwrap(),
            AccountInfo {
                account_number: 12,
                sequence: 4
            }
        );
    }

    #[test]
    fn vesting_account() {
        let account = json!({
            "@type": "/cosmos.vesting.v1beta1.ContinuousVestingAccount",
            "base_vesting_account": {
                "base_account": { "account_number": "3", "sequence": "0" }
            }
        });
        assert_eq!(parse_account("url", &account).unwrap().account_number, 3);
    }

    #[test]
    fn fresh_account_without_sequence() {
        let account = json!({ "account_number": "9" });
        assert_eq!(parse_account("url", &account).unwrap().sequence, 0);
    }

    #[test]
    fn garbage_account() {
        let account = json!({ "account_number": "nine" });
        assert!(matches!(
            parse_account("url", &account),
            Err(QueryError::Decode { .. })
        ));
        assert!(parse_account("url", &json!({ "name": "module" })).is_err());
    }

    #[test]
    fn tx_response_fields() {
        let res: TxResponseEnvelope = serde_json::from_value(json!({
            "tx_response": { "height": "17", "txhash": "AB", "code": 5, "raw_log": "insufficient funds" }
        }))
        .unwrap();
        assert_eq!(res.tx_response.height, 17);
        assert_eq!(res.tx_response.code, 5);
        assert_eq!(res.tx_response.raw_log, "insufficient funds");
    }

    #[test]
    fn broadcast_body() {
        let body = BroadcastRequest {
            tx_bytes: STANDARD.encode([1u8, 2, 3]),
            mode: BroadcastMode::Sync,
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "tx_bytes": "AQID", "mode": "BROADCAST_MODE_SYNC" })
        );
    }
}
