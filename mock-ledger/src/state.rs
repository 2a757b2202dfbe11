use k256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use perpx_load::tx::proto::{
    AuthInfo, MsgSend, PubKey, SignDoc, TxBody, TxRaw, MSG_SEND_TYPE_URL,
    SECP256K1_PUBKEY_TYPE_URL,
};
use perpx_load::Address;
use perpx_load_core::ChainConfig;
use prost::Message;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const CODE_TX_DECODE: u32 = 2;
pub const CODE_UNAUTHORIZED: u32 = 4;
pub const CODE_INSUFFICIENT_FUNDS: u32 = 5;
pub const CODE_UNKNOWN_ADDRESS: u32 = 9;
pub const CODE_INSUFFICIENT_FEE: u32 = 13;
pub const CODE_WRONG_SEQUENCE: u32 = 32;

#[derive(Clone, Debug, Default)]
pub struct Account {
    pub account_number: u64,
    pub sequence: u64,
    pub balances: BTreeMap<String, u128>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResult {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub log: String,
}

#[derive(Debug)]
struct Rejection {
    code: u32,
    log: String,
}

impl Rejection {
    fn new(code: u32, log: impl Into<String>) -> Self {
        Self {
            code,
            log: log.into(),
        }
    }
}

/// A transaction that passed every check and can be applied as is.
#[derive(Debug)]
struct CheckedTx {
    signer: String,
    sends: Vec<(String, String, u128)>,
    debits: BTreeMap<String, u128>,
}

#[derive(Debug)]
pub struct LedgerState {
    chain: ChainConfig,
    pub height: u64,
    next_account_number: u64,
    pub accounts: HashMap<String, Account>,
    pub txs: HashMap<String, TxResult>,
    pub broadcasts: u64,
    pub never_include: bool,
}

impl LedgerState {
    pub fn new(chain: ChainConfig) -> Self {
        Self {
            chain,
            height: 1,
            next_account_number: 0,
            accounts: HashMap::new(),
            txs: HashMap::new(),
            broadcasts: 0,
            never_include: false,
        }
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn account_mut(&mut self, address: &str) -> &mut Account {
        let next = &mut self.next_account_number;
        self.accounts.entry(address.to_string()).or_insert_with(|| {
            let account = Account {
                account_number: *next,
                ..Account::default()
            };
            *next += 1;
            account
        })
    }

    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.accounts
            .get(address)
            .and_then(|a| a.balances.get(denom))
            .copied()
            .unwrap_or_default()
    }

    /// Checks a transaction the way a node's ante handler does and, when it passes, includes it
    /// at the next height. The returned height is 0 for anything not included.
    pub fn broadcast(&mut self, tx_bytes: &[u8]) -> TxResult {
        self.broadcasts += 1;
        let hash = hex::encode_upper(Sha256::digest(tx_bytes));

        let checked = match self.check(tx_bytes) {
            Ok(checked) => checked,
            Err(rejection) => {
                debug!(%hash, code = rejection.code, "Rejected: {}", rejection.log);
                return TxResult {
                    hash,
                    height: 0,
                    code: rejection.code,
                    log: rejection.log,
                };
            }
        };

        if !self.never_include {
            self.apply(checked);
            self.height += 1;
            let result = TxResult {
                hash: hash.clone(),
                height: self.height,
                code: 0,
                log: String::new(),
            };
            self.txs.insert(hash.clone(), result);
            debug!(%hash, height = self.height, "Included");
        }

        TxResult {
            hash,
            height: 0,
            code: 0,
            log: String::new(),
        }
    }

    fn check(&self, tx_bytes: &[u8]) -> Result<CheckedTx, Rejection> {
        let decode_error = |e: prost::DecodeError| Rejection::new(CODE_TX_DECODE, e.to_string());
        let raw = TxRaw::decode(tx_bytes).map_err(decode_error)?;
        let body = TxBody::decode(raw.body_bytes.as_slice()).map_err(decode_error)?;
        let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice()).map_err(decode_error)?;

        let ([signer_info], [signature]) = (&auth_info.signer_infos[..], &raw.signatures[..])
        else {
            return Err(Rejection::new(
                CODE_UNAUTHORIZED,
                "expected exactly one signer and one signature",
            ));
        };

        let public_key = match &signer_info.public_key {
            Some(any) if any.type_url == SECP256K1_PUBKEY_TYPE_URL => {
                PubKey::decode(any.value.as_slice()).map_err(decode_error)?.key
            }
            _ => {
                return Err(Rejection::new(
                    CODE_UNAUTHORIZED,
                    "missing secp256k1 public key",
                ))
            }
        };
        let signer = Address::from_public_key(&public_key, &self.chain.address_prefix)
            .map_err(|e| Rejection::new(CODE_UNAUTHORIZED, e.to_string()))?
            .to_string();

        let account = self.accounts.get(&signer).ok_or_else(|| {
            Rejection::new(CODE_UNKNOWN_ADDRESS, format!("account {signer} not found"))
        })?;
        if signer_info.sequence != account.sequence {
            return Err(Rejection::new(
                CODE_WRONG_SEQUENCE,
                format!(
                    "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                    account.sequence, signer_info.sequence
                ),
            ));
        }

        let sign_doc = SignDoc {
            body_bytes: raw.body_bytes.clone(),
            auth_info_bytes: raw.auth_info_bytes.clone(),
            chain_id: self.chain.chain_id.clone(),
            account_number: account.account_number,
        };
        let verified = VerifyingKey::from_sec1_bytes(&public_key)
            .ok()
            .zip(Signature::from_slice(signature).ok())
            .is_some_and(|(key, sig)| key.verify(&sign_doc.encode_to_vec(), &sig).is_ok());
        if !verified {
            return Err(Rejection::new(
                CODE_UNAUTHORIZED,
                format!(
                    "signature verification failed; please verify account number ({}) and chain-id ({})",
                    account.account_number, self.chain.chain_id
                ),
            ));
        }

        let mut debits = BTreeMap::new();
        let fee = auth_info.fee.unwrap_or_default();
        let required_fee = u128::from(fee.gas_limit).saturating_mul(self.chain.min_gas_price);
        let mut paid_fee = 0;
        for coin in &fee.amount {
            let amount = parse_amount(&coin.amount)?;
            if coin.denom == self.chain.denom {
                paid_fee += amount;
            }
            *debits.entry(coin.denom.clone()).or_default() += amount;
        }
        if paid_fee < required_fee {
            return Err(Rejection::new(
                CODE_INSUFFICIENT_FEE,
                format!(
                    "insufficient fees; got: {paid_fee}{denom} required: {required_fee}{denom}",
                    denom = self.chain.denom
                ),
            ));
        }

        let mut sends = Vec::new();
        for any in &body.messages {
            if any.type_url != MSG_SEND_TYPE_URL {
                return Err(Rejection::new(
                    CODE_TX_DECODE,
                    format!("unsupported message {}", any.type_url),
                ));
            }
            let send = MsgSend::decode(any.value.as_slice()).map_err(decode_error)?;
            if send.from_address != signer {
                return Err(Rejection::new(
                    CODE_UNAUTHORIZED,
                    format!("{} is not the signer of this transaction", send.from_address),
                ));
            }
            for coin in send.amount {
                let amount = parse_amount(&coin.amount)?;
                *debits.entry(coin.denom.clone()).or_default() += amount;
                sends.push((send.to_address.clone(), coin.denom, amount));
            }
        }

        for (denom, needed) in &debits {
            let available = account.balances.get(denom).copied().unwrap_or_default();
            if available < *needed {
                return Err(Rejection::new(
                    CODE_INSUFFICIENT_FUNDS,
                    format!("insufficient funds: {available}{denom} is smaller than {needed}{denom}"),
                ));
            }
        }

        Ok(CheckedTx {
            signer,
            sends,
            debits,
        })
    }

    fn apply(&mut self, tx: CheckedTx) {
        let signer = self.account_mut(&tx.signer);
        signer.sequence += 1;
        for (denom, amount) in tx.debits {
            *signer.balances.entry(denom).or_default() -= amount;
        }
        for (to, denom, amount) in tx.sends {
            *self.account_mut(&to).balances.entry(denom).or_default() += amount;
        }
    }
}

fn parse_amount(amount: &str) -> Result<u128, Rejection> {
    amount
        .parse()
        .map_err(|_| Rejection::new(CODE_TX_DECODE, format!("invalid amount {amount:?}")))
}
