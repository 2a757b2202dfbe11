//! Building and signing bank-send transactions.
pub mod proto;

use crate::accounts::{Address, SigningIdentity};
use crate::error::{ConfigError, SigningError};
use perpx_load_core::{validate_denom, ChainConfig, Coin};
use prost::Message;
use proto::{
    Any, AuthInfo, Fee, ModeInfo, MsgSend, PubKey, SignDoc, SignerInfo, TxBody, TxRaw,
    MSG_SEND_TYPE_URL, SECP256K1_PUBKEY_TYPE_URL,
};
use sha2::{Digest, Sha256};

/// A single `MsgSend` of one coin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub amount: Coin,
}

impl Transfer {
    pub fn new(from: Address, to: Address, amount: Coin) -> Self {
        Self { from, to, amount }
    }

    fn to_any(&self) -> Any {
        Any::pack(
            MSG_SEND_TYPE_URL,
            &MsgSend {
                from_address: self.from.to_string(),
                to_address: self.to.to_string(),
                amount: vec![(&self.amount).into()],
            },
        )
    }
}

/// Account state a transaction is signed against.
#[derive(Clone, Copy, Debug)]
pub struct Signer<'a> {
    pub identity: &'a SigningIdentity,
    pub account_number: u64,
    pub sequence: u64,
}

/// An immutable, fully signed transaction.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    messages: Vec<Transfer>,
    gas_limit: u64,
    fee: Coin,
    account_number: u64,
    sequence: u64,
    signature: Vec<u8>,
    bytes: Vec<u8>,
}

impl SignedTransaction {
    pub fn messages(&self) -> &[Transfer] {
        &self.messages
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn fee(&self) -> &Coin {
        &self.fee
    }

    pub fn account_number(&self) -> u64 {
        self.account_number
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Encoded `TxRaw`, ready for broadcast.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Upper-case hex SHA-256 of the encoded bytes, the hash the node indexes the transaction by.
    pub fn hash(&self) -> String {
        hex::encode_upper(Sha256::digest(&self.bytes))
    }
}

/// Signs transactions for one chain in `SIGN_MODE_DIRECT`.
///
/// The chain id and fee denom are checked once here, so signing never fails on configuration.
#[derive(Clone, Debug)]
pub struct TxSigner {
    chain: ChainConfig,
}

impl TxSigner {
    pub fn new(chain: &ChainConfig) -> Result<Self, ConfigError> {
        if chain.chain_id.trim().is_empty() {
            return Err(ConfigError::Empty { field: "chain id" });
        }
        validate_denom(&chain.denom)?;
        Ok(Self {
            chain: chain.clone(),
        })
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn sign(
        &self,
        signer: Signer<'_>,
        messages: Vec<Transfer>,
        gas_limit: u64,
    ) -> Result<SignedTransaction, SigningError> {
        let fee = self.chain.fee_for(gas_limit);

        let body = TxBody {
            messages: messages.iter().map(Transfer::to_any).collect(),
            memo: String::new(),
            timeout_height: 0,
        };
        let auth_info = AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: Some(Any::pack(
                    SECP256K1_PUBKEY_TYPE_URL,
                    &PubKey {
                        key: signer.identity.public_key().to_vec(),
                    },
                )),
                mode_info: Some(ModeInfo::direct()),
                sequence: signer.sequence,
            }],
            fee: Some(Fee {
                amount: vec![(&fee).into()],
                gas_limit,
                payer: String::new(),
                granter: String::new(),
            }),
        };

        // Phase one: the signer info is complete, the signature slot is still empty.
        let mut raw = TxRaw {
            body_bytes: encode(&body)?,
            auth_info_bytes: encode(&auth_info)?,
            signatures: vec![Vec::new()],
        };

        // Phase two: sign body and signer info, then fill the slot.
        let sign_doc = SignDoc {
            body_bytes: raw.body_bytes.clone(),
            auth_info_bytes: raw.auth_info_bytes.clone(),
            chain_id: self.chain.chain_id.clone(),
            account_number: signer.account_number,
        };
        let signature = signer.identity.sign(&encode(&sign_doc)?)?;
        raw.signatures[0] = signature.clone();

        Ok(SignedTransaction {
            messages,
            gas_limit,
            fee,
            account_number: signer.account_number,
            sequence: signer.sequence,
            signature,
            bytes: encode(&raw)?,
        })
    }
}

fn encode<M: Message>(message: &M) -> Result<Vec<u8>, SigningError> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;
    Ok(buf)
}
