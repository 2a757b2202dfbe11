//! Deterministic worker keys and chain addresses.
//!
//! Worker keys are derived from public seed strings. They are reproducible across runs and
//! processes, which is what load testing needs, and offer no secrecy at all.
use crate::error::{ConfigError, SigningError};
use bech32::{FromBase32, ToBase32, Variant};
use bip32::{DerivationPath, Language, Mnemonic, XPrv};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use perpx_load_core::{SeedCredential, HD_PATH};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;

/// A bech32 account address, e.g. `perpx1w508d6qejxtdg4y5r3zarvary0c5xw7knvnrya`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Encodes `ripemd160(sha256(pubkey))` of a compressed secp256k1 public key.
    pub fn from_public_key(public_key: &[u8], prefix: &str) -> Result<Self, ConfigError> {
        let hash = Ripemd160::digest(Sha256::digest(public_key));
        bech32::encode(prefix, hash.to_base32(), Variant::Bech32)
            .map(Self)
            .map_err(|e| ConfigError::Invalid(format!("address prefix {prefix:?}: {e}")))
    }

    /// Checks the checksum, the human readable part and the payload length of `address`.
    pub fn parse(field: &'static str, address: &str, prefix: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidAddress {
            field,
            address: address.to_string(),
            reason,
        };

        if address.trim().is_empty() {
            return Err(ConfigError::Empty { field });
        }
        let (hrp, data, variant) = bech32::decode(address).map_err(|e| invalid(e.to_string()))?;
        if hrp != prefix {
            return Err(invalid(format!("expected prefix {prefix:?}, found {hrp:?}")));
        }
        if variant != Variant::Bech32 {
            return Err(invalid("bech32m is not used for account addresses".to_string()));
        }
        let bytes = Vec::<u8>::from_base32(&data).map_err(|e| invalid(e.to_string()))?;
        if bytes.len() != 20 && bytes.len() != 32 {
            return Err(invalid(format!("unexpected payload length {}", bytes.len())));
        }

        Ok(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A secp256k1 key together with everything derived from it.
#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
    public_key: Vec<u8>,
    address: Address,
}

impl SigningIdentity {
    pub fn from_secret(secret: &[u8], prefix: &str) -> Result<Self, ConfigError> {
        let key = SigningKey::from_slice(secret)
            .map_err(|_| ConfigError::InvalidPrivateKey("not a valid secp256k1 scalar".into()))?;
        let public_key = key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let address = Address::from_public_key(&public_key, prefix)?;

        Ok(Self {
            key,
            public_key,
            address,
        })
    }

    /// Hex encoded 32 byte scalar, with or without a `0x` prefix.
    pub fn from_private_key_hex(hex_key: &str, prefix: &str) -> Result<Self, ConfigError> {
        let hex_key = hex_key.trim();
        let hex_key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = hex::decode(hex_key)
            .map_err(|e| ConfigError::InvalidPrivateKey(format!("not hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(ConfigError::InvalidPrivateKey(format!(
                "expected 32 bytes, found {}",
                bytes.len()
            )));
        }
        Self::from_secret(&bytes, prefix)
    }

    /// BIP-39 phrase, derived along the standard Cosmos path.
    pub fn from_mnemonic(phrase: &str, prefix: &str) -> Result<Self, ConfigError> {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mnemonic = Mnemonic::new(normalized, Language::English)
            .map_err(|e| ConfigError::InvalidMnemonic(e.to_string()))?;
        let path: DerivationPath = HD_PATH
            .parse()
            .map_err(|e: bip32::Error| ConfigError::InvalidMnemonic(e.to_string()))?;
        let xprv = XPrv::derive_from_path(mnemonic.to_seed("").as_bytes(), &path)
            .map_err(|e| ConfigError::InvalidMnemonic(e.to_string()))?;

        Self::from_secret(&xprv.to_bytes(), prefix)
    }

    pub fn from_credential(credential: &SeedCredential, prefix: &str) -> Result<Self, ConfigError> {
        match credential {
            SeedCredential::PrivateKey(key) => Self::from_private_key_hex(key, prefix),
            SeedCredential::Mnemonic(phrase) => Self::from_mnemonic(phrase, prefix),
        }
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// ECDSA over SHA-256 of `payload`, returned in compact low-S `r || s` form.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        let signature: Signature = self
            .key
            .try_sign(payload)
            .map_err(|e| SigningError::Signature(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key", &"[REDACTED]")
            .field("address", &self.address)
            .finish()
    }
}

/// The 32 byte secret of worker `index`.
///
/// `sha256(sha256(template(index)) || low_byte(index))`.
pub fn worker_secret(index: u32) -> [u8; 32] {
    let seed = Sha256::digest(format!(
        "bench worker {index} seed phrase for load testing account"
    ));
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update([index as u8]);
    hasher.finalize().into()
}

/// Maps worker indices to their keys and addresses.
#[derive(Clone, Debug)]
pub struct AccountDeriver {
    prefix: String,
}

impl AccountDeriver {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn derive(&self, index: u32) -> Result<SigningIdentity, ConfigError> {
        SigningIdentity::from_secret(&worker_secret(index), &self.prefix)
    }

    pub fn address(&self, index: u32) -> Result<Address, ConfigError> {
        Ok(self.derive(index)?.address)
    }
}
