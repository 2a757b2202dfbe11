use crate::{
    validate_denom, Coin, ConfigError, CONFIRMATION_POLL_INTERVAL, CONFIRMATION_TIMEOUT,
    DEFAULT_ADDRESS_PREFIX, DEFAULT_BATCH_SIZE, DEFAULT_CHAIN_ID, DEFAULT_DENOM,
    DEFAULT_MIN_GAS_PRICE, DEFAULT_REST_URL, DEFAULT_SINK_ADDRESS, DEFAULT_WORKERS,
    DEV_SEED_KEY_NAME, DEV_SEED_MNEMONIC, FUNDING_GAS_PER_MESSAGE, TRANSFER_AMOUNT,
    TRANSFER_GAS_LIMIT,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

/// Chain parameters every signed transaction depends on.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: String,
    pub denom: String,
    pub address_prefix: String,
    #[serde_as(as = "DisplayFromStr")]
    pub min_gas_price: u128,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            denom: DEFAULT_DENOM.to_string(),
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            min_gas_price: DEFAULT_MIN_GAS_PRICE,
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::Empty { field: "chain id" });
        }
        validate_denom(&self.denom)?;
        if self.address_prefix.is_empty() {
            return Err(ConfigError::Empty {
                field: "address prefix",
            });
        }
        if !self
            .address_prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(format!(
                "address prefix {:?} must be lower-case alphanumeric",
                self.address_prefix
            )));
        }
        Ok(())
    }

    /// Fee owed for `gas_limit` at the configured minimum gas price.
    pub fn fee_for(&self, gas_limit: u64) -> Coin {
        Coin::new(
            u128::from(gas_limit).saturating_mul(self.min_gas_price),
            &self.denom,
        )
    }
}

/// Where the funding account's signing key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum SeedCredential {
    /// Hex-encoded 32 byte secp256k1 scalar, optionally `0x` prefixed.
    PrivateKey(String),
    /// BIP-39 phrase, derived along [`crate::HD_PATH`].
    Mnemonic(String),
}

impl SeedCredential {
    /// Applies operator precedence: an explicit private key always wins over the seed key. The
    /// seed key may be a mnemonic or the `alice` development alias; anything else is rejected.
    pub fn resolve(private_key: Option<&str>, seed_key: &str) -> Result<Self, ConfigError> {
        if let Some(key) = private_key.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(Self::PrivateKey(key.to_string()));
        }

        let seed_key = seed_key.trim();
        if seed_key == DEV_SEED_KEY_NAME {
            Ok(Self::Mnemonic(DEV_SEED_MNEMONIC.to_string()))
        } else if seed_key.contains(char::is_whitespace) {
            Ok(Self::Mnemonic(seed_key.to_string()))
        } else if seed_key.is_empty() {
            Err(ConfigError::Empty { field: "seed key" })
        } else {
            Err(ConfigError::UnknownSeedKey(seed_key.to_string()))
        }
    }
}

impl fmt::Debug for SeedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey(_) => write!(f, "PrivateKey([REDACTED])"),
            Self::Mnemonic(_) => write!(f, "Mnemonic([REDACTED])"),
        }
    }
}

/// Bounded polling used while waiting for a transaction to land in a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: CONFIRMATION_POLL_INTERVAL,
            timeout: CONFIRMATION_TIMEOUT,
        }
    }
}

impl fmt::Display for ConfirmationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "every {} for up to {}",
            humantime::format_duration(self.poll_interval),
            humantime::format_duration(self.timeout)
        )
    }
}

/// Inputs of a single seeding run.
#[derive(Clone, Debug)]
pub struct SeedConfig {
    pub workers: u32,
    pub fund_amount: Coin,
    pub batch_size: usize,
    pub credential: SeedCredential,
    pub chain: ChainConfig,
    pub rest_url: String,
    pub gas_per_message: u64,
    pub confirmation: ConfirmationPolicy,
}

impl SeedConfig {
    pub fn new(credential: SeedCredential) -> Self {
        let chain = ChainConfig::default();
        Self {
            workers: DEFAULT_WORKERS,
            fund_amount: Coin::new(1_000_000, &chain.denom),
            batch_size: DEFAULT_BATCH_SIZE,
            credential,
            chain,
            rest_url: DEFAULT_REST_URL.to_string(),
            gas_per_message: FUNDING_GAS_PER_MESSAGE,
            confirmation: ConfirmationPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain.validate()?;
        if self.workers == 0 {
            return Err(ConfigError::Zero { field: "workers" });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero {
                field: "batch size",
            });
        }
        if self.fund_amount.amount == 0 {
            return Err(ConfigError::Zero {
                field: "fund amount",
            });
        }
        if self.fund_amount.denom != self.chain.denom {
            return Err(ConfigError::Invalid(format!(
                "fund amount denom {} does not match chain denom {}",
                self.fund_amount.denom, self.chain.denom
            )));
        }
        Ok(())
    }
}

/// Inputs of a load-test run and of every transaction source it creates.
#[derive(Clone, Debug)]
pub struct LoadConfig {
    /// Connections opened against every endpoint.
    pub connections: usize,
    pub duration: Option<Duration>,
    /// Total send attempts across all connections, accepted or not.
    pub count: Option<u64>,
    /// Transactions per second per connection.
    pub rate: NonZeroU32,
    pub endpoints: Vec<String>,
    pub sink_address: String,
    pub chain: ChainConfig,
    pub transfer_amount: u128,
    pub gas_limit: u64,
}

impl LoadConfig {
    pub fn new(endpoints: &[&str]) -> Self {
        Self {
            connections: 1,
            duration: Some(Duration::from_secs(60)),
            count: None,
            rate: NonZeroU32::new(1_000).unwrap_or(NonZeroU32::MIN),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            sink_address: DEFAULT_SINK_ADDRESS.to_string(),
            chain: ChainConfig::default(),
            transfer_amount: TRANSFER_AMOUNT,
            gas_limit: TRANSFER_GAS_LIMIT,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections == 0 {
            return Err(ConfigError::Zero {
                field: "connections",
            });
        }
        let timed = self.duration.is_some_and(|d| !d.is_zero());
        let counted = self.count.is_some_and(|c| c > 0);
        if !timed && !counted {
            return Err(ConfigError::Invalid(
                "either time or count must be > 0".to_string(),
            ));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::Empty { field: "endpoints" });
        }
        self.chain.validate()
    }
}
