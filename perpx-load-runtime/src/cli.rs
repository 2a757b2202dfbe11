use clap::{Args, Parser, Subcommand, ValueEnum};
use perpx_load::ledger::rest_url;
use perpx_load_core::{
    ChainConfig, Coin, ConfigError, LoadConfig, SeedConfig, SeedCredential, DEFAULT_ADDRESS_PREFIX,
    DEFAULT_BATCH_SIZE, DEFAULT_CHAIN_ID, DEFAULT_CLIENT_FACTORY, DEFAULT_DENOM, DEFAULT_ENDPOINT,
    DEFAULT_FUND_AMOUNT, DEFAULT_MIN_GAS_PRICE, DEFAULT_RPC, DEFAULT_SINK_ADDRESS,
    DEFAULT_WORKERS, DEV_SEED_KEY_NAME,
};
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "perpx-load", version, about = "Seed accounts and drive bank-send load against PerpX nodes.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fund the deterministic worker accounts from a seed account.
    Seed(SeedArgs),
    /// Send signed bank transfers from every worker account.
    Run(RunArgs),
}

/// Parameters every signed transaction depends on.
#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    #[arg(long, env = "LOADTEST_CHAIN_ID", default_value = DEFAULT_CHAIN_ID)]
    pub chain_id: String,

    #[arg(long, env = "LOADTEST_DENOM", default_value = DEFAULT_DENOM)]
    pub denom: String,

    /// Base denom units per unit of gas.
    #[arg(long, env = "LOADTEST_MIN_GAS_PRICE", default_value_t = DEFAULT_MIN_GAS_PRICE)]
    pub min_gas_price: u128,

    #[arg(long, env = "LOADTEST_ADDRESS_PREFIX", default_value = DEFAULT_ADDRESS_PREFIX)]
    pub address_prefix: String,
}

impl From<ChainArgs> for ChainConfig {
    fn from(args: ChainArgs) -> Self {
        Self {
            chain_id: args.chain_id,
            denom: args.denom,
            address_prefix: args.address_prefix,
            min_gas_price: args.min_gas_price,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// Number of worker accounts to fund.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: u32,

    /// Mnemonic of the funding account, or "alice" for the local-net validator.
    #[arg(short = 'k', long, env = "LOADTEST_SEED_KEY", default_value = DEV_SEED_KEY_NAME, hide_env_values = true)]
    pub seed_key: String,

    /// Hex private key of the funding account. Overrides --seed-key.
    #[arg(short = 'p', long, env = "LOADTEST_SEED_PRIVATE_KEY", hide_env_values = true)]
    pub seed_private_key: Option<String>,

    /// Node RPC endpoint; the REST endpoint is derived from it.
    #[arg(short, long, env = "LOADTEST_RPC", default_value = DEFAULT_RPC)]
    pub rpc: String,

    /// REST endpoint, when it cannot be derived from --rpc.
    #[arg(long, env = "LOADTEST_REST_URL")]
    pub rest_url: Option<String>,

    /// Minimum balance of every worker account, e.g. 1000000aperpx.
    #[arg(long, env = "LOADTEST_FUND_AMOUNT", default_value = DEFAULT_FUND_AMOUNT)]
    pub fund_amount: Coin,

    /// Transfers per funding transaction.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[command(flatten)]
    pub chain: ChainArgs,
}

impl SeedArgs {
    pub fn into_config(self) -> Result<SeedConfig, ConfigError> {
        let credential =
            SeedCredential::resolve(self.seed_private_key.as_deref(), &self.seed_key)?;
        let mut config = SeedConfig::new(credential);
        config.workers = self.workers;
        config.fund_amount = self.fund_amount;
        config.batch_size = self.batch_size;
        config.rest_url = self.rest_url.unwrap_or_else(|| rest_url(&self.rpc));
        config.chain = self.chain.into();
        config.validate()?;
        Ok(config)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ui {
    /// Log lines and a final summary.
    Plain,
    /// Full-screen live rate display.
    Tui,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Connections per endpoint.
    #[arg(short, long, default_value_t = 1)]
    pub connections: usize,

    /// Run time in seconds, 0 for no limit.
    #[arg(short = 'T', long = "time", default_value_t = 60)]
    pub time_secs: u64,

    /// Total send attempts across all connections. Rejected and failed sends use up the count.
    #[arg(short = 'N', long)]
    pub count: Option<u64>,

    /// Transactions per second per connection.
    #[arg(short, long, default_value = "1000")]
    pub rate: NonZeroU32,

    /// Node RPC endpoints, comma separated or repeated.
    #[arg(short, long = "endpoints", env = "LOADTEST_ENDPOINTS", value_delimiter = ',', default_value = DEFAULT_ENDPOINT)]
    pub endpoints: Vec<String>,

    #[arg(long, env = "LOADTEST_SINK_ADDRESS", default_value = DEFAULT_SINK_ADDRESS)]
    pub sink_address: String,

    #[arg(long, default_value = DEFAULT_CLIENT_FACTORY)]
    pub client_factory: String,

    #[arg(long, value_enum, default_value_t = Ui::Plain)]
    pub ui: Ui,

    /// Leave Ctrl+C to the default handler instead of stopping the run cleanly.
    #[arg(long)]
    pub no_trap_interrupts: bool,

    #[command(flatten)]
    pub chain: ChainArgs,
}

impl RunArgs {
    pub fn load_config(&self) -> Result<LoadConfig, ConfigError> {
        let endpoints = self
            .endpoints
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect::<Vec<_>>();

        let config = LoadConfig {
            connections: self.connections,
            duration: (self.time_secs > 0).then(|| Duration::from_secs(self.time_secs)),
            count: self.count.filter(|c| *c > 0),
            rate: self.rate,
            endpoints,
            sink_address: self.sink_address.clone(),
            chain: self.chain.clone().into(),
            ..LoadConfig::new(&[])
        };
        config.validate()?;
        Ok(config)
    }
}
