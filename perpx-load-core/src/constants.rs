use std::time::Duration;

pub const DEFAULT_CHAIN_ID: &str = "localperpxprotocol";
pub const DEFAULT_DENOM: &str = "aperpx";
pub const DEFAULT_ADDRESS_PREFIX: &str = "perpx";

/// Minimum gas price accepted by the node, in base denom units per unit of gas.
pub const DEFAULT_MIN_GAS_PRICE: u128 = 25_000_000_000;

/// Gas budgeted for every transfer message in a funding batch.
pub const FUNDING_GAS_PER_MESSAGE: u64 = 100_000;

/// Gas limit of a single load-test transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 200_000;

/// Amount sent to the sink address by every load-test transfer.
pub const TRANSFER_AMOUNT: u128 = 1;

pub const DEFAULT_WORKERS: u32 = 10;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_FUND_AMOUNT: &str = "1000000aperpx";

pub const DEFAULT_RPC: &str = "http://localhost:36657";
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:36657/websocket";
pub const DEFAULT_REST_URL: &str = "http://localhost:31317";
pub const DEFAULT_SINK_ADDRESS: &str = "perpx1kyfmupa8z5jtxgf5f4gt285sepeg6eqnzvs25m";
pub const DEFAULT_CLIENT_FACTORY: &str = "perpx-bank";

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const QUERY_ATTEMPTS: u32 = 3;
pub const QUERY_RETRY_BACKOFF: Duration = Duration::from_millis(250);

pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on in-flight balance queries while classifying worker accounts.
pub const BALANCE_QUERY_CONCURRENCY: usize = 16;

/// Cosmos coin type 118, first account, first external address.
pub const HD_PATH: &str = "m/44'/118'/0'/0/0";

/// Key name that resolves to the local-net validator mnemonic.
pub const DEV_SEED_KEY_NAME: &str = "alice";

/// Development-only mnemonic of the `alice` validator on a local network. Never fund this on a
/// public chain.
pub const DEV_SEED_MNEMONIC: &str = "merge panther lobster crazy road hollow amused security before critic about cliff exhibit cause coyote talent happy where lion river tobacco option coconut small";
