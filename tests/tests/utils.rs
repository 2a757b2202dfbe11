use mock_ledger::MockLedger;
use perpx_load::{LedgerClient, SigningIdentity};
use perpx_load_core::{
    ChainConfig, Coin, ConfirmationPolicy, LoadConfig, SeedConfig, SeedCredential,
    DEV_SEED_KEY_NAME,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

pub const SEED_BALANCE: u128 = 1_000_000_000_000;
pub const FUND_AMOUNT: u128 = 100_000_000;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("perpx_load=debug,perpx_load_runtime=debug,mock_ledger=info")
            .try_init();
    });
}

/// Cheap gas so worker balances cover many transfers.
pub fn chain() -> ChainConfig {
    ChainConfig {
        min_gas_price: 1,
        ..ChainConfig::default()
    }
}

#[allow(unused)]
pub fn seed_identity() -> SigningIdentity {
    let credential = SeedCredential::resolve(None, DEV_SEED_KEY_NAME).unwrap();
    SigningIdentity::from_credential(&credential, &chain().address_prefix).unwrap()
}

/// A mock ledger served on an ephemeral port, with the dev seed account funded.
pub async fn ledger() -> (MockLedger, String) {
    init();
    let ledger = MockLedger::new(chain());
    ledger.fund(seed_identity().address().as_str(), SEED_BALANCE);
    let url = ledger.spawn().await.unwrap();
    (ledger, url)
}

#[allow(unused)]
pub fn seed_config(url: &str, workers: u32, batch_size: usize) -> SeedConfig {
    let mut config =
        SeedConfig::new(SeedCredential::resolve(None, DEV_SEED_KEY_NAME).unwrap());
    config.workers = workers;
    config.batch_size = batch_size;
    config.fund_amount = Coin::new(FUND_AMOUNT, &chain().denom);
    config.chain = chain();
    config.rest_url = url.to_string();
    config.confirmation = ConfirmationPolicy {
        poll_interval: Duration::from_millis(20),
        timeout: Duration::from_secs(5),
    };
    config
}

#[allow(unused)]
pub fn load_config(url: &str) -> LoadConfig {
    LoadConfig {
        chain: chain(),
        ..LoadConfig::new(&[url])
    }
}

#[allow(unused)]
pub fn client(url: &str) -> LedgerClient {
    LedgerClient::new(url).unwrap()
}
