use anyhow::Result;
use mock_ledger::MockLedger;
use perpx_load::SigningIdentity;
use perpx_load_core::{ChainConfig, SeedCredential, DEV_SEED_KEY_NAME};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The local-net REST port the load generator defaults to.
const DEFAULT_ADDR: &str = "127.0.0.1:31317";

/// Balance of the dev seed account at genesis.
const GENESIS_BALANCE: u128 = 1_000_000_000_000_000_000_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_ledger=debug,tower_http=info")),
        )
        .init();

    let chain = ChainConfig::default();
    let credential = SeedCredential::resolve(None, DEV_SEED_KEY_NAME)?;
    let seed = SigningIdentity::from_credential(&credential, &chain.address_prefix)?;

    let ledger = MockLedger::new(chain);
    ledger.fund(seed.address().as_str(), GENESIS_BALANCE);
    info!("Funded seed account {}", seed.address());

    let addr: SocketAddr = std::env::var("MOCK_LEDGER_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    ledger.run(addr).await?;
    Ok(())
}
