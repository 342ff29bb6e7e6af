use anyhow::{Context, Result};
use tracing::info;

use randomizer_harness::config::Config;
use randomizer_harness::harness;
use randomizer_harness::near_client::NearClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "randomizer_harness=info".into()),
        )
        .init();

    info!("Randomizer oracle harness starting...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("NEAR RPC: {}", config.near_rpc_url);
    info!("Deployer: {}", config.deployer_account_id);
    info!("Contract WASM: {}", config.randomizer_wasm_path.display());
    info!("Event wait window: {}s", config.event_wait_seconds);

    let client = NearClient::new(&config.near_rpc_url, config.deployer_signer.clone())
        .context("Failed to create NEAR client")?;

    let report = harness::run_suite(&config, &client).await;
    report.log_summary();

    if !report.all_passed() {
        std::process::exit(1);
    }

    Ok(())
}
