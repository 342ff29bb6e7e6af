use anyhow::{Context, Result};
use near_crypto::{InMemorySigner, SecretKey};
use near_primitives::types::AccountId;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// One TGas in gas units
const TGAS: u64 = 1_000_000_000_000;

/// Protocol ceiling for a single function call
const MAX_GAS_TGAS: u64 = 300;

/// Harness configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // NEAR configuration
    pub near_rpc_url: String,
    pub neardata_api_url: String,
    pub fastnear_api_url: String,
    pub start_block_height: u64,
    pub scan_interval_ms: u64,

    // Deployer account: funds the per-case contract instances and acts as
    // the transaction sender for the generation call
    pub deployer_account_id: AccountId,
    pub deployer_signer: InMemorySigner,

    // Contract under test
    pub randomizer_wasm_path: PathBuf,
    pub instance_initial_balance_yocto: u128,

    // Generation call parameters
    pub call_gas: u64,
    pub call_deposit_yocto: u128,

    // How long to wait for the oracle callback event
    pub event_wait_seconds: u64,

    // The round-trip case needs a live oracle, so it is off by default
    pub run_oracle_roundtrip: bool,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Required environment variables:
    /// - NEAR_RPC_URL: NEAR RPC endpoint (e.g., https://rpc.testnet.near.org)
    /// - DEPLOYER_ACCOUNT_ID: account that deploys and funds test instances
    /// - DEPLOYER_PRIVATE_KEY: deployer private key (ed25519:...)
    /// - RANDOMIZER_WASM_PATH: path to the compiled randomizer contract
    ///
    /// Optional environment variables (with defaults):
    /// - NEARDATA_API_URL: block API URL with a {block_id} placeholder
    /// - FASTNEAR_API_URL: status endpoint for the latest block height
    /// - START_BLOCK_HEIGHT: first block to scan, 0 = latest (default: 0)
    /// - SCAN_INTERVAL_MS: pause between block scans (default: 0)
    /// - INSTANCE_INITIAL_BALANCE_YOCTO: per-instance funding (default: 5 NEAR)
    /// - CALL_GAS_TGAS: gas budget for the generation call (default: 300)
    /// - CALL_DEPOSIT_YOCTO: attached payment (default: 0.1 NEAR)
    /// - EVENT_WAIT_SECONDS: callback wait window (default: 1000)
    /// - RUN_ORACLE_ROUNDTRIP: enable the live round-trip case, accepts
    ///   1/0/true/false (default: false)
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenv::dotenv().ok();

        // Required fields
        let near_rpc_url = env::var("NEAR_RPC_URL")
            .context("NEAR_RPC_URL environment variable is required")?;

        let deployer_account_id = env::var("DEPLOYER_ACCOUNT_ID")
            .context("DEPLOYER_ACCOUNT_ID environment variable is required")?;
        let deployer_account_id = AccountId::from_str(&deployer_account_id)
            .context("Invalid DEPLOYER_ACCOUNT_ID format")?;

        let deployer_private_key = env::var("DEPLOYER_PRIVATE_KEY")
            .context("DEPLOYER_PRIVATE_KEY environment variable is required")?;
        let secret_key: SecretKey = deployer_private_key
            .parse()
            .context("Invalid DEPLOYER_PRIVATE_KEY format (expected ed25519:...)")?;
        let deployer_signer =
            InMemorySigner::from_secret_key(deployer_account_id.clone(), secret_key);

        let randomizer_wasm_path = PathBuf::from(
            env::var("RANDOMIZER_WASM_PATH")
                .context("RANDOMIZER_WASM_PATH environment variable is required")?,
        );

        // Optional fields with defaults
        let neardata_api_url = env::var("NEARDATA_API_URL")
            .unwrap_or_else(|_| "https://testnet.neardata.xyz/v0/block/{block_id}".to_string());

        let fastnear_api_url = env::var("FASTNEAR_API_URL").unwrap_or_else(|_| {
            // Auto-detect based on neardata URL
            if neardata_api_url.contains("mainnet") {
                "https://api.fastnear.com/status".to_string()
            } else {
                "https://test.api.fastnear.com/status".to_string()
            }
        });

        let start_block_height = env::var("START_BLOCK_HEIGHT")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u64>()
            .context("START_BLOCK_HEIGHT must be a valid number")?;

        let scan_interval_ms = env::var("SCAN_INTERVAL_MS")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u64>()
            .context("SCAN_INTERVAL_MS must be a valid number")?;

        let instance_initial_balance_yocto = env::var("INSTANCE_INITIAL_BALANCE_YOCTO")
            .unwrap_or_else(|_| "5000000000000000000000000".to_string()) // 5 NEAR
            .parse::<u128>()
            .context("INSTANCE_INITIAL_BALANCE_YOCTO must be a valid number")?;

        let call_gas_tgas = env::var("CALL_GAS_TGAS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .context("CALL_GAS_TGAS must be a valid number")?;

        let call_deposit_yocto = env::var("CALL_DEPOSIT_YOCTO")
            .unwrap_or_else(|_| "100000000000000000000000".to_string()) // 0.1 NEAR
            .parse::<u128>()
            .context("CALL_DEPOSIT_YOCTO must be a valid number")?;

        let event_wait_seconds = env::var("EVENT_WAIT_SECONDS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<u64>()
            .context("EVENT_WAIT_SECONDS must be a valid number")?;

        let run_oracle_roundtrip = match env::var("RUN_ORACLE_ROUNDTRIP") {
            Ok(raw) => parse_flag(&raw)
                .context("RUN_ORACLE_ROUNDTRIP must be one of: 1, 0, true, false")?,
            Err(_) => false,
        };

        Ok(Self {
            near_rpc_url,
            neardata_api_url,
            fastnear_api_url,
            start_block_height,
            scan_interval_ms,
            deployer_account_id,
            deployer_signer,
            randomizer_wasm_path,
            instance_initial_balance_yocto,
            call_gas: call_gas_tgas * TGAS,
            call_deposit_yocto,
            event_wait_seconds,
            run_oracle_roundtrip,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.near_rpc_url.is_empty() {
            anyhow::bail!("NEAR RPC URL cannot be empty");
        }

        if !self.randomizer_wasm_path.is_file() {
            anyhow::bail!(
                "Randomizer contract WASM not found at {}",
                self.randomizer_wasm_path.display()
            );
        }

        if self.call_gas == 0 || self.call_gas > MAX_GAS_TGAS * TGAS {
            anyhow::bail!("Call gas must be between 1 and {} TGas", MAX_GAS_TGAS);
        }

        if self.event_wait_seconds == 0 || self.event_wait_seconds > 86_400 {
            anyhow::bail!("Event wait window must be between 1 and 86400 seconds");
        }

        if self.instance_initial_balance_yocto == 0 {
            anyhow::bail!("Instance initial balance must be positive");
        }

        Ok(())
    }
}

/// Parse an on/off env flag. Both `1`/`0` and `true`/`false` are accepted;
/// anything else is an error rather than silently treated as off.
fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => anyhow::bail!("unrecognized flag value '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // from_env reads process-global state; serialize the tests that touch it
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const TEST_KEY: &str =
        "ed25519:3D4YudUahN1nawWvHfEKBGpmJLfbCTbvdXDJKqfLhQ98XewyWK4tEDWvmAYPZqcgz7qfkCEHyWD15m8JVVWJ3LXD";

    fn set_required_env(wasm_path: &std::path::Path) {
        env::set_var("NEAR_RPC_URL", "https://rpc.testnet.near.org");
        env::set_var("DEPLOYER_ACCOUNT_ID", "tester.testnet");
        env::set_var("DEPLOYER_PRIVATE_KEY", TEST_KEY);
        env::set_var("RANDOMIZER_WASM_PATH", wasm_path);
    }

    fn clear_env() {
        for var in [
            "NEAR_RPC_URL",
            "DEPLOYER_ACCOUNT_ID",
            "DEPLOYER_PRIVATE_KEY",
            "RANDOMIZER_WASM_PATH",
            "RUN_ORACLE_ROUNDTRIP",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_from_env_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let wasm = tempfile::NamedTempFile::new().unwrap();
        clear_env();
        set_required_env(wasm.path());

        let config = Config::from_env().unwrap();

        assert_eq!(config.event_wait_seconds, 1000);
        assert!(config.neardata_api_url.contains("{block_id}"));
        assert!(!config.run_oracle_roundtrip);
        assert_eq!(config.deployer_account_id.as_str(), "tester.testnet");

        clear_env();
    }

    #[test]
    fn test_from_env_requires_deployer_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        let wasm = tempfile::NamedTempFile::new().unwrap();
        clear_env();
        set_required_env(wasm.path());
        env::remove_var("DEPLOYER_PRIVATE_KEY");

        assert!(Config::from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_from_env_roundtrip_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        let wasm = tempfile::NamedTempFile::new().unwrap();
        clear_env();
        set_required_env(wasm.path());

        // Both spellings the docs mention must enable the case
        env::set_var("RUN_ORACLE_ROUNDTRIP", "1");
        assert!(Config::from_env().unwrap().run_oracle_roundtrip);

        env::set_var("RUN_ORACLE_ROUNDTRIP", "true");
        assert!(Config::from_env().unwrap().run_oracle_roundtrip);

        env::set_var("RUN_ORACLE_ROUNDTRIP", "0");
        assert!(!Config::from_env().unwrap().run_oracle_roundtrip);

        // A malformed value is an error, never silently off
        env::set_var("RUN_ORACLE_ROUNDTRIP", "yes");
        assert!(Config::from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1").unwrap());
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(!parse_flag("false").unwrap());
        assert!(parse_flag("enabled").is_err());
    }

    #[test]
    fn test_config_validation() {
        let wasm = tempfile::NamedTempFile::new().unwrap();

        let mut config = create_test_config(wasm.path().into());
        assert!(config.validate().is_ok());

        // Gas over the protocol ceiling
        config.call_gas = 301 * TGAS;
        assert!(config.validate().is_err());

        config.call_gas = 300 * TGAS;
        assert!(config.validate().is_ok());

        // Zero wait window
        config.event_wait_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_wasm_rejected() {
        let config = create_test_config(PathBuf::from("/nonexistent/randomizer.wasm"));
        assert!(config.validate().is_err());
    }

    fn create_test_config(randomizer_wasm_path: PathBuf) -> Config {
        Config {
            near_rpc_url: "https://rpc.testnet.near.org".to_string(),
            neardata_api_url: "https://testnet.neardata.xyz/v0/block/{block_id}".to_string(),
            fastnear_api_url: "https://test.api.fastnear.com/status".to_string(),
            start_block_height: 0,
            scan_interval_ms: 0,
            deployer_account_id: "tester.testnet".parse().unwrap(),
            deployer_signer: InMemorySigner::from_secret_key(
                "tester.testnet".parse().unwrap(),
                "ed25519:3D4YudUahN1nawWvHfEKBGpmJLfbCTbvdXDJKqfLhQ98XewyWK4tEDWvmAYPZqcgz7qfkCEHyWD15m8JVVWJ3LXD".parse().unwrap(),
            ),
            randomizer_wasm_path,
            instance_initial_balance_yocto: 5_000_000_000_000_000_000_000_000,
            call_gas: 300 * TGAS,
            call_deposit_yocto: 100_000_000_000_000_000_000_000,
            event_wait_seconds: 1000,
            run_oracle_roundtrip: false,
        }
    }
}
