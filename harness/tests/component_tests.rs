/// Component tests for the harness scaffolding
/// Run with: cargo test --test component_tests

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use randomizer_harness::config::Config;
use randomizer_harness::harness::{run_cases, CaseOutcome, TestCase};
use randomizer_harness::near_client::NearClient;
use randomizer_harness::util::sleep_ms;

fn offline_config() -> Config {
    Config {
        near_rpc_url: "https://rpc.testnet.near.org".to_string(),
        neardata_api_url: "https://testnet.neardata.xyz/v0/block/{block_id}".to_string(),
        fastnear_api_url: "https://test.api.fastnear.com/status".to_string(),
        start_block_height: 0,
        scan_interval_ms: 0,
        deployer_account_id: "tester.testnet".parse().unwrap(),
        deployer_signer: near_crypto::InMemorySigner::from_secret_key(
            "tester.testnet".parse().unwrap(),
            "ed25519:3D4YudUahN1nawWvHfEKBGpmJLfbCTbvdXDJKqfLhQ98XewyWK4tEDWvmAYPZqcgz7qfkCEHyWD15m8JVVWJ3LXD"
                .parse()
                .unwrap(),
        ),
        randomizer_wasm_path: PathBuf::from("randomizer.wasm"),
        instance_initial_balance_yocto: 5_000_000_000_000_000_000_000_000,
        call_gas: 300_000_000_000_000,
        call_deposit_yocto: 100_000_000_000_000_000_000_000,
        event_wait_seconds: 1000,
        run_oracle_roundtrip: false,
    }
}

fn offline_client(config: &Config) -> NearClient {
    NearClient::new(&config.near_rpc_url, config.deployer_signer.clone()).unwrap()
}

fn must_not_run<'a>(_: &'a Config, _: &'a NearClient) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async { anyhow::bail!("disabled case must not execute") })
}

fn failing_case<'a>(_: &'a Config, _: &'a NearClient) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async { Err(anyhow::anyhow!("boom")) })
}

fn passing_case<'a>(_: &'a Config, _: &'a NearClient) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async { Ok(()) })
}

#[tokio::test]
async fn test_sleep_ms_resolves_no_earlier_than_requested() {
    let start = Instant::now();
    sleep_ms(100).await;
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_disabled_case_is_skipped_not_executed() {
    let config = offline_config();
    let client = offline_client(&config);

    let cases = vec![TestCase::new(
        "disabled_case",
        false,
        Some("needs a live oracle"),
        must_not_run,
    )];

    let report = run_cases(cases, &config, &client).await;

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 0);
    assert!(matches!(
        report.outcomes[0],
        ("disabled_case", CaseOutcome::Skipped("needs a live oracle"))
    ));
}

#[tokio::test]
async fn test_failed_case_does_not_stop_later_cases() {
    let config = offline_config();
    let client = offline_client(&config);

    let cases = vec![
        TestCase::new("failing_case", true, None, failing_case),
        TestCase::new("passing_case", true, None, passing_case),
    ];

    let report = run_cases(cases, &config, &client).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.passed(), 1);
    assert!(!report.all_passed());
}

#[tokio::test]
async fn test_all_passed_counts_skips_as_ok() {
    let config = offline_config();
    let client = offline_client(&config);

    let cases = vec![
        TestCase::new("passing_case", true, None, passing_case),
        TestCase::new("disabled_case", false, None, must_not_run),
    ];

    let report = run_cases(cases, &config, &client).await;

    assert!(report.all_passed());
    assert_eq!(report.passed(), 1);
    assert_eq!(report.skipped(), 1);
}
