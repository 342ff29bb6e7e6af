use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::event_stream::{EventStream, EventSubscription, WaitError};
use crate::events::EVENT_SHOW_RANDOM_RESULT;
use crate::near_client::{InstanceHandle, NearClient};

/// Grace window after the first callback in which a duplicate would show up
const DUPLICATE_GRACE_SECONDS: u64 = 10;

/// Per-case state: a freshly deployed instance plus a live subscription to
/// its result events. Built before every case, released after it.
pub struct TestContext {
    pub instance: InstanceHandle,
    pub subscription: EventSubscription,
}

impl TestContext {
    /// Deploy a distinct, unused instance and subscribe to its events
    pub async fn setup(config: &Config, client: &NearClient) -> Result<Self> {
        let wasm = tokio::fs::read(&config.randomizer_wasm_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read contract WASM from {}",
                    config.randomizer_wasm_path.display()
                )
            })?;

        let instance = client
            .deploy_instance(wasm, config.instance_initial_balance_yocto)
            .await?;

        let subscription = EventStream::open(
            config.neardata_api_url.clone(),
            config.fastnear_api_url.clone(),
            instance.account_id.clone(),
            config.start_block_height,
            config.scan_interval_ms,
        )
        .await
        .context("Failed to open event subscription")?;

        Ok(Self {
            instance,
            subscription,
        })
    }

    /// Release everything the case acquired: stop the scanner and delete
    /// the instance account. Runs regardless of the case outcome.
    pub async fn teardown(self, config: &Config, client: &NearClient) -> Result<()> {
        let TestContext {
            instance,
            subscription,
        } = self;

        subscription.close();
        client
            .delete_instance(&instance, &config.deployer_account_id)
            .await
    }
}

type CaseFn = for<'a> fn(&'a Config, &'a NearClient) -> BoxFuture<'a, Result<()>>;

/// A declared test case. Disabled cases stay in the list and show up in the
/// report as skipped instead of being commented out.
pub struct TestCase {
    pub name: &'static str,
    pub enabled: bool,
    pub skip_reason: Option<&'static str>,
    run: CaseFn,
}

impl TestCase {
    pub fn new(
        name: &'static str,
        enabled: bool,
        skip_reason: Option<&'static str>,
        run: CaseFn,
    ) -> Self {
        Self {
            name,
            enabled,
            skip_reason,
            run,
        }
    }
}

/// The harness's test cases
pub fn suite(config: &Config) -> Vec<TestCase> {
    vec![
        TestCase::new(
            "deploys_fresh_instance_per_case",
            true,
            None,
            fresh_instance_case,
        ),
        TestCase::new(
            "oracle_roundtrip_emits_one_result",
            config.run_oracle_roundtrip,
            Some("needs a funded deployer and a live randomness oracle; set RUN_ORACLE_ROUNDTRIP=1"),
            oracle_roundtrip_case,
        ),
    ]
}

fn fresh_instance_case<'a>(config: &'a Config, client: &'a NearClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(fresh_instance_per_case(config, client))
}

fn oracle_roundtrip_case<'a>(config: &'a Config, client: &'a NearClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(oracle_roundtrip(config, client))
}

#[derive(Debug)]
pub enum CaseOutcome {
    Passed,
    Failed(String),
    Skipped(&'static str),
}

pub struct SuiteReport {
    pub outcomes: Vec<(&'static str, CaseOutcome)>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Skipped(_)))
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&CaseOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn log_summary(&self) {
        for (name, outcome) in &self.outcomes {
            match outcome {
                CaseOutcome::Passed => info!("✅ {}: PASSED", name),
                CaseOutcome::Failed(reason) => error!("❌ {}: FAILED: {}", name, reason),
                CaseOutcome::Skipped(reason) => warn!("⏭  {}: SKIPPED ({})", name, reason),
            }
        }
        info!(
            "Suite finished: {} passed, {} failed, {} skipped",
            self.passed(),
            self.failed(),
            self.skipped()
        );
    }
}

/// Run the default suite
pub async fn run_suite(config: &Config, client: &NearClient) -> SuiteReport {
    run_cases(suite(config), config, client).await
}

/// Run a list of cases sequentially, recording one outcome per case. Case
/// failures are reported, never propagated, so later cases still run.
pub async fn run_cases(
    cases: Vec<TestCase>,
    config: &Config,
    client: &NearClient,
) -> SuiteReport {
    let mut outcomes = Vec::new();

    for case in cases {
        if !case.enabled {
            let reason = case.skip_reason.unwrap_or("disabled");
            outcomes.push((case.name, CaseOutcome::Skipped(reason)));
            continue;
        }

        info!("▶ Running {}", case.name);
        let outcome = match (case.run)(config, client).await {
            Ok(()) => CaseOutcome::Passed,
            Err(e) => CaseOutcome::Failed(format!("{e:#}")),
        };
        outcomes.push((case.name, outcome));
    }

    SuiteReport { outcomes }
}

/// Consecutive setups must never hand out the same instance
async fn fresh_instance_per_case(config: &Config, client: &NearClient) -> Result<()> {
    let first = TestContext::setup(config, client).await?;
    let second = TestContext::setup(config, client).await?;

    let distinct = first.instance.account_id != second.instance.account_id;

    // Tear both down before judging, so a failed assertion leaks nothing
    let first_teardown = first.teardown(config, client).await;
    let second_teardown = second.teardown(config, client).await;

    anyhow::ensure!(distinct, "consecutive setups returned the same instance");
    first_teardown?;
    second_teardown
}

/// Full oracle round-trip: call the generation entry point, then wait for
/// the callback event within the configured window
async fn oracle_roundtrip(config: &Config, client: &NearClient) -> Result<()> {
    let mut ctx = TestContext::setup(config, client).await?;

    let result = oracle_roundtrip_body(config, client, &mut ctx).await;
    let teardown = ctx.teardown(config, client).await;

    result?;
    teardown
}

async fn oracle_roundtrip_body(
    config: &Config,
    client: &NearClient,
    ctx: &mut TestContext,
) -> Result<()> {
    info!("Starting random generation...");
    let tx_hash = client
        .start_generating_random(&ctx.instance, config.call_gas, config.call_deposit_yocto)
        .await?;
    info!("Generation requested in tx {}", tx_hash);

    let window = Duration::from_secs(config.event_wait_seconds);
    info!(
        "Waiting up to {}s for the {} callback...",
        config.event_wait_seconds, EVENT_SHOW_RANDOM_RESULT
    );

    let event = ctx.subscription.next_event(window).await?;

    // The oracle must hand back a well-formed 32-byte value; the harness
    // makes no assumption about which value
    let result_bytes = hex::decode(&event.result_hex)
        .context("Oracle result is not valid hex")?;
    anyhow::ensure!(
        result_bytes.len() == 32,
        "Oracle result must be 32 bytes, got {}",
        result_bytes.len()
    );

    // Exactly one callback per request
    match ctx
        .subscription
        .next_event(Duration::from_secs(DUPLICATE_GRACE_SECONDS))
        .await
    {
        Err(WaitError::Timeout(_)) => Ok(()),
        Ok(extra) => anyhow::bail!(
            "expected exactly one {} event, got a second: {:?}",
            EVENT_SHOW_RANDOM_RESULT,
            extra
        ),
        Err(WaitError::Closed) => {
            anyhow::bail!("event stream closed while checking for duplicate callbacks")
        }
    }
}
