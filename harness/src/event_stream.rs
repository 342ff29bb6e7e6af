use anyhow::{Context, Result};
use near_primitives::types::AccountId;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::events::{EventParser, ShowRandomResultEvent, EVENT_SHOW_RANDOM_RESULT};

/// Why a bounded wait for the callback event did not produce one
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("no show_random_result event within {0:?}")]
    Timeout(Duration),
    #[error("event stream closed before an event arrived")]
    Closed,
}

/// Block data from the neardata-style block API
#[derive(Debug, Deserialize)]
pub(crate) struct BlockData {
    shards: Option<Vec<ShardData>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShardData {
    receipt_execution_outcomes: Option<Vec<ReceiptExecutionOutcome>>,
}

#[derive(Debug, Deserialize)]
struct ReceiptExecutionOutcome {
    receipt: Option<Receipt>,
    execution_outcome: Option<ExecutionOutcome>,
}

#[derive(Debug, Deserialize)]
struct Receipt {
    receiver_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecutionOutcome {
    outcome: Option<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    logs: Option<Vec<String>>,
}

/// FastNEAR status response
#[derive(Debug, Deserialize)]
struct FastNearStatus {
    sync_block_height: u64,
}

/// Live subscription to one instance's show_random_result events.
///
/// Owns the scanner task; dropping the subscription aborts it, so no
/// scanner or socket outlives its test case.
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<ShowRandomResultEvent>,
    scanner: JoinHandle<()>,
}

impl EventSubscription {
    /// Wait for the next event, bounded by `timeout`. Resolves on the first
    /// matching event or fails with `WaitError::Timeout`, whichever comes
    /// first.
    pub async fn next_event(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<ShowRandomResultEvent, WaitError> {
        tokio::select! {
            received = self.rx.recv() => received.ok_or(WaitError::Closed),
            _ = sleep(timeout) => Err(WaitError::Timeout(timeout)),
        }
    }

    /// Stop the scanner task. Dropping the subscription has the same
    /// effect; this exists so teardown reads explicitly.
    pub fn close(self) {}
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.scanner.abort();
    }
}

/// Factory for event subscriptions backed by a block-scanning task
pub struct EventStream;

impl EventStream {
    /// Open a subscription to `contract_id`'s show_random_result events.
    ///
    /// # Arguments
    /// * `block_api_url` - block API URL with a `{block_id}` placeholder
    /// * `status_api_url` - endpoint reporting the latest synced height
    /// * `start_block` - first block to scan, 0 = latest
    pub async fn open(
        block_api_url: String,
        status_api_url: String,
        contract_id: AccountId,
        start_block: u64,
        scan_interval_ms: u64,
    ) -> Result<EventSubscription> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        // If start_block is 0, begin at the chain head so each case only
        // ever sees events from its own freshly deployed instance
        let current_block = if start_block == 0 {
            Self::fetch_latest_block(&http_client, &status_api_url).await?
        } else {
            start_block
        };

        let parser = EventParser::new()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let scanner = Scanner {
            http_client,
            block_api_url,
            contract_id,
            current_block,
            scan_interval_ms,
            parser,
            blocks_scanned: 0,
            events_found: 0,
        };

        let handle = tokio::spawn(scanner.run(tx));

        Ok(EventSubscription {
            rx,
            scanner: handle,
        })
    }

    /// Fetch latest block height from the status API
    async fn fetch_latest_block(
        http_client: &reqwest::Client,
        status_api_url: &str,
    ) -> Result<u64> {
        debug!("Fetching latest block height from {}", status_api_url);

        let response = http_client
            .get(status_api_url)
            .send()
            .await
            .context("Failed to fetch chain status")?;

        if !response.status().is_success() {
            anyhow::bail!("Status API returned status: {}", response.status());
        }

        let status: FastNearStatus = response
            .json()
            .await
            .context("Failed to parse chain status")?;

        info!("Latest block height: {}", status.sync_block_height);
        Ok(status.sync_block_height)
    }
}

/// Sequential block scanner feeding the subscription channel. Scanning
/// blocks in order and walking each receipt's logs once delivers every
/// emitted event exactly once.
struct Scanner {
    http_client: reqwest::Client,
    block_api_url: String,
    contract_id: AccountId,
    current_block: u64,
    scan_interval_ms: u64,
    parser: EventParser,
    blocks_scanned: u64,
    events_found: u64,
}

impl Scanner {
    async fn run(mut self, tx: mpsc::UnboundedSender<ShowRandomResultEvent>) {
        info!(
            "Listening for {} events on {} from block {}",
            EVENT_SHOW_RANDOM_RESULT, self.contract_id, self.current_block
        );

        let mut retry_count = 0;
        const MAX_RETRIES: u32 = 3;

        loop {
            if tx.is_closed() {
                debug!("Subscriber gone, stopping scanner for {}", self.contract_id);
                return;
            }

            match self.scan_single_block(self.current_block).await {
                Ok(events) => {
                    self.blocks_scanned += 1;
                    retry_count = 0; // Reset retry counter on success

                    for event in events {
                        self.events_found += 1;
                        info!(
                            "📦 {} from {} at block {}: request_id={} result={}",
                            EVENT_SHOW_RANDOM_RESULT,
                            self.contract_id,
                            self.current_block,
                            event.request_id,
                            event.result_hex
                        );
                        if tx.send(event).is_err() {
                            return;
                        }
                    }

                    // Move to next block
                    self.current_block += 1;

                    // Log progress every 500 blocks
                    if self.blocks_scanned % 500 == 0 {
                        debug!(
                            "📊 Scanned {} blocks for {} ({} events)",
                            self.blocks_scanned, self.contract_id, self.events_found
                        );
                    }

                    // Brief pause between blocks (if configured)
                    if self.scan_interval_ms > 0 {
                        sleep(Duration::from_millis(self.scan_interval_ms)).await;
                    }
                }
                Err(e) => {
                    retry_count += 1;
                    error!(
                        "❌ Error scanning block {} (attempt {}/{}): {}",
                        self.current_block, retry_count, MAX_RETRIES, e
                    );

                    if retry_count >= MAX_RETRIES {
                        warn!(
                            "⚠️  Skipping block {} after {} failed attempts",
                            self.current_block, MAX_RETRIES
                        );
                        self.current_block += 1;
                        retry_count = 0;
                        sleep(Duration::from_secs(1)).await;
                    } else {
                        // Wait before retrying same block
                        sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    /// Scan a single block for matching events
    async fn scan_single_block(&self, block_id: u64) -> Result<Vec<ShowRandomResultEvent>> {
        let block_data = self.load_block(block_id).await?;

        let Some(shards) = block_data.shards else {
            return Ok(vec![]);
        };

        Ok(extract_events(&self.parser, &self.contract_id, &shards))
    }

    /// Load block data from the block API
    async fn load_block(&self, block_id: u64) -> Result<BlockData> {
        let url = self
            .block_api_url
            .replace("{block_id}", &block_id.to_string());

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch block")?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let response_text = response
                    .text()
                    .await
                    .context("Failed to read response body as text")?;

                // Handle null response (block not yet indexed)
                if response_text.trim() == "null" {
                    debug!("⏳ Block {} returned null (not indexed yet)", block_id);
                    return Ok(BlockData { shards: None });
                }

                let block_data: BlockData =
                    serde_json::from_str(&response_text).with_context(|| {
                        format!(
                            "Failed to parse block data from JSON. Raw text (truncated): '{}'",
                            text_preview(&response_text)
                        )
                    })?;

                Ok(block_data)
            }
            reqwest::StatusCode::NOT_FOUND => {
                debug!("⏳ Block {} not found yet (waiting for indexing)", block_id);
                Ok(BlockData { shards: None })
            }
            status => {
                anyhow::bail!("HTTP {} for block {}", status, block_id);
            }
        }
    }
}

/// How much of an unparseable response body to quote in error context
const PREVIEW_CHARS: usize = 200;

/// Truncate on a character boundary, never inside a multi-byte sequence
fn text_preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Walk every receipt outcome in the shards, keep those addressed to our
/// contract, and parse their logs. Each matching log line yields exactly
/// one event.
pub(crate) fn extract_events(
    parser: &EventParser,
    contract_id: &AccountId,
    shards: &[ShardData],
) -> Vec<ShowRandomResultEvent> {
    let mut events = Vec::new();

    for shard in shards {
        let Some(receipt_outcomes) = &shard.receipt_execution_outcomes else {
            continue;
        };

        for outcome in receipt_outcomes {
            let is_our_contract = outcome
                .receipt
                .as_ref()
                .and_then(|r| r.receiver_id.as_deref())
                .map(|receiver_id| receiver_id == contract_id.as_str())
                .unwrap_or(false);

            if !is_our_contract {
                continue;
            }

            let logs = outcome
                .execution_outcome
                .as_ref()
                .and_then(|e| e.outcome.as_ref())
                .and_then(|o| o.logs.as_ref());

            if let Some(logs) = logs {
                for log in logs {
                    if let Some(event) = parser.parse_log(log) {
                        events.push(event);
                    }
                }
            }
        }
    }

    events
}
