use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_STANDARD: &str = "randomizer";
pub const EVENT_STANDARD_VERSION: &str = "1.0.0";
pub const EVENT_SHOW_RANDOM_RESULT: &str = "show_random_result";

/// show_random_result event data from the randomizer contract (matches the
/// contract's event structure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowRandomResultEvent {
    pub request_id: u64,
    /// Oracle output, 32 bytes hex-encoded
    pub result_hex: String,
    pub timestamp: u64,
}

/// Parser for NEP-297 `EVENT_JSON:` log lines emitted by one randomizer
/// instance
pub struct EventParser {
    event_json_regex: Regex,
}

impl EventParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            event_json_regex: Regex::new(r"EVENT_JSON:(.*?)$")
                .context("Failed to compile regex")?,
        })
    }

    /// Process an individual log entry. Returns None for anything that is
    /// not a well-formed show_random_result event under our standard.
    pub fn parse_log(&self, log: &str) -> Option<ShowRandomResultEvent> {
        // Extract EVENT_JSON from log
        let captures = self.event_json_regex.captures(log)?;
        let event_json_str = captures.get(1)?.as_str();

        // Parse JSON
        let event: Value = serde_json::from_str(event_json_str).ok()?;

        // Check standard name
        let standard = event.get("standard")?.as_str()?;
        if standard != EVENT_STANDARD {
            return None;
        }

        let event_name = event.get("event")?.as_str()?;
        if event_name != EVENT_SHOW_RANDOM_RESULT {
            return None;
        }

        let data_array = event.get("data")?.as_array()?;
        if data_array.is_empty() {
            return None;
        }

        serde_json::from_value(data_array[0].clone()).ok()
    }
}
