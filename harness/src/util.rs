use anyhow::Result;
use std::time::Duration;

/// Length of a `0x`-prefixed bytes32 literal: 2 marker chars + 64 hex chars
const BYTES32_HEX_LEN: usize = 66;

/// Hex-encode a human-readable string and right-pad it with ASCII zeros
/// into a fixed-width `0x`-prefixed bytes32 literal, for contract calls
/// that take fixed-size byte arrays.
pub fn fill_bytes32(name: &str) -> Result<String> {
    let mut encoded = format!("0x{}", hex::encode(name.as_bytes()));

    if encoded.len() > BYTES32_HEX_LEN {
        anyhow::bail!("'{}' does not fit into 32 bytes once hex-encoded", name);
    }

    while encoded.len() < BYTES32_HEX_LEN {
        encoded.push('0');
    }

    Ok(encoded)
}

/// Suspend the current task for a fixed number of milliseconds. Resolves no
/// earlier than the requested duration and never fails.
pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_bytes32_pads_to_66_chars() {
        let padded = fill_bytes32("abc").unwrap();

        assert_eq!(padded.len(), 66);
        assert!(padded.starts_with("0x616263"));
        assert!(padded["0x616263".len()..].bytes().all(|b| b == b'0'));
    }

    #[test]
    fn test_fill_bytes32_empty_string() {
        let padded = fill_bytes32("").unwrap();

        assert_eq!(padded, format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn test_fill_bytes32_exact_fit_needs_no_padding() {
        let name = "a".repeat(32);
        let padded = fill_bytes32(&name).unwrap();

        assert_eq!(padded.len(), 66);
        assert_eq!(padded, format!("0x{}", "61".repeat(32)));
    }

    #[test]
    fn test_fill_bytes32_rejects_oversized_input() {
        let name = "a".repeat(33);
        assert!(fill_bytes32(&name).is_err());
    }
}
