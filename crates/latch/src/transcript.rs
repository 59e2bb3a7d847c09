//! Transcript reader: extract the newest resource-usage record from an
//! append-only conversation log.
//!
//! The transcript is newline-delimited JSON. Usage data is expected near the
//! tail, so the scan runs newest to oldest and short-circuits on the first
//! assistant record that carries a usage payload. Unparseable lines are
//! skipped; a missing, empty, or fully malformed log is "no data", never an
//! error.

use serde::Deserialize;
use std::path::Path;

/// Token usage from one assistant turn. Absent or null counts read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
}

impl UsageRecord {
    /// Total context consumption: input plus both cache components.
    pub fn total(&self) -> u64 {
        self.input_tokens.unwrap_or(0)
            + self.cache_creation_input_tokens.unwrap_or(0)
            + self.cache_read_input_tokens.unwrap_or(0)
    }
}

/// One transcript line, as far as this reader cares.
#[derive(Debug, Deserialize)]
struct TranscriptRecord {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    usage: Option<UsageRecord>,
}

/// Return the usage payload of the newest assistant record, or `None` when
/// the transcript is missing, unreadable, or holds no such record.
pub fn last_usage(path: &Path) -> Option<UsageRecord> {
    let content = std::fs::read_to_string(path).ok()?;

    for line in content.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<TranscriptRecord>(line) else {
            continue;
        };
        if record.role.as_deref() == Some("assistant")
            && let Some(usage) = record.usage
        {
            return Some(usage);
        }
    }
    None
}
