//! Context budget monitor: turns transcript token usage into throttled,
//! leveled warnings.
//!
//! Fires on `PostToolUse`. Usage percentage is computed from the newest
//! assistant turn in the transcript against the configured window size,
//! mapped onto a fixed warning ladder, throttled per session, and persisted
//! through the [`StateStore`]. The whole feature is advisory: every failure
//! path degrades to silence, never to an error.

use crate::event::HookOutput;
use crate::state::{StateStore, epoch_secs};
use crate::transcript;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Warning ladder, greatest first. Selection picks the first rung the usage
/// percentage meets or exceeds.
pub const WARNING_LADDER: [u8; 4] = [95, 85, 75, 60];

/// Minimum seconds between successive warnings for the same session.
const THROTTLE_SECS: u64 = 30;

/// Levels at or above this bypass the throttle; critical warnings must
/// never be silenced.
const THROTTLE_BYPASS_LEVEL: u8 = 85;

/// Persisted per-session monitor state. Created on the first threshold
/// crossing and updated on each non-suppressed crossing; never deleted
/// (state outliving its session is an accepted leak).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContextState {
    /// Last warning level emitted for this session.
    #[serde(default)]
    pub last_warning_level: Option<u8>,
    /// Unix epoch seconds of the last emitted warning.
    #[serde(default)]
    pub last_warning_time: Option<u64>,
}

/// Pick the greatest ladder rung that `percent` meets or exceeds.
pub fn warning_level(percent: f64) -> Option<u8> {
    WARNING_LADDER
        .iter()
        .copied()
        .find(|&rung| percent >= f64::from(rung))
}

fn level_message(level: u8) -> &'static str {
    match level {
        95 => "CRITICAL: Context at 95% — /pause NOW before context is exhausted",
        85 => "Context at 85% — use /pause to save state, then compact or start new session",
        75 => "Context at 75% — store discoveries with store_memory_tool, then /compact",
        _ => "Context at 60% — consider /compact if transitioning between phases",
    }
}

/// Evaluates token-budget consumption for one session.
#[derive(Debug)]
pub struct ContextMonitor<'a> {
    store: &'a StateStore,
    max_tokens: u64,
}

impl<'a> ContextMonitor<'a> {
    /// Create a monitor writing per-session state through `store`.
    pub fn new(store: &'a StateStore, max_tokens: u64) -> Self {
        Self { store, max_tokens }
    }

    /// Evaluate the current transcript for `session_id` and return a warning
    /// diagnostic if a non-suppressed threshold crossing occurred.
    pub fn evaluate(&self, transcript_path: &Path, session_id: &str) -> Option<HookOutput> {
        self.evaluate_at(transcript_path, session_id, epoch_secs())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock, for tests.
    pub fn evaluate_at(
        &self,
        transcript_path: &Path,
        session_id: &str,
        now: u64,
    ) -> Option<HookOutput> {
        let usage = transcript::last_usage(transcript_path)?;

        let percent = usage.total() as f64 / self.max_tokens as f64 * 100.0;
        let level = warning_level(percent)?;

        let key = state_key(session_id);
        let mut state: ContextState = self.store.load(&key).unwrap_or_default();

        if level < THROTTLE_BYPASS_LEVEL
            && let Some(last) = state.last_warning_time
            && now.saturating_sub(last) < THROTTLE_SECS
        {
            debug!(level, "suppressing warning inside throttle window");
            return None;
        }

        state.last_warning_level = Some(level);
        state.last_warning_time = Some(now);
        if let Err(e) = self.store.save(&key, &state) {
            // Advisory feature: stale state just means the next evaluation
            // recomputes from what is on disk.
            warn!("Failed to persist context state: {e}");
        }

        Some(HookOutput::advisory(
            "PostToolUse",
            level_message(level),
            format!("Context usage: {percent:.1}%"),
        ))
    }
}

fn state_key(session_id: &str) -> String {
    format!("latch-context-{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn transcript_with_tokens(tokens: u64) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"role":"assistant","usage":{{"input_tokens":{tokens}}}}}"#
        )
        .unwrap();
        file
    }

    // ── Ladder selection ───────────────────────────────────────────

    #[test]
    fn ladder_below_60_is_none() {
        assert_eq!(warning_level(0.0), None);
        assert_eq!(warning_level(59.9), None);
    }

    #[test]
    fn ladder_boundaries() {
        assert_eq!(warning_level(60.0), Some(60));
        assert_eq!(warning_level(74.9), Some(60));
        assert_eq!(warning_level(75.0), Some(75));
        assert_eq!(warning_level(84.9), Some(75));
        assert_eq!(warning_level(85.0), Some(85));
        assert_eq!(warning_level(94.9), Some(85));
        assert_eq!(warning_level(95.0), Some(95));
        assert_eq!(warning_level(120.0), Some(95));
    }

    // ── Evaluation ─────────────────────────────────────────────────

    #[test]
    fn below_ladder_is_silent_and_writes_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let transcript = transcript_with_tokens(50_000);

        let monitor = ContextMonitor::new(&store, 200_000);
        assert!(monitor.evaluate_at(transcript.path(), "s1", 1000).is_none());
        assert!(store.load::<ContextState>(&state_key("s1")).is_none());
    }

    #[test]
    fn missing_transcript_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let monitor = ContextMonitor::new(&store, 200_000);
        assert!(
            monitor
                .evaluate_at(Path::new("/nonexistent.jsonl"), "s1", 1000)
                .is_none()
        );
    }

    #[test]
    fn crossing_emits_warning_and_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let transcript = transcript_with_tokens(150_000); // 75%

        let monitor = ContextMonitor::new(&store, 200_000);
        let output = monitor.evaluate_at(transcript.path(), "s1", 1000).unwrap();

        assert!(output.system_message.unwrap().contains("Context at 75%"));
        let specific = output.hook_specific_output.unwrap();
        assert_eq!(specific.hook_event_name, "PostToolUse");
        assert_eq!(specific.additional_context, "Context usage: 75.0%");

        let state: ContextState = store.load(&state_key("s1")).unwrap();
        assert_eq!(state.last_warning_level, Some(75));
        assert_eq!(state.last_warning_time, Some(1000));
    }

    #[test]
    fn throttle_suppresses_sub_critical_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let transcript = transcript_with_tokens(150_000); // 75%
        let monitor = ContextMonitor::new(&store, 200_000);

        assert!(monitor.evaluate_at(transcript.path(), "s1", 1000).is_some());
        // 10s later: inside the 30s window, suppressed with no state change.
        assert!(monitor.evaluate_at(transcript.path(), "s1", 1010).is_none());
        let state: ContextState = store.load(&state_key("s1")).unwrap();
        assert_eq!(state.last_warning_time, Some(1000));
        // 31s later: window elapsed, warning fires again.
        assert!(monitor.evaluate_at(transcript.path(), "s1", 1031).is_some());
    }

    #[test]
    fn critical_levels_bypass_throttle() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let monitor = ContextMonitor::new(&store, 200_000);

        let transcript = transcript_with_tokens(170_000); // 85%
        assert!(monitor.evaluate_at(transcript.path(), "s1", 1000).is_some());
        assert!(monitor.evaluate_at(transcript.path(), "s1", 1010).is_some());

        let critical = transcript_with_tokens(195_000); // 97.5%
        let output = monitor.evaluate_at(critical.path(), "s1", 1011).unwrap();
        assert!(output.system_message.unwrap().starts_with("CRITICAL"));
    }

    #[test]
    fn corrupt_state_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::write(dir.path().join(format!("{}.json", state_key("s1"))), "junk").unwrap();

        let transcript = transcript_with_tokens(150_000);
        let monitor = ContextMonitor::new(&store, 200_000);
        assert!(monitor.evaluate_at(transcript.path(), "s1", 1000).is_some());
    }

    #[test]
    fn sessions_throttle_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let transcript = transcript_with_tokens(150_000);
        let monitor = ContextMonitor::new(&store, 200_000);

        assert!(monitor.evaluate_at(transcript.path(), "s1", 1000).is_some());
        assert!(monitor.evaluate_at(transcript.path(), "s2", 1005).is_some());
    }

    #[test]
    fn percentage_reflects_custom_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let transcript = transcript_with_tokens(90_000);

        // 90k of 100k = 90% → level 85.
        let monitor = ContextMonitor::new(&store, 100_000);
        let output = monitor.evaluate_at(transcript.path(), "s1", 1000).unwrap();
        let specific = output.hook_specific_output.unwrap();
        assert_eq!(specific.additional_context, "Context usage: 90.0%");
    }
}
