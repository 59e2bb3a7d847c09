//! Hook event envelope: decoded input events and the output diagnostic.
//!
//! The dispatcher delivers exactly one JSON document on stdin per
//! invocation. [`HookEvent::decode`] validates it once at the boundary into
//! a tagged variant per hook type; anything unrecognized collapses into
//! [`HookEvent::Malformed`], which routes to the no-op path. Handlers answer
//! with at most one [`HookOutput`] on stdout. Blocking is communicated
//! through the `decision` field, never the process exit code.

use serde::{Deserialize, Serialize};

// ── Input events ───────────────────────────────────────────────────

/// A decoded lifecycle event, tagged by the `hook_event_name` field.
///
/// Field names match the wire format (snake_case). Missing optional fields
/// default to empty so handlers can apply their own guard conditions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookEvent {
    /// After a tool call completed. Drives the context budget monitor.
    PostToolUse {
        /// Session the tool call belongs to.
        #[serde(default)]
        session_id: String,
        /// Path to the conversation transcript (JSONL).
        #[serde(default)]
        transcript_path: String,
    },
    /// The agent is attempting to stop. Drives the plan gate.
    Stop {
        /// Session attempting to stop.
        #[serde(default)]
        session_id: String,
        /// Working directory of the session.
        #[serde(default)]
        cwd: Option<String>,
        /// Set when this stop attempt was itself triggered by a prior
        /// `block` decision. The gate must allow immediately in that case.
        #[serde(default)]
        stop_hook_active: bool,
    },
    /// A new session is starting.
    SessionStart {
        /// Session being started.
        #[serde(default)]
        session_id: String,
    },
    /// A session is ending.
    SessionEnd {
        /// Session being ended.
        #[serde(default)]
        session_id: String,
    },
    /// Context compaction is about to run.
    PreCompact {
        /// Session being compacted.
        #[serde(default)]
        session_id: String,
        /// What initiated the compaction (`"manual"` or `"auto"`).
        /// Carried from the event stream; currently informational only.
        #[serde(default)]
        trigger: Option<String>,
    },
    /// Unknown event type or undecodable input. Always a no-op.
    #[serde(other)]
    Malformed,
}

impl HookEvent {
    /// Decode a raw stdin document. Malformed JSON and unknown event tags
    /// both produce [`HookEvent::Malformed`] rather than an error: an
    /// unreadable event is treated as inapplicable, not fatal.
    pub fn decode(input: &str) -> Self {
        serde_json::from_str(input).unwrap_or(Self::Malformed)
    }
}

// ── Output diagnostic ──────────────────────────────────────────────

/// The only decision a handler can take besides staying silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Veto the current operation (stop attempt).
    Block,
}

/// Context payload nested under `hookSpecificOutput`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    /// Name of the event this output answers (e.g. `"PostToolUse"`).
    pub hook_event_name: String,
    /// Machine-readable context injected into the conversation.
    pub additional_context: String,
}

/// Diagnostic emitted on stdout. All fields are optional on the wire;
/// `None` fields are omitted entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// Set to [`Decision::Block`] to veto the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Why the operation was blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-visible advisory message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Machine-readable payload for the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookOutput {
    /// A `block` decision with a reason.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some(Decision::Block),
            reason: Some(reason.into()),
            system_message: None,
            hook_specific_output: None,
        }
    }

    /// An advisory with both a visible message and injected context.
    pub fn advisory(
        event_name: impl Into<String>,
        system_message: impl Into<String>,
        additional_context: impl Into<String>,
    ) -> Self {
        Self {
            decision: None,
            reason: None,
            system_message: Some(system_message.into()),
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: event_name.into(),
                additional_context: additional_context.into(),
            }),
        }
    }

    /// A visible message with no injected context.
    pub fn message(system_message: impl Into<String>) -> Self {
        Self {
            decision: None,
            reason: None,
            system_message: Some(system_message.into()),
            hook_specific_output: None,
        }
    }

    /// Whether this output vetoes the operation.
    pub fn is_block(&self) -> bool {
        self.decision == Some(Decision::Block)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
