//! Session-continuity and token-budget lifecycle hooks.
//!
//! `latch` is the stateful half of an agent tooling layer: a set of
//! event-triggered handlers invoked at discrete lifecycle points that track
//! token-budget consumption and completion-gate state across otherwise
//! stateless process invocations. The dispatcher delivers one JSON event per
//! invocation on stdin; [`dispatch`] decodes it once at the boundary, routes
//! it to the owning handler, and returns at most one [`HookOutput`] for
//! stdout.
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`event`] | [`HookEvent`] decoding and the [`HookOutput`] envelope |
//! | [`config`] | [`Config`] resolved once from CLI flags and environment |
//! | [`state`] | [`StateStore`] — atomic file-backed per-session state |
//! | [`transcript`] | newest assistant [`UsageRecord`] from the JSONL log |
//! | [`monitor`] | [`ContextMonitor`] — warning ladder, throttle, state |
//! | [`gate`] | [`PlanGate`] — veto stops while plan tasks are unchecked |
//! | [`ledger`] | [`SessionLedger`] — per-day records, compaction log |
//!
//! # Design principles
//!
//! 1. **Fail open.** These handlers are advisory. A missing transcript, an
//!    unreadable plan, a corrupt state file, or a failed save all degrade to
//!    silence; nothing here may ever halt the host agent loop.
//!
//! 2. **Rename is the atomicity boundary.** Per-session state is one JSON
//!    file per key, written to a temp path and renamed into place. Readers
//!    never observe a torn write; concurrent writers are last-writer-wins
//!    by design.
//!
//! 3. **Blocking is data, not an exit code.** The only control signal is the
//!    plan gate's `decision: "block"` field. The process exits successfully
//!    in every case short of host-level failure.

pub mod config;
pub mod event;
pub mod gate;
pub mod ledger;
pub mod monitor;
pub mod state;
pub mod transcript;

pub use config::Config;
pub use event::{HookEvent, HookOutput};
pub use gate::PlanGate;
pub use ledger::SessionLedger;
pub use monitor::ContextMonitor;
pub use state::StateStore;
pub use transcript::UsageRecord;

use std::path::Path;
use tracing::debug;

/// Decode one raw stdin document and run the handler that owns its event
/// type. Returns the diagnostic to print, or `None` to stay silent.
pub fn dispatch(config: &Config, input: &str) -> Option<HookOutput> {
    match HookEvent::decode(input) {
        HookEvent::PostToolUse {
            session_id,
            transcript_path,
        } => {
            if session_id.is_empty() || transcript_path.is_empty() {
                debug!("PostToolUse without session or transcript; ignoring");
                return None;
            }
            let store = StateStore::new(&config.state_dir);
            ContextMonitor::new(&store, config.max_tokens)
                .evaluate(Path::new(&transcript_path), &session_id)
        }
        HookEvent::Stop {
            session_id,
            cwd,
            stop_hook_active,
        } => {
            let cwd = cwd.filter(|c| !c.is_empty()).or_else(|| {
                std::env::current_dir()
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned())
            })?;
            let store = StateStore::new(&config.state_dir);
            PlanGate::new(config.plans_dir(), &store).evaluate(
                &cwd,
                stop_hook_active,
                &session_id,
            )
        }
        HookEvent::SessionStart { .. } => ledger_for(config).on_session_start(),
        HookEvent::SessionEnd { .. } => ledger_for(config).on_session_end(),
        HookEvent::PreCompact { .. } => ledger_for(config).on_pre_compact(),
        HookEvent::Malformed => {
            debug!("malformed or unknown hook event; ignoring");
            None
        }
    }
}

fn ledger_for(config: &Config) -> SessionLedger {
    SessionLedger::new(config.sessions_dir(), config.learned_dir())
}
