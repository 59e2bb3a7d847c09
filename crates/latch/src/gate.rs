//! Plan gate: veto a stop attempt while a relevant plan has unchecked tasks.
//!
//! Plans are external, read-only markdown checklists. A plan is relevant to
//! the current working directory when its content contains the absolute cwd,
//! its base name, or `./` plus the base name. The gate blocks the first
//! relevant plan that still has `- [ ]` / `* [ ]` items and records the
//! block; a second stop attempt within the escape window is allowed through.
//!
//! Every filesystem error is fail-open: never blocking the user outranks
//! strict enforcement.

use crate::event::HookOutput;
use crate::state::{StateStore, epoch_secs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Seconds after a block during which a repeated stop attempt is allowed.
const ESCAPE_WINDOW_SECS: u64 = 60;

/// Maximum unchecked tasks quoted in the block reason.
const TASK_PREVIEW_LIMIT: usize = 3;

/// Persisted per-session gate state; same leak policy as the monitor's.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GateState {
    /// Unix epoch seconds of the last block this gate issued.
    #[serde(default)]
    pub last_block_time: Option<u64>,
}

/// Gates stop attempts against outstanding plan checklists.
#[derive(Debug)]
pub struct PlanGate<'a> {
    plans_dir: PathBuf,
    store: &'a StateStore,
}

impl<'a> PlanGate<'a> {
    /// Create a gate scanning `plans_dir` and keeping escape-hatch state in
    /// `store`.
    pub fn new(plans_dir: impl Into<PathBuf>, store: &'a StateStore) -> Self {
        Self {
            plans_dir: plans_dir.into(),
            store,
        }
    }

    /// Decide whether the stop attempt may proceed. `None` allows; a
    /// [`HookOutput::block`] vetoes.
    pub fn evaluate(
        &self,
        cwd: &str,
        stop_hook_active: bool,
        session_id: &str,
    ) -> Option<HookOutput> {
        self.evaluate_at(cwd, stop_hook_active, session_id, epoch_secs())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock, for tests.
    pub fn evaluate_at(
        &self,
        cwd: &str,
        stop_hook_active: bool,
        session_id: &str,
        now: u64,
    ) -> Option<HookOutput> {
        // Terminal recursion guard: this stop attempt was triggered by our
        // own prior block decision.
        if stop_hook_active {
            return None;
        }

        let (plan_name, unchecked) = self.find_unchecked(cwd)?;

        if !session_id.is_empty() {
            let key = state_key(session_id);
            let state: GateState = self.store.load(&key).unwrap_or_default();

            if let Some(last) = state.last_block_time
                && now.saturating_sub(last) <= ESCAPE_WINDOW_SECS
            {
                debug!(
                    tasks = unchecked.len(),
                    "escape hatch: repeated stop attempt, allowing"
                );
                if let Err(e) = self.store.save(&key, &GateState::default()) {
                    warn!("Failed to clear gate state: {e}");
                }
                return None;
            }

            if let Err(e) = self.store.save(
                &key,
                &GateState {
                    last_block_time: Some(now),
                },
            ) {
                warn!("Failed to persist gate state: {e}");
            }
        }

        Some(HookOutput::block(block_reason(&plan_name, &unchecked)))
    }

    /// Scan the plans directory for the first plan relevant to `cwd` that
    /// still has unchecked tasks. Any scan failure reads as "nothing found".
    fn find_unchecked(&self, cwd: &str) -> Option<(String, Vec<String>)> {
        if !self.plans_dir.is_dir() {
            return None;
        }

        let entries = match std::fs::read_dir(&self.plans_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read plans dir, allowing stop: {e}");
                return None;
            }
        };

        let basename = Path::new(cwd)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".md"))
            .collect();
        names.sort();

        for name in names {
            let Ok(content) = std::fs::read_to_string(self.plans_dir.join(&name)) else {
                continue;
            };

            let relevant = content.contains(cwd)
                || (!basename.is_empty()
                    && (content.contains(&basename) || content.contains(&format!("./{basename}"))));
            if !relevant {
                continue;
            }

            let unchecked: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| line.starts_with("- [ ]") || line.starts_with("* [ ]"))
                .map(String::from)
                .collect();

            if !unchecked.is_empty() {
                return Some((name, unchecked));
            }
        }
        None
    }
}

fn state_key(session_id: &str) -> String {
    format!("latch-stop-gate-{session_id}")
}

fn block_reason(plan_name: &str, unchecked: &[String]) -> String {
    let preview: Vec<String> = unchecked
        .iter()
        .take(TASK_PREVIEW_LIMIT)
        .map(|task| format!("  {task}"))
        .collect();
    let overflow = if unchecked.len() > TASK_PREVIEW_LIMIT {
        format!(" (+{} more)", unchecked.len() - TASK_PREVIEW_LIMIT)
    } else {
        String::new()
    };

    format!(
        "Cannot stop: {} incomplete task(s) in plan ({plan_name}):\n{}{overflow}\n\
         Complete the tasks or use /pause first. (Stop again within 60s to override)",
        unchecked.len(),
        preview.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        plans_dir: PathBuf,
        store: StateStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let plans_dir = dir.path().join("plans");
        std::fs::create_dir_all(&plans_dir).unwrap();
        let store = StateStore::new(dir.path().join("state"));
        Fixture {
            plans_dir,
            store,
            _dir: dir,
        }
    }

    fn write_plan(fx: &Fixture, name: &str, content: &str) {
        std::fs::write(fx.plans_dir.join(name), content).unwrap();
    }

    #[test]
    fn blocks_on_relevant_plan_with_unchecked_task() {
        let fx = fixture();
        write_plan(
            &fx,
            "plan.md",
            "/work/project\n- [x] Done task\n- [ ] Pending task\n",
        );

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        let output = gate
            .evaluate_at("/work/project", false, "s1", 1000)
            .unwrap();
        assert!(output.is_block());
        let reason = output.reason.unwrap();
        assert!(reason.contains("1 incomplete task(s)"));
        assert!(reason.contains("plan.md"));
        assert!(reason.contains("- [ ] Pending task"));
    }

    #[test]
    fn zero_unchecked_never_blocks() {
        let fx = fixture();
        write_plan(&fx, "done.md", "/work/project\n- [x] Task 1\n- [x] Task 2\n");

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        assert!(gate.evaluate_at("/work/project", false, "s1", 1000).is_none());
    }

    #[test]
    fn irrelevant_plan_is_ignored() {
        let fx = fixture();
        write_plan(&fx, "other.md", "/workspace/alpha-app\n- [ ] Some task\n");

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        assert!(
            gate.evaluate_at("/workspace/beta-app", false, "s1", 1000)
                .is_none()
        );
    }

    #[test]
    fn basename_match_is_relevant() {
        let fx = fixture();
        write_plan(&fx, "plan.md", "Work happening in ./myproj today\n- [ ] Ship it\n");

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        assert!(
            gate.evaluate_at("/home/user/myproj", false, "s1", 1000)
                .is_some()
        );
    }

    #[test]
    fn recursion_flag_always_allows() {
        let fx = fixture();
        write_plan(&fx, "plan.md", "/work/project\n- [ ] Pending\n");

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        assert!(gate.evaluate_at("/work/project", true, "s1", 1000).is_none());
    }

    #[test]
    fn missing_plans_dir_allows() {
        let fx = fixture();
        let gate = PlanGate::new(fx.plans_dir.join("nope"), &fx.store);
        assert!(gate.evaluate_at("/work/project", false, "s1", 1000).is_none());
    }

    #[test]
    fn non_markdown_files_are_skipped() {
        let fx = fixture();
        write_plan(&fx, "notes.txt", "/work/project\n- [ ] Not a plan\n");

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        assert!(gate.evaluate_at("/work/project", false, "s1", 1000).is_none());
    }

    #[test]
    fn escape_hatch_allows_second_attempt_within_window() {
        let fx = fixture();
        write_plan(&fx, "plan.md", "/work/project\n- [ ] Pending\n");
        let gate = PlanGate::new(&fx.plans_dir, &fx.store);

        assert!(gate.evaluate_at("/work/project", false, "s1", 1000).is_some());
        // 30s later: inside the 60s window, the override applies.
        assert!(gate.evaluate_at("/work/project", false, "s1", 1030).is_none());
        // The override cleared state, so the next attempt blocks again.
        assert!(gate.evaluate_at("/work/project", false, "s1", 1031).is_some());
    }

    #[test]
    fn escape_hatch_expires_after_window() {
        let fx = fixture();
        write_plan(&fx, "plan.md", "/work/project\n- [ ] Pending\n");
        let gate = PlanGate::new(&fx.plans_dir, &fx.store);

        assert!(gate.evaluate_at("/work/project", false, "s1", 1000).is_some());
        assert!(gate.evaluate_at("/work/project", false, "s1", 1061).is_some());
    }

    #[test]
    fn task_preview_caps_at_three() {
        let fx = fixture();
        write_plan(
            &fx,
            "big.md",
            "/work/project\n- [ ] a\n- [ ] b\n- [ ] c\n- [ ] d\n- [ ] e\n",
        );

        let gate = PlanGate::new(&fx.plans_dir, &fx.store);
        let reason = gate
            .evaluate_at("/work/project", false, "s1", 1000)
            .unwrap()
            .reason
            .unwrap();
        assert!(reason.contains("5 incomplete task(s)"));
        assert!(reason.contains("(+2 more)"));
        assert!(reason.contains("- [ ] c"));
        assert!(!reason.contains("- [ ] d"));
    }

    #[test]
    fn empty_session_id_skips_escape_state() {
        let fx = fixture();
        write_plan(&fx, "plan.md", "/work/project\n- [ ] Pending\n");
        let gate = PlanGate::new(&fx.plans_dir, &fx.store);

        // Without a session id there is no escape state, so every attempt blocks.
        assert!(gate.evaluate_at("/work/project", false, "", 1000).is_some());
        assert!(gate.evaluate_at("/work/project", false, "", 1010).is_some());
    }
}
