//! Session ledger: per-day session records, the compaction log, and the
//! session-start inventory.
//!
//! The ledger owns two directories: `sessions/` (one markdown record per
//! calendar date plus an append-only compaction log) and `learned-skills/`.
//! Records are created on the first `SessionEnd` of the day and thereafter
//! mutated in place by substituting the `**Last Updated:**` line; nothing in
//! here is ever deleted or rotated. All failures degrade to silence.

use crate::event::HookOutput;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Session files modified within this window count as "recent".
const RECENT_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Line label rewritten on every repeated `SessionEnd` of the same day.
const LAST_UPDATED_LABEL: &str = "**Last Updated:**";

/// Append-only log of compaction events, growing without bound.
const COMPACTION_LOG: &str = "compaction-log.txt";

/// Tracks session continuity across start/end/compaction events.
#[derive(Debug, Clone)]
pub struct SessionLedger {
    sessions_dir: PathBuf,
    learned_dir: PathBuf,
}

impl SessionLedger {
    /// Create a ledger over the given session and learned-skill directories.
    pub fn new(sessions_dir: impl Into<PathBuf>, learned_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            learned_dir: learned_dir.into(),
        }
    }

    /// Path of the session record for the given date.
    pub fn record_path(&self, date: &str) -> PathBuf {
        self.sessions_dir.join(format!("{date}-session.tmp"))
    }

    // ── SessionStart ───────────────────────────────────────────────

    /// Ensure the ledger directories exist and report what carried over:
    /// recent session records and available learned skills. Informational
    /// only; nothing is mutated beyond directory creation.
    pub fn on_session_start(&self) -> Option<HookOutput> {
        for dir in [&self.sessions_dir, &self.learned_dir] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create {}: {e}", dir.display());
            }
        }

        let mut messages = Vec::new();

        let recent = self.session_files(Some(RECENT_WINDOW));
        if let Some(latest) = recent.first() {
            messages.push(format!(
                "Found {} recent session(s). Latest: {}",
                recent.len(),
                latest.display()
            ));
        }

        let learned = count_files_with_extension(&self.learned_dir, "md");
        if learned > 0 {
            messages.push(format!(
                "{learned} learned skill(s) available in {}",
                self.learned_dir.display()
            ));
        }

        if messages.is_empty() {
            return None;
        }
        let summary = messages.join(". ");
        Some(HookOutput::advisory("SessionStart", summary.clone(), summary))
    }

    // ── SessionEnd ─────────────────────────────────────────────────

    /// Create or update today's session record.
    pub fn on_session_end(&self) -> Option<HookOutput> {
        self.on_session_end_at(Local::now())
    }

    /// [`on_session_end`](Self::on_session_end) with an explicit clock.
    ///
    /// Repeatable: a record that already exists only has its
    /// `**Last Updated:**` line rewritten; the body is untouched.
    pub fn on_session_end_at(&self, now: DateTime<Local>) -> Option<HookOutput> {
        if let Err(e) = std::fs::create_dir_all(&self.sessions_dir) {
            warn!("Failed to create sessions dir: {e}");
            return None;
        }

        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M:%S").to_string();
        let path = self.record_path(&date);

        if path.exists() {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read session record: {e}");
                    return None;
                }
            };
            let updated = replace_first_line(
                &content,
                LAST_UPDATED_LABEL,
                &format!("{LAST_UPDATED_LABEL} {time}"),
            );
            if let Err(e) = std::fs::write(&path, updated) {
                warn!("Failed to update session record: {e}");
                return None;
            }
            Some(HookOutput::message(format!(
                "Session record updated: {}",
                path.display()
            )))
        } else {
            if let Err(e) = std::fs::write(&path, record_template(&date, &time)) {
                warn!("Failed to create session record: {e}");
                return None;
            }
            Some(HookOutput::message(format!(
                "Session record created: {}",
                path.display()
            )))
        }
    }

    // ── PreCompact ─────────────────────────────────────────────────

    /// Log the compaction event and mark the active session record.
    pub fn on_pre_compact(&self) -> Option<HookOutput> {
        self.on_pre_compact_at(Local::now())
    }

    /// [`on_pre_compact`](Self::on_pre_compact) with an explicit clock.
    pub fn on_pre_compact_at(&self, now: DateTime<Local>) -> Option<HookOutput> {
        if let Err(e) = std::fs::create_dir_all(&self.sessions_dir) {
            warn!("Failed to create sessions dir: {e}");
            return None;
        }

        let timestamp = now.format("%Y-%m-%dT%H:%M:%S").to_string();
        let line = format!("[{timestamp}] Context compaction triggered\n");
        if let Err(e) = append(&self.sessions_dir.join(COMPACTION_LOG), &line) {
            warn!("Failed to append compaction log: {e}");
            return None;
        }

        // Mark the newest recent session record, if any.
        let recent = self.session_files(Some(RECENT_WINDOW));
        if let Some(active) = recent.first() {
            let time = now.format("%H:%M:%S");
            let marker = format!("\n---\n**[Compaction at {time}]** - Context summarized\n");
            if let Err(e) = append(active, &marker) {
                warn!("Failed to mark session record: {e}");
            }
        }

        Some(HookOutput::message(format!(
            "Compaction state saved at {timestamp}"
        )))
    }

    /// Session record files (`*.tmp`), newest first, optionally limited to
    /// files modified within `max_age`. Scan failures read as empty.
    fn session_files(&self, max_age: Option<Duration>) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.sessions_dir) else {
            return Vec::new();
        };

        let now = std::time::SystemTime::now();
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .filter_map(|entry| {
                let mtime = entry.metadata().ok()?.modified().ok()?;
                Some((mtime, entry.path()))
            })
            .filter(|(mtime, _)| match max_age {
                Some(age) => now.duration_since(*mtime).is_ok_and(|d| d <= age),
                None => true,
            })
            .collect();

        files.sort_by(|a, b| b.0.cmp(&a.0));
        files.into_iter().map(|(_, path)| path).collect()
    }
}

fn count_files_with_extension(dir: &Path, ext: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| entry.path().extension().is_some_and(|e| e == ext))
        .count()
}

fn append(path: &Path, content: &str) -> Result<(), String> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to append to {}: {e}", path.display()))
}

/// Replace the first line starting with `label`, leaving everything else
/// (including the trailing newline) exactly as it was.
fn replace_first_line(content: &str, label: &str, replacement: &str) -> String {
    let mut replaced = false;
    let mut out: Vec<&str> = Vec::new();
    for line in content.lines() {
        if !replaced && line.starts_with(label) {
            out.push(replacement);
            replaced = true;
        } else {
            out.push(line);
        }
    }
    let mut joined = out.join("\n");
    if content.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

fn record_template(date: &str, time: &str) -> String {
    format!(
        "# Session: {date}\n\
         **Date:** {date}\n\
         **Started:** {time}\n\
         {LAST_UPDATED_LABEL} {time}\n\
         \n\
         ---\n\
         \n\
         ## Current State\n\
         \n\
         [Session context goes here]\n\
         \n\
         ### Completed\n\
         - [ ]\n\
         \n\
         ### In Progress\n\
         - [ ]\n\
         \n\
         ### Notes for Next Session\n\
         -\n\
         \n\
         ### Context to Load\n\
         ```\n\
         [relevant files]\n\
         ```\n"
    )
}
