//! Resolved-once configuration passed into every handler.
//!
//! All environment and directory lookups happen in [`Config::resolve`] at
//! startup; handlers receive the explicit structure and never consult the
//! environment themselves.

use std::path::{Path, PathBuf};

/// Environment variable overriding the base config directory.
pub const HOME_ENV: &str = "LATCH_HOME";

/// Default context window size in tokens.
pub const DEFAULT_MAX_TOKENS: u64 = 200_000;

/// Configuration for one handler invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory holding `sessions/`, `plans/`, and `learned-skills/`.
    pub config_dir: PathBuf,
    /// Directory for per-session state files (context monitor, stop gate).
    pub state_dir: PathBuf,
    /// Context window size used for budget percentage calculations.
    pub max_tokens: u64,
}

impl Config {
    /// Resolve the configuration from CLI overrides and the environment.
    ///
    /// Precedence for the base directory: explicit `config_dir` argument,
    /// then `$LATCH_HOME`, then `$HOME/.latch`. State files always go to
    /// the system temp directory.
    pub fn resolve(config_dir: Option<PathBuf>, max_tokens: Option<u64>) -> Self {
        let config_dir = config_dir
            .or_else(|| std::env::var_os(HOME_ENV).map(PathBuf::from))
            .unwrap_or_else(|| home_dir().join(".latch"));
        Self {
            config_dir,
            state_dir: std::env::temp_dir(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    /// Directory holding per-day session records and the compaction log.
    pub fn sessions_dir(&self) -> PathBuf {
        self.config_dir.join("sessions")
    }

    /// Directory holding external plan checklists (read-only input).
    pub fn plans_dir(&self) -> PathBuf {
        self.config_dir.join("plans")
    }

    /// Directory holding learned-skill notes.
    pub fn learned_dir(&self) -> PathBuf {
        self.config_dir.join("learned-skills")
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}
