//! Read one lifecycle event from stdin and answer on stdout.
//!
//! Designed to be wired into an agent's hook configuration, one invocation
//! per event:
//!
//! ```json
//! {
//!   "hooks": {
//!     "PostToolUse": [{ "command": "latch" }],
//!     "Stop":        [{ "command": "latch" }],
//!     "SessionStart":[{ "command": "latch" }],
//!     "SessionEnd":  [{ "command": "latch" }],
//!     "PreCompact":  [{ "command": "latch" }]
//!   }
//! }
//! ```
//!
//! The process exits successfully in every case short of host-level failure;
//! a veto is communicated through the `decision` field of the output
//! document. Diagnostics go to stderr (`RUST_LOG` controls verbosity),
//! keeping stdout clean for the single JSON answer.

use clap::Parser;
use latch::Config;
use std::io::Read;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Session-continuity and token-budget lifecycle hooks.
#[derive(Parser)]
#[command(name = "latch", version)]
struct Cli {
    /// Base directory for sessions, plans, and learned skills
    /// (default: $LATCH_HOME, then ~/.latch)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Context window size in tokens for budget percentage calculations
    #[arg(long)]
    max_tokens: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(cli.config_dir, cli.max_tokens);

    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        // Unreadable primary input: the event is inapplicable, not an error.
        return;
    }

    if let Some(output) = latch::dispatch(&config, &input) {
        match serde_json::to_string(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to serialize output: {e}"),
        }
    }
}
