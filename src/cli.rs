//! CLI struct definitions for the `bloom` command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `main.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "bloom",
    version = env!("CARGO_PKG_VERSION"),
    about = "Intent lifecycle engine: nucleus-scoped state, framed transport to a native host, response staging and merge.",
    disable_version_flag = true
)]
pub struct Cli {
    /// Project root to operate in (defaults to walking up from the current directory for `.bloom/`).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize `.bloom/` in the target directory (defaults to the current directory).
    Init {
        #[clap(long)]
        dir: Option<PathBuf>,
    },

    /// Show version information.
    Version,

    /// Intent lifecycle: create, list, inspect.
    Intent(IntentCli),

    /// Lock management for an intent.
    Lock(LockCli),

    /// Submit a built payload to the native host.
    Submit(SubmitCli),

    /// Receive an AI response and extract its referenced files.
    Response(ResponseCli),

    /// Stage extracted response files into a mirror tree with a manifest.
    Stage(StageCli),

    /// Validate staged files against their manifest and write a report.
    Validate(ValidateCli),

    /// Parse and validate a raw response envelope without staging it.
    Parse(ParseCli),

    /// Merge a validated stage's files into the project.
    Merge(MergeCli),

    /// Recover intents left locked by an interrupted process.
    Recover(RecoverCli),

    /// Discover a reachable native host by scanning the ping port range.
    Ping(PingCli),
}

#[derive(clap::Args, Debug)]
pub struct IntentCli {
    #[clap(subcommand)]
    pub command: IntentCommand,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum IntentKindArg {
    Dev,
    Doc,
}

#[derive(Subcommand, Debug)]
pub enum IntentCommand {
    /// Create a new intent.
    Create {
        #[clap(long, value_enum)]
        kind: IntentKindArg,
        /// Human-readable intent name; also seeds the deterministic uuid and folder slug.
        #[clap(long)]
        name: String,
        /// Initial file references attached to the intent (repeatable).
        #[clap(long = "file")]
        files: Vec<String>,
    },

    /// List intents of a kind, or all intents if omitted.
    List {
        #[clap(long, value_enum)]
        kind: Option<IntentKindArg>,
    },

    /// Show an intent's current state.
    Status {
        /// Folder name or uuid.
        id: String,
    },

    /// Delete an intent. Refuses a locked intent unless `--force`.
    Delete {
        id: String,
        #[clap(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct LockCli {
    #[clap(subcommand)]
    pub command: LockCommand,
}

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Acquire the lock on an intent.
    Acquire {
        id: String,
        /// Operation name recorded on the lock (e.g. `merging`, `downloading_response`).
        #[clap(long)]
        operation: String,
        /// JSON object merged into `lock.recovery_data`.
        #[clap(long)]
        recovery_data: Option<String>,
    },
    /// Release the lock on an intent.
    Release {
        id: String,
        #[clap(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct SubmitCli {
    /// Folder name or uuid of the intent to submit.
    pub id: String,
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,
    #[clap(long)]
    pub port: Option<u16>,
    #[clap(long)]
    pub provider: String,
    /// Path to a built payload JSON document (see `Payload`, §4.6).
    #[clap(long)]
    pub payload: PathBuf,
    #[clap(long)]
    pub profile: Option<String>,
    #[clap(long)]
    pub connect_timeout_secs: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct ResponseCli {
    #[clap(subcommand)]
    pub command: ResponseCommand,
}

#[derive(Subcommand, Debug)]
pub enum ResponseCommand {
    /// Listen on a socket for exactly one incoming response envelope.
    Listen {
        id: String,
        /// Stage directory name under `.pipeline/` (e.g. `briefing`, `execution`, `refinement_1`).
        #[clap(long)]
        stage: String,
        #[clap(long, default_value = "0.0.0.0")]
        host: String,
        #[clap(long)]
        port: Option<u16>,
        #[clap(long)]
        accept_timeout_secs: Option<u64>,
    },
    /// Load a response envelope from a local file.
    FromFile {
        id: String,
        #[clap(long)]
        stage: String,
        #[clap(long)]
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct StageCli {
    pub id: String,
    #[clap(long)]
    pub stage: String,
    #[clap(long)]
    pub overwrite: bool,
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct ValidateCli {
    pub id: String,
    #[clap(long)]
    pub stage: String,
    #[clap(long)]
    pub auto_approve: bool,
}

#[derive(clap::Args, Debug)]
pub struct ParseCli {
    /// Path to a raw response envelope JSON document.
    pub path: PathBuf,
    /// Directory whose `.files/` subdirectory holds the files the envelope references.
    #[clap(long)]
    pub response_dir: PathBuf,
    #[clap(long)]
    pub strict: bool,
    #[clap(long)]
    pub expected_intent_uuid: String,
}

#[derive(clap::Args, Debug)]
pub struct MergeCli {
    pub id: String,
    #[clap(long)]
    pub stage: String,
    #[clap(long)]
    pub force: bool,
    #[clap(long)]
    pub dry_run: bool,
    #[clap(long)]
    pub no_backup: bool,
}

#[derive(clap::Args, Debug)]
pub struct RecoverCli {
    /// Recover a single intent instead of scanning every locked intent.
    pub id: Option<String>,
    #[clap(long)]
    pub force_unlock: bool,
}

#[derive(clap::Args, Debug)]
pub struct PingCli {
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,
    #[clap(long)]
    pub connect_timeout_ms: Option<u64>,
}
