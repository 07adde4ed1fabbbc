//! Command-line interface definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ghinbox", version, about = "Mirror and triage GitHub notifications locally")]
pub struct Args {
    /// User to act on. Defaults to GHINBOX_USER_ID, then "default".
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Also write logs to a daily rolling file in this directory.
    #[arg(long, global = true, env = "GHINBOX_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update the user and mark setup as complete.
    Init(InitArgs),

    /// Fetch new notifications and process them.
    Sync,

    /// Backfill an older window of notifications.
    SyncOlder {
        /// Length of the window in days.
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// End of the window (RFC 3339). Defaults to the oldest synced
        /// notification, or now.
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        #[arg(long)]
        max_count: Option<usize>,

        #[arg(long)]
        unread_only: bool,
    },

    /// Apply a rule to every notification it currently matches.
    ApplyRule { rule_id: String },

    /// Delete old archived notifications.
    ///
    /// Uses the stored retention settings unless --days is given.
    Cleanup(CleanupArgs),

    /// Count what a cleanup would delete.
    CleanupPreview(CleanupArgs),

    /// Apply database migrations and exit.
    Migrate,
}

#[derive(ClapArgs, Debug)]
pub struct InitArgs {
    /// Only import notifications from the last N days on the first sync.
    #[arg(long)]
    pub initial_sync_days: Option<u32>,

    /// Import at most N notifications on the first sync.
    #[arg(long)]
    pub initial_sync_max_count: Option<usize>,

    /// Only import unread notifications on the first sync.
    #[arg(long)]
    pub initial_sync_unread_only: bool,

    /// Enable retention cleanup with this many days.
    #[arg(long)]
    pub retention_days: Option<i64>,

    /// Allow cleanup to delete starred notifications.
    #[arg(long)]
    pub no_protect_starred: bool,

    /// Allow cleanup to delete tagged notifications.
    #[arg(long)]
    pub no_protect_tagged: bool,
}

#[derive(ClapArgs, Debug)]
pub struct CleanupArgs {
    /// Retention in days; overrides the stored settings.
    #[arg(long)]
    pub days: Option<i64>,

    #[arg(long)]
    pub no_protect_starred: bool,

    #[arg(long)]
    pub no_protect_tagged: bool,
}
