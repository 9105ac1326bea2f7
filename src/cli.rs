use crate::config::Settings;
use crate::sync::command::SyncDirection;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vaultsync")]
#[command(about = "Sync a notes folder with a cloud remote through rclone", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Two-way sync with the configured remote
    vaultsync

    # Upload local changes only
    vaultsync push --local ~/Notes --remote gdrive:notes_vault

    # Download remote changes only
    vaultsync pull

    # Run rclone on the host from inside a Flatpak sandbox
    vaultsync --host-prefix flatpak-spawn --host-prefix --host

    # Open conflicts in kdiff3 and push the merged result afterwards
    vaultsync bisync --merge-tool kdiff3 --auto-resolve

    # Machine-readable progress (NDJSON)
    vaultsync --json")]
pub struct Cli {
    /// Direction to sync (push, pull or bisync)
    #[arg(value_enum, default_value = "bisync")]
    pub direction: SyncDirection,

    /// Local notes directory (default: ~/Notes)
    #[arg(long, env = "VAULTSYNC_LOCAL")]
    pub local: Option<String>,

    /// rclone remote, passed through verbatim (default: gdrive:notes_vault)
    #[arg(long, env = "VAULTSYNC_REMOTE")]
    pub remote: Option<String>,

    /// After resolving a bisync conflict, push the merged file back
    #[arg(long)]
    pub auto_resolve: bool,

    /// rclone binary to run
    #[arg(long)]
    pub rclone: Option<String>,

    /// Argument prepended to every spawned command (can be repeated)
    #[arg(long, allow_hyphen_values = true)]
    pub host_prefix: Vec<String>,

    /// Merge tool program followed by its leading arguments (can be repeated)
    #[arg(long, allow_hyphen_values = true)]
    pub merge_tool: Vec<String>,

    /// Lock-file cleanups to attempt before giving up (default: 3)
    #[arg(long)]
    pub max_lock_retries: Option<u32>,

    /// Print progress as NDJSON events on stdout
    #[arg(long)]
    pub json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only show errors)
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: ~/.config/vaultsync/config.toml)
    #[arg(long, env = "VAULTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use settings from a named profile in the config file
    #[arg(long)]
    pub profile: Option<String>,

    /// List all available profiles
    #[arg(long)]
    pub list_profiles: bool,

    /// Show details of a specific profile
    #[arg(long)]
    pub show_profile: Option<String>,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.quiet && self.verbose > 0 {
            anyhow::bail!("--quiet and --verbose cannot be used together");
        }

        if let Some(local) = &self.local {
            if local.trim().is_empty() {
                anyhow::bail!("--local cannot be empty");
            }
        }
        if let Some(remote) = &self.remote {
            if remote.trim().is_empty() {
                anyhow::bail!("--remote cannot be empty");
            }
        }

        if self.auto_resolve && self.direction != SyncDirection::Bidirectional {
            anyhow::bail!("--auto-resolve only applies to bisync");
        }

        Ok(())
    }

    /// Settings given on the command line, to overlay on the config file
    pub fn overrides(&self) -> Settings {
        Settings {
            local: self.local.clone(),
            remote: self.remote.clone(),
            auto_resolve_conflicts: self.auto_resolve.then_some(true),
            rclone: self.rclone.clone(),
            host_prefix: (!self.host_prefix.is_empty()).then(|| self.host_prefix.clone()),
            merge_tool: (!self.merge_tool.is_empty()).then(|| self.merge_tool.clone()),
            max_lock_retries: self.max_lock_retries,
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        if self.quiet || self.json {
            return tracing::Level::ERROR;
        }

        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
