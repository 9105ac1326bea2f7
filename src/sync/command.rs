use crate::error::{Result, SyncError};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;

/// Directories never transferred in either direction
pub const EXCLUDED_DIRS: &[&str] = &[".obsidian/**", ".git/**"];

/// Progress flags for a non-interactive, uncoloured run. Stats are logged at
/// INFO by default, below rclone's NOTICE threshold, so raise them.
const PROGRESS_FLAGS: &[&str] = &[
    "--stats",
    "1s",
    "--stats-one-line",
    "--stats-log-level",
    "NOTICE",
    "--color",
    "NEVER",
];

/// Which way data flows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local tree → remote
    #[value(name = "push")]
    PushLocalToRemote,
    /// Remote → local tree
    #[value(name = "pull")]
    PullRemoteToLocal,
    /// Reconcile changes on both sides
    #[value(name = "bisync")]
    Bidirectional,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::PushLocalToRemote => write!(f, "push"),
            SyncDirection::PullRemoteToLocal => write!(f, "pull"),
            SyncDirection::Bidirectional => write!(f, "bisync"),
        }
    }
}

/// Settings for one sync run, supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub local_path: String,
    /// Passed to the sync tool verbatim (e.g. `gdrive:"notes_vault"`)
    pub remote_path: String,
    /// Push the merged result back after a conflict was resolved
    pub auto_resolve_conflicts: bool,
}

impl SyncConfig {
    pub fn new(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            auto_resolve_conflicts: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_path.trim().is_empty() {
            return Err(SyncError::InvalidConfig("local path is empty".to_string()));
        }
        if self.remote_path.trim().is_empty() {
            return Err(SyncError::InvalidConfig("remote path is empty".to_string()));
        }
        Ok(())
    }
}

/// Produces the argument vector for the external sync tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCommandBuilder {
    /// Program plus any host-indirection prefix, e.g.
    /// `["flatpak-spawn", "--host", "rclone"]`
    launcher: Vec<String>,
}

impl SyncCommandBuilder {
    /// Builder for `program` run through an optional prefix
    pub fn with_prefix(prefix: &[String], program: &str) -> Self {
        let mut launcher = prefix.to_vec();
        launcher.push(program.to_string());
        Self { launcher }
    }

    pub fn launcher(&self) -> &[String] {
        &self.launcher
    }

    pub fn build(&self, direction: SyncDirection, config: &SyncConfig) -> Vec<String> {
        let local = config.local_path.as_str();
        let remote = config.remote_path.as_str();
        let (subcommand, source, destination) = match direction {
            SyncDirection::PushLocalToRemote => ("sync", local, remote),
            SyncDirection::PullRemoteToLocal => ("sync", remote, local),
            SyncDirection::Bidirectional => ("bisync", local, remote),
        };

        let mut argv = self.launcher.clone();
        argv.push(subcommand.to_string());
        argv.push(source.to_string());
        argv.push(destination.to_string());
        for pattern in EXCLUDED_DIRS {
            argv.push("--exclude".to_string());
            argv.push(pattern.to_string());
        }
        argv.extend(PROGRESS_FLAGS.iter().map(|s| s.to_string()));
        argv
    }
}

impl Default for SyncCommandBuilder {
    fn default() -> Self {
        Self::with_prefix(&[], "rclone")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> SyncConfig {
        SyncConfig::new("/home/me/Notes", "gdrive:\"notes_vault\"")
    }

    #[test]
    fn test_push_argv() {
        let argv = SyncCommandBuilder::default().build(SyncDirection::PushLocalToRemote, &config());
        assert_eq!(
            argv,
            vec![
                "rclone",
                "sync",
                "/home/me/Notes",
                "gdrive:\"notes_vault\"",
                "--exclude",
                ".obsidian/**",
                "--exclude",
                ".git/**",
                "--stats",
                "1s",
                "--stats-one-line",
                "--stats-log-level",
                "NOTICE",
                "--color",
                "NEVER",
            ]
        );
    }

    #[test]
    fn test_stats_visible_at_default_log_level() {
        for direction in [
            SyncDirection::PushLocalToRemote,
            SyncDirection::PullRemoteToLocal,
            SyncDirection::Bidirectional,
        ] {
            let argv = SyncCommandBuilder::default().build(direction, &config());
            let level = argv.iter().position(|a| a == "--stats-log-level").unwrap();
            assert_eq!(argv[level + 1], "NOTICE");
        }
    }

    #[test]
    fn test_pull_reverses_paths() {
        let argv = SyncCommandBuilder::default().build(SyncDirection::PullRemoteToLocal, &config());
        assert_eq!(&argv[1..4], &["sync", "gdrive:\"notes_vault\"", "/home/me/Notes"]);
    }

    #[test]
    fn test_bisync_subcommand() {
        let argv = SyncCommandBuilder::default().build(SyncDirection::Bidirectional, &config());
        assert_eq!(&argv[1..4], &["bisync", "/home/me/Notes", "gdrive:\"notes_vault\""]);
        assert_eq!(argv.iter().filter(|a| *a == "--exclude").count(), 2);
    }

    #[test]
    fn test_host_prefix_comes_first() {
        let prefix = vec!["flatpak-spawn".to_string(), "--host".to_string()];
        let builder = SyncCommandBuilder::with_prefix(&prefix, "rclone");
        let argv = builder.build(SyncDirection::Bidirectional, &config());
        assert_eq!(&argv[..4], &["flatpak-spawn", "--host", "rclone", "bisync"]);
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        assert!(config().validate().is_ok());
        assert!(SyncConfig::new("", "remote:x").validate().is_err());
        assert!(SyncConfig::new("/notes", "  ").validate().is_err());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(SyncDirection::PushLocalToRemote.to_string(), "push");
        assert_eq!(SyncDirection::Bidirectional.to_string(), "bisync");
    }

    proptest! {
        #[test]
        fn prop_push_and_pull_mirror_each_other(
            local in "[a-zA-Z0-9/_.]{1,30}",
            remote in "[a-zA-Z0-9:/_.]{1,30}",
        ) {
            let builder = SyncCommandBuilder::default();
            let cfg = SyncConfig::new(local.clone(), remote.clone());
            let swapped = SyncConfig::new(remote, local);

            let push = builder.build(SyncDirection::PushLocalToRemote, &cfg);
            prop_assert_eq!(&push, &builder.build(SyncDirection::PushLocalToRemote, &cfg));
            prop_assert_eq!(push, builder.build(SyncDirection::PullRemoteToLocal, &swapped));
        }
    }
}
