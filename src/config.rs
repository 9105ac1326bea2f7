use crate::sync::command::{SyncCommandBuilder, SyncConfig};
use crate::sync::DEFAULT_MAX_LOCK_RETRIES;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOCAL: &str = "~/Notes";
pub const DEFAULT_REMOTE: &str = "gdrive:notes_vault";
pub const DEFAULT_RCLONE: &str = "rclone";
pub const DEFAULT_MERGE_TOOL: &str = "meld";

/// Sync settings; every field is optional so layers can be overlaid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_resolve_conflicts: Option<bool>,
    /// Sync tool binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rclone: Option<String>,
    /// Prepended to every spawned command, e.g. ["flatpak-spawn", "--host"]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_prefix: Option<Vec<String>>,
    /// Merge program and leading arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_tool: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lock_retries: Option<u32>,
}

impl Settings {
    /// `other` wins wherever it sets a value
    pub fn overlay(&self, other: &Settings) -> Settings {
        Settings {
            local: other.local.clone().or_else(|| self.local.clone()),
            remote: other.remote.clone().or_else(|| self.remote.clone()),
            auto_resolve_conflicts: other.auto_resolve_conflicts.or(self.auto_resolve_conflicts),
            rclone: other.rclone.clone().or_else(|| self.rclone.clone()),
            host_prefix: other.host_prefix.clone().or_else(|| self.host_prefix.clone()),
            merge_tool: other.merge_tool.clone().or_else(|| self.merge_tool.clone()),
            max_lock_retries: other.max_lock_retries.or(self.max_lock_retries),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        let local = self.local.as_deref().unwrap_or(DEFAULT_LOCAL);
        let remote = self.remote.as_deref().unwrap_or(DEFAULT_REMOTE);
        SyncConfig {
            auto_resolve_conflicts: self.auto_resolve_conflicts.unwrap_or(false),
            ..SyncConfig::new(expand_tilde(local), remote)
        }
    }

    fn host_prefix(&self) -> &[String] {
        self.host_prefix.as_deref().unwrap_or(&[])
    }

    pub fn command_builder(&self) -> SyncCommandBuilder {
        let rclone = self.rclone.as_deref().unwrap_or(DEFAULT_RCLONE);
        SyncCommandBuilder::with_prefix(self.host_prefix(), rclone)
    }

    pub fn merge_argv(&self) -> Vec<String> {
        let mut argv = self.host_prefix().to_vec();
        match &self.merge_tool {
            Some(tool) if !tool.is_empty() => argv.extend(tool.iter().cloned()),
            _ => argv.push(DEFAULT_MERGE_TOOL.to_string()),
        }
        argv
    }

    pub fn max_lock_retries(&self) -> u32 {
        self.max_lock_retries.unwrap_or(DEFAULT_MAX_LOCK_RETRIES)
    }
}

/// Contents of `config.toml`: top-level defaults plus named profiles
///
/// ```toml
/// remote = "gdrive:notes_vault"
/// host_prefix = ["flatpak-spawn", "--host"]
///
/// [profiles.work]
/// local = "~/Work/notes"
/// remote = "dropbox:work"
/// auto_resolve_conflicts = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub defaults: Settings,
    #[serde(default)]
    pub profiles: BTreeMap<String, Settings>,
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Cannot determine config directory")?;
        Ok(dir.join("vaultsync").join("config.toml"))
    }

    /// Load `path`, or the default location when `None`
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn list_profiles(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn show_profile(&self, name: &str) -> Option<String> {
        let profile = self.defaults.overlay(self.profiles.get(name)?);
        toml::to_string_pretty(&profile).ok()
    }

    /// Top-level settings with the named profile (if any) applied
    pub fn settings(&self, profile: Option<&str>) -> Result<Settings> {
        match profile {
            None => Ok(self.defaults.clone()),
            Some(name) => {
                let overrides = self
                    .profiles
                    .get(name)
                    .ok_or_else(|| anyhow::anyhow!("Profile '{}' not found", name))?;
                Ok(self.defaults.overlay(overrides))
            }
        }
    }
}

/// Expand a leading `~` to the home directory
fn expand_tilde(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.display(), rest),
        None => path.to_string(),
    }
}
