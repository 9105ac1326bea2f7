use super::command::SyncDirection;
use super::patterns;
use crate::process::ExitStatus;
use serde::Serialize;

pub const UNEXTRACTED_CONFLICT: &str = "conflict detected but paths not extracted";

/// Result of one sync-tool invocation, or of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// A stale lock blocked the run; `cleanup_command` removes it
    LockFileError { cleanup_command: String },
    /// Bisync kept both versions of a file edited on both sides
    ConflictDetected { path_a: String, path_b: String },
    FatalError { message: String },
    Cancelled,
}

impl Outcome {
    /// One human-readable line describing the outcome
    pub fn summary(&self) -> String {
        match self {
            Outcome::Success => "Sync completed successfully".to_string(),
            Outcome::LockFileError { cleanup_command } => {
                format!("Sync blocked by a lock file (cleanup: {})", cleanup_command)
            }
            Outcome::ConflictDetected { path_a, path_b } => {
                format!("Sync conflict between {} and {}", path_a, path_b)
            }
            Outcome::FatalError { message } => {
                let first = message.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                format!("Sync failed: {}", first.trim())
            }
            Outcome::Cancelled => "Sync cancelled".to_string(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Outcome::FatalError {
            message: message.into(),
        }
    }
}

/// Decide what a finished sync-tool process means
///
/// Rules apply in order: a caller kill wins, then a recoverable lock
/// failure, then any other failure, then (bisync only) conflicts.
pub fn classify(
    direction: SyncDirection,
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
) -> Outcome {
    if status == ExitStatus::Killed {
        return Outcome::Cancelled;
    }

    if !status.success() {
        if let Some(cleanup_command) = patterns::find_lock_cleanup_command(stderr) {
            return Outcome::LockFileError { cleanup_command };
        }
        let message = stderr.trim();
        return if message.is_empty() {
            Outcome::fatal(format!("sync tool failed with {}", status))
        } else {
            Outcome::fatal(message)
        };
    }

    if direction == SyncDirection::Bidirectional {
        // rclone logs its NOTICE lines to stderr; accept them from either stream
        let combined = format!("{}\n{}", stdout, stderr);
        if patterns::has_conflict_marker(&combined) {
            return match patterns::extract_conflict_pair(&combined) {
                Some((path_a, path_b)) => Outcome::ConflictDetected { path_a, path_b },
                None => Outcome::fatal(UNEXTRACTED_CONFLICT),
            };
        }
    }

    Outcome::Success
}
