use super::classify::Outcome;
use super::command::SyncDirection;
use serde::Serialize;

/// Events the orchestrator publishes while a run is in progress
/// JSON mode prints them as NDJSON (newline-delimited JSON)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A sync-tool process was launched
    Started {
        direction: SyncDirection,
        attempt: u32,
        argv: Vec<String>,
        started_at: String,
    },
    /// Output lines completed since the previous `Progress` event
    Progress { lines: Vec<String> },
    LockCleanup { command: String, attempt: u32 },
    Conflict { path_a: String, path_b: String },
    /// A further conflict reported by the same bisync run; both copies stay
    UnresolvedConflict { path_a: String, path_b: String },
    /// Sent exactly once per run
    Finished { outcome: Outcome, summary: String },
}

impl SyncEvent {
    pub fn started(direction: SyncDirection, attempt: u32, argv: Vec<String>) -> Self {
        SyncEvent::Started {
            direction,
            attempt,
            argv,
            started_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn finished(outcome: Outcome) -> Self {
        let summary = outcome.summary();
        SyncEvent::Finished { outcome, summary }
    }

    /// Emit this event as JSON to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }
}
