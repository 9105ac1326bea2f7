pub mod local;
#[cfg(test)]
pub mod testing;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

pub use local::LocalRunner;

/// How a child process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited on its own with the given code
    Code(i32),
    /// Terminated by a signal nobody on our side sent
    Signal(i32),
    /// Terminated because `ProcessHandle::kill` was called
    Killed,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {}", code),
            ExitStatus::Signal(sig) => write!(f, "signal {}", sig),
            ExitStatus::Killed => write!(f, "killed"),
        }
    }
}

/// One item of a running process's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Always the last event of a stream
    Exited(ExitStatus),
}

/// A launched subprocess
///
/// Output chunks are delivered in order of arrival, stdout and stderr
/// interleaved, followed by exactly one `Exited` event. After that the
/// stream is exhausted and `next_event` keeps returning `None`.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Wait for the next output chunk or the terminal exit event
    async fn next_event(&mut self) -> Option<ProcessEvent>;

    /// Ask the process to terminate. Calling it again, or after the
    /// process has exited, does nothing.
    fn kill(&mut self);
}

/// Launches external commands
///
/// The orchestrator only talks to processes through this trait so tests can
/// substitute a scripted runner.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Start `argv[0]` with the remaining arguments, streaming its output
    async fn launch(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>>;

    /// Run a command to completion, returning its exit status and
    /// combined output. Used for lock cleanup and the merge tool.
    async fn run_to_completion(&self, argv: &[String]) -> Result<(ExitStatus, String)> {
        let mut handle = self.launch(argv).await?;
        let mut output = String::new();
        while let Some(event) = handle.next_event().await {
            match event {
                ProcessEvent::Stdout(chunk) | ProcessEvent::Stderr(chunk) => {
                    output.push_str(&chunk)
                }
                ProcessEvent::Exited(status) => return Ok((status, output)),
            }
        }
        // A well-behaved handle never ends without Exited
        Ok((ExitStatus::Killed, output))
    }
}
