use super::{ExitStatus, ProcessEvent, ProcessHandle, ProcessRunner};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

const READ_CHUNK: usize = 8192;

/// Runs commands as real OS processes via `tokio::process`
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for LocalRunner {
    async fn launch(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            SyncError::InvalidConfig("cannot launch an empty command".to_string())
        })?;

        tracing::debug!("Launching: {}", argv.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SyncError::Launch {
                program: program.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone(), ProcessEvent::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx, ProcessEvent::Stderr);
        }

        Ok(Box::new(LocalHandle {
            child,
            rx,
            killed: false,
            finished: false,
        }))
    }
}

/// Handle to a process started by `LocalRunner`
struct LocalHandle {
    child: Child,
    rx: mpsc::UnboundedReceiver<ProcessEvent>,
    killed: bool,
    finished: bool,
}

#[async_trait]
impl ProcessHandle for LocalHandle {
    async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.finished {
            return None;
        }

        if self.killed {
            // Grandchildren may keep the pipes open after a kill, so only
            // drain what has already arrived
            if let Ok(event) = self.rx.try_recv() {
                return Some(event);
            }
        } else if let Some(event) = self.rx.recv().await {
            return Some(event);
        }

        let status = self.child.wait().await;
        self.finished = true;
        let status = match status {
            Ok(_) if self.killed => ExitStatus::Killed,
            Ok(status) => map_status(status),
            Err(e) => {
                tracing::warn!("Failed to wait for child process: {}", e);
                ExitStatus::Signal(-1)
            }
        };
        tracing::debug!("Process finished: {}", status);
        Some(ProcessEvent::Exited(status))
    }

    fn kill(&mut self) {
        if self.killed || self.finished {
            return;
        }
        self.killed = true;
        if let Err(e) = self.child.start_kill() {
            // Already exited; wait() will still reap it
            tracing::debug!("Kill after exit ignored: {}", e);
        }
    }
}

#[cfg(unix)]
fn map_status(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => ExitStatus::Code(code),
        (None, Some(sig)) => ExitStatus::Signal(sig),
        (None, None) => ExitStatus::Signal(-1),
    }
}

#[cfg(not(unix))]
fn map_status(status: std::process::ExitStatus) -> ExitStatus {
    ExitStatus::Code(status.code().unwrap_or(-1))
}

fn spawn_reader<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut pending = Vec::new();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let text = take_utf8(&mut pending);
                    if !text.is_empty() && tx.send(wrap(text)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!("Output pipe read failed: {}", e);
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let _ = tx.send(wrap(String::from_utf8_lossy(&pending).into_owned()));
        }
    });
}

/// Take the longest decodable prefix out of `pending`
///
/// A multi-byte character split across two reads stays in `pending` until
/// the rest of it arrives.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_take_utf8_keeps_split_character() {
        // "é" is 0xC3 0xA9
        let mut pending = vec![b'a', 0xC3];
        assert_eq!(take_utf8(&mut pending), "a");
        assert_eq!(pending, vec![0xC3]);

        pending.push(0xA9);
        assert_eq!(take_utf8(&mut pending), "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_utf8_replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xFF, b'b'];
        assert_eq!(take_utf8(&mut pending), "a\u{FFFD}b");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_launch_missing_program() {
        let runner = LocalRunner::new();
        let result = runner
            .launch(&argv(&["vaultsync-definitely-not-installed"]))
            .await;
        assert!(matches!(result, Err(SyncError::Launch { .. })));
    }

    #[tokio::test]
    async fn test_launch_empty_argv() {
        let runner = LocalRunner::new();
        let result = runner.launch(&[]).await;
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_stdout_stderr_and_exit_code() {
        let runner = LocalRunner::new();
        let mut handle = runner
            .launch(&argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit = None;
        while let Some(event) = handle.next_event().await {
            match event {
                ProcessEvent::Stdout(s) => stdout.push_str(&s),
                ProcessEvent::Stderr(s) => stderr.push_str(&s),
                ProcessEvent::Exited(status) => exit = Some(status),
            }
        }

        assert_eq!(stdout, "out\n");
        assert_eq!(stderr, "err\n");
        assert_eq!(exit, Some(ExitStatus::Code(3)));
        assert!(handle.next_event().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let runner = LocalRunner::new();
        let mut handle = runner.launch(&argv(&["sleep", "30"])).await.unwrap();

        handle.kill();
        handle.kill();

        let mut exit = None;
        while let Some(event) = handle.next_event().await {
            if let ProcessEvent::Exited(status) = event {
                exit = Some(status);
            }
        }
        assert_eq!(exit, Some(ExitStatus::Killed));

        // After exit, kill is a no-op
        handle.kill();
        assert!(handle.next_event().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_to_completion_collects_output() {
        let runner = LocalRunner::new();
        let (status, output) = runner
            .run_to_completion(&argv(&["sh", "-c", "printf 'a\\nb'"]))
            .await
            .unwrap();
        assert!(status.success());
        assert_eq!(output, "a\nb");
    }
}
