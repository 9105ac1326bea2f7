pub mod classify;
pub mod command;
pub mod lines;
pub mod output;
pub mod patterns;

use crate::bisync::ConflictResolver;
use crate::error::{Result, SyncError};
use crate::process::{ProcessEvent, ProcessHandle, ProcessRunner};
use classify::{classify, Outcome};
use command::{SyncCommandBuilder, SyncConfig, SyncDirection};
use lines::OutputLineBuffer;
use output::SyncEvent;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

/// Lock cleanups allowed per run before giving up
pub const DEFAULT_MAX_LOCK_RETRIES: u32 = 3;

/// Where the orchestrator is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running { direction: SyncDirection, attempt: u32 },
    RetryingAfterLockCleanup { retry: u32 },
    ResolvingConflict,
    /// The last run ended with this outcome; a new run may start
    Terminal(Outcome),
}

impl OrchestratorState {
    fn is_busy(&self) -> bool {
        !matches!(self, OrchestratorState::Idle | OrchestratorState::Terminal(_))
    }
}

/// Bookkeeping for the run in progress
struct RunningSync {
    direction: SyncDirection,
    attempt: u32,
    lock_retries: u32,
    display: OutputLineBuffer,
    stdout: String,
    stderr: String,
}

impl RunningSync {
    fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            attempt: 1,
            lock_retries: 0,
            display: OutputLineBuffer::new(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Start over with empty output for the next sync-tool process
    fn next_attempt(&mut self, direction: SyncDirection) {
        self.direction = direction;
        self.attempt += 1;
        self.display = OutputLineBuffer::new();
        self.stdout.clear();
        self.stderr.clear();
    }

    /// Record an output event, returning the lines it completed
    fn record(&mut self, event: &ProcessEvent) -> Vec<String> {
        match event {
            ProcessEvent::Stdout(chunk) => {
                self.stdout.push_str(chunk);
                self.display.feed(chunk)
            }
            ProcessEvent::Stderr(chunk) => {
                self.stderr.push_str(chunk);
                self.display.feed(chunk)
            }
            ProcessEvent::Exited(_) => self.display.finish().into_iter().collect(),
        }
    }
}

enum Step {
    Event(Option<ProcessEvent>),
    Cancel,
}

/// Drives the external sync tool through push, pull and bisync runs
///
/// Only one run may be active at a time; `run` while busy is rejected.
/// Stale-lock failures are cleaned up and retried a bounded number of
/// times, and bisync conflicts are handed to `ConflictResolver`.
pub struct SyncOrchestrator {
    runner: Arc<dyn ProcessRunner>,
    builder: SyncCommandBuilder,
    resolver: ConflictResolver,
    max_lock_retries: u32,
    config: Mutex<Option<SyncConfig>>,
    state: Mutex<OrchestratorState>,
    cancel_tx: watch::Sender<bool>,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl SyncOrchestrator {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        builder: SyncCommandBuilder,
        resolver: ConflictResolver,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            runner,
            builder,
            resolver,
            max_lock_retries: DEFAULT_MAX_LOCK_RETRIES,
            config: Mutex::new(None),
            state: Mutex::new(OrchestratorState::Idle),
            cancel_tx,
            events: None,
        }
    }

    pub fn with_max_lock_retries(mut self, retries: u32) -> Self {
        self.max_lock_retries = retries;
        self
    }

    /// Deliver progress and terminal events to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn configure(&self, config: SyncConfig) -> Result<()> {
        config.validate()?;
        if lock(&self.state).is_busy() {
            return Err(SyncError::AlreadyRunning);
        }
        *lock(&self.config) = Some(config);
        Ok(())
    }

    pub fn state(&self) -> OrchestratorState {
        lock(&self.state).clone()
    }

    /// Cancel the active run, if any. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        let state = lock(&self.state);
        if !state.is_busy() {
            return false;
        }
        tracing::info!("Cancelling sync");
        self.cancel_tx.send_replace(true);
        true
    }

    /// Run one sync to completion
    ///
    /// Fails only if a run is already active or no valid configuration was
    /// set; everything that goes wrong during the run is reported as an
    /// `Outcome`. A `Finished` event is published exactly once per run.
    pub async fn run(&self, direction: SyncDirection) -> Result<Outcome> {
        let config = self.begin(direction)?;
        let mut guard = RunGuard {
            orchestrator: self,
            armed: true,
        };

        let mut cancel_rx = self.cancel_tx.subscribe();
        let outcome = self.drive(direction, &config, &mut cancel_rx).await;

        guard.armed = false;
        self.finish(outcome.clone());
        Ok(outcome)
    }

    fn begin(&self, direction: SyncDirection) -> Result<SyncConfig> {
        let mut state = lock(&self.state);
        if state.is_busy() {
            tracing::warn!("Sync already running, ignoring {} request", direction);
            return Err(SyncError::AlreadyRunning);
        }
        let config = lock(&self.config)
            .clone()
            .ok_or_else(|| SyncError::InvalidConfig("no sync configuration set".to_string()))?;
        config.validate()?;

        self.cancel_tx.send_replace(false);
        *state = OrchestratorState::Running {
            direction,
            attempt: 1,
        };
        Ok(config)
    }

    fn finish(&self, outcome: Outcome) {
        match &outcome {
            Outcome::FatalError { message } => tracing::error!("Sync failed: {}", message),
            other => tracing::info!("{}", other.summary()),
        }
        *lock(&self.state) = OrchestratorState::Terminal(outcome.clone());
        self.emit(SyncEvent::finished(outcome));
    }

    async fn drive(
        &self,
        direction: SyncDirection,
        config: &SyncConfig,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Outcome {
        let mut run = RunningSync::new(direction);

        loop {
            if *cancel_rx.borrow() {
                return Outcome::Cancelled;
            }
            self.set_state(OrchestratorState::Running {
                direction: run.direction,
                attempt: run.attempt,
            });

            match self.attempt(&mut run, config, cancel_rx).await {
                Outcome::LockFileError { cleanup_command } => {
                    if run.lock_retries >= self.max_lock_retries {
                        return Outcome::fatal(format!(
                            "lock file still present after {} cleanup attempt(s): {}",
                            run.lock_retries, cleanup_command
                        ));
                    }
                    run.lock_retries += 1;
                    self.set_state(OrchestratorState::RetryingAfterLockCleanup {
                        retry: run.lock_retries,
                    });
                    tracing::warn!(
                        "Stale lock detected, running `{}` (retry {}/{})",
                        cleanup_command,
                        run.lock_retries,
                        self.max_lock_retries
                    );
                    self.emit(SyncEvent::LockCleanup {
                        command: cleanup_command.clone(),
                        attempt: run.lock_retries,
                    });
                    if let Err(outcome) = self.clean_lock(&cleanup_command).await {
                        return outcome;
                    }
                    run.next_attempt(run.direction);
                }
                Outcome::ConflictDetected { path_a, path_b } => {
                    self.set_state(OrchestratorState::ResolvingConflict);
                    tracing::warn!("Conflict between {} and {}", path_a, path_b);
                    self.emit(SyncEvent::Conflict {
                        path_a: path_a.clone(),
                        path_b: path_b.clone(),
                    });
                    self.report_unresolved(&run);

                    let resolution = match self.resolver.resolve(&path_a, &path_b).await {
                        Ok(resolution) => resolution,
                        Err(e) => return Outcome::fatal(e.to_string()),
                    };
                    tracing::info!("Conflict resolved into {}", resolution.merged.display());

                    if !config.auto_resolve_conflicts {
                        return Outcome::Success;
                    }
                    run.next_attempt(SyncDirection::PushLocalToRemote);
                }
                outcome => return outcome,
            }
        }
    }

    /// Launch the sync tool once and classify how it ended
    async fn attempt(
        &self,
        run: &mut RunningSync,
        config: &SyncConfig,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Outcome {
        let argv = self.builder.build(run.direction, config);
        tracing::info!("Starting {} (attempt {})", run.direction, run.attempt);
        tracing::debug!("Command: {}", argv.join(" "));
        self.emit(SyncEvent::started(run.direction, run.attempt, argv.clone()));

        let mut handle = match self.runner.launch(&argv).await {
            Ok(handle) => handle,
            Err(e) => return Outcome::fatal(e.to_string()),
        };

        loop {
            let step = tokio::select! {
                event = handle.next_event() => Step::Event(event),
                _ = cancelled(cancel_rx) => Step::Cancel,
            };

            match step {
                Step::Cancel => {
                    handle.kill();
                    self.drain(handle.as_mut(), run).await;
                    return Outcome::Cancelled;
                }
                Step::Event(Some(ProcessEvent::Exited(status))) => {
                    let lines = run.record(&ProcessEvent::Exited(status));
                    self.emit_progress(lines);
                    tracing::debug!(
                        "Sync tool finished: {} ({} output lines)",
                        status,
                        run.display.snapshot().len()
                    );
                    return classify(run.direction, status, &run.stdout, &run.stderr);
                }
                Step::Event(Some(event)) => {
                    let lines = run.record(&event);
                    self.emit_progress(lines);
                }
                Step::Event(None) => {
                    return Outcome::fatal("sync tool output ended without an exit status");
                }
            }
        }
    }

    /// Keep whatever the killed process printed before it went away
    async fn drain(&self, handle: &mut dyn ProcessHandle, run: &mut RunningSync) {
        while let Some(event) = handle.next_event().await {
            let exited = matches!(event, ProcessEvent::Exited(_));
            let lines = run.record(&event);
            self.emit_progress(lines);
            if exited {
                break;
            }
        }
    }

    /// Announce conflicts past the first one; they are left for the user
    fn report_unresolved(&self, run: &RunningSync) {
        let combined = format!("{}\n{}", run.stdout, run.stderr);
        for (path_a, path_b) in patterns::extract_conflict_pairs(&combined).into_iter().skip(1) {
            tracing::warn!("Unresolved conflict left in place: {} and {}", path_a, path_b);
            self.emit(SyncEvent::UnresolvedConflict { path_a, path_b });
        }
    }

    /// Re-run the cleanup command against the configured sync tool
    async fn clean_lock(&self, command: &str) -> std::result::Result<(), Outcome> {
        // The command always starts with `rclone`; swap in our launcher so a
        // custom binary path or host prefix applies
        let mut argv = self.builder.launcher().to_vec();
        argv.extend(patterns::split_command(command).into_iter().skip(1));

        match self.runner.run_to_completion(&argv).await {
            Ok((status, _)) if status.success() => Ok(()),
            Ok((status, output)) => Err(Outcome::fatal(format!(
                "lock cleanup `{}` failed with {}: {}",
                command,
                status,
                output.trim()
            ))),
            Err(e) => Err(Outcome::fatal(e.to_string())),
        }
    }

    fn set_state(&self, state: OrchestratorState) {
        *lock(&self.state) = state;
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            // A gone receiver just means nobody is watching
            let _ = tx.send(event);
        }
    }

    fn emit_progress(&self, lines: Vec<String>) {
        if !lines.is_empty() {
            self.emit(SyncEvent::Progress { lines });
        }
    }
}

/// Publishes a terminal outcome if a run is dropped or panics midway
struct RunGuard<'a> {
    orchestrator: &'a SyncOrchestrator,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.orchestrator
                .finish(Outcome::fatal("sync aborted unexpectedly"));
        }
    }
}

/// Resolves once a cancellation has been requested
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
