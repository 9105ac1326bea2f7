// Terminal rendering of orchestrator events

use crate::sync::classify::Outcome;
use crate::sync::output::SyncEvent;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Human,
    Json,
    Quiet,
}

/// Consume events until the orchestrator drops its sender
pub async fn render(mut rx: mpsc::UnboundedReceiver<SyncEvent>, mode: DisplayMode) {
    let mut view = HumanView::default();
    while let Some(event) = rx.recv().await {
        match mode {
            DisplayMode::Json => event.emit(),
            DisplayMode::Human => view.show(&event),
            DisplayMode::Quiet => {
                if let SyncEvent::Finished {
                    outcome: Outcome::FatalError { message },
                    ..
                } = &event
                {
                    eprintln!("{}", message);
                }
            }
        }
    }
    view.clear();
}

#[derive(Default)]
struct HumanView {
    spinner: Option<ProgressBar>,
}

impl HumanView {
    fn show(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Started {
                direction, attempt, ..
            } => {
                self.clear();
                if *attempt > 1 {
                    println!("{}", format!("Starting {} (attempt {})", direction, attempt).bright_black());
                }
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(format!("{} running", direction));
                spinner.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(spinner);
            }
            SyncEvent::Progress { lines } => {
                self.print(|| {
                    for line in lines {
                        println!("{}", line);
                    }
                });
                if let (Some(spinner), Some(last)) = (&self.spinner, lines.last()) {
                    spinner.set_message(last.clone());
                }
            }
            SyncEvent::LockCleanup { command, attempt } => {
                let msg = format!("Stale lock file found, running `{}` (retry {})", command, attempt);
                self.print(|| println!("{}", msg.yellow()));
            }
            SyncEvent::Conflict { path_a, path_b } => {
                // The merge tool may want the terminal
                self.clear();
                println!(
                    "{}",
                    format!("Conflict: {} ↔ {}, opening merge tool", path_a, path_b).yellow()
                );
            }
            SyncEvent::UnresolvedConflict { path_a, path_b } => {
                eprintln!(
                    "{}",
                    format!("Unresolved conflict left in place: {} ↔ {}", path_a, path_b).yellow()
                );
            }
            SyncEvent::Finished { outcome, summary } => {
                self.clear();
                match outcome {
                    Outcome::Success => println!("\n{}\n", format!("✓ {}", summary).green().bold()),
                    Outcome::Cancelled => println!("\n{}\n", summary.yellow().bold()),
                    Outcome::FatalError { message } => {
                        eprintln!("\n{}", format!("✗ {}", summary).red().bold());
                        for line in message.lines().skip(1).filter(|l| !l.trim().is_empty()) {
                            eprintln!("  {}", line.bright_black());
                        }
                    }
                    other => println!("{}", other.summary()),
                }
            }
        }
    }

    /// Print without tearing the spinner
    fn print(&self, f: impl FnOnce()) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(f),
            None => f(),
        }
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}
