mod bisync;
mod cli;
mod config;
mod display;
mod error;
mod process;
mod sync;

use anyhow::Result;
use bisync::ConflictResolver;
use clap::Parser;
use cli::Cli;
use config::Config;
use display::DisplayMode;
use process::{LocalRunner, ProcessRunner};
use std::sync::Arc;
use sync::classify::Outcome;
use sync::SyncOrchestrator;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status after a cancelled run (128 + SIGINT)
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load config file
    let config = Config::load(cli.config.as_deref())?;

    // Handle profile-only flags (print and exit)
    if cli.list_profiles {
        let profiles = config.list_profiles();
        if profiles.is_empty() {
            println!("No profiles configured");
            println!("\nCreate profiles in: {}", Config::config_path()?.display());
        } else {
            println!("Available profiles:");
            for name in profiles {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    if let Some(ref profile_name) = cli.show_profile {
        match config.show_profile(profile_name) {
            Some(output) => {
                println!("{}", output);
                return Ok(());
            }
            None => {
                anyhow::bail!("Profile '{}' not found", profile_name);
            }
        }
    }

    // Setup logging (stderr, so --json output stays parseable)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str()));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    // Validate arguments
    cli.validate()?;

    // CLI args take precedence over the profile, the profile over top-level keys
    let settings = config.settings(cli.profile.as_deref())?.overlay(&cli.overrides());
    let sync_config = settings.sync_config();

    let mode = if cli.json {
        DisplayMode::Json
    } else if cli.quiet {
        DisplayMode::Quiet
    } else {
        DisplayMode::Human
    };

    if mode == DisplayMode::Human {
        println!("vaultsync v{}", env!("CARGO_PKG_VERSION"));
        let arrow = match cli.direction {
            sync::command::SyncDirection::PushLocalToRemote => "→",
            sync::command::SyncDirection::PullRemoteToLocal => "←",
            sync::command::SyncDirection::Bidirectional => "⇄",
        };
        println!(
            "{} {} {} {}\n",
            cli.direction, sync_config.local_path, arrow, sync_config.remote_path
        );
    }

    let runner: Arc<dyn ProcessRunner> = Arc::new(LocalRunner::new());
    let resolver = ConflictResolver::new(settings.merge_argv(), runner.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Arc::new(
        SyncOrchestrator::new(runner, settings.command_builder(), resolver)
            .with_max_lock_retries(settings.max_lock_retries())
            .with_events(tx),
    );
    orchestrator.configure(sync_config)?;

    let display = tokio::spawn(display::render(rx, mode));

    // Ctrl-C cancels the run instead of killing us outright
    let interrupt = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel();
            }
        }
    });

    let outcome = orchestrator.run(cli.direction).await?;
    tracing::debug!("Orchestrator state: {:?}", orchestrator.state());

    // Drop every sender so the display task drains and exits
    interrupt.abort();
    let _ = interrupt.await;
    drop(orchestrator);
    display.await?;

    match outcome {
        Outcome::Success => Ok(()),
        Outcome::Cancelled => std::process::exit(EXIT_CANCELLED),
        _ => std::process::exit(1),
    }
}
