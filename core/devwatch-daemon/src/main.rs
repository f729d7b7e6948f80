//! devwatch-daemon: idle activity monitor for a developer workstation.
//!
//! Polls host activity signals on a fixed interval. After a sustained idle
//! period it commits outstanding git work, runs the file backup script and
//! schedules an OS shutdown.
//!
//! ## Subcommands
//!
//! - `run` (default): the polling loop
//! - `check`: one evaluation, printed as JSON; idle state and the activity
//!   log are left untouched

mod logging;
mod monitor_loop;

use clap::{Parser, Subcommand};
use devwatch_core::config::CONFIG_PATH_ENV;
use devwatch_core::probes::CPU_SAMPLE_WINDOW;
use devwatch_core::{Config, MonitorSession};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "devwatch-daemon")]
#[command(about = "Idle activity monitor with pre-shutdown backup")]
#[command(version)]
struct Cli {
    /// Log the shutdown command instead of running it
    #[arg(long, global = true)]
    dry_run: bool,

    /// TOML config file (overrides DEVWATCH_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run the monitoring loop (default)
    Run,

    /// Evaluate activity once and print the verdict as JSON
    Check,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            let _guard = logging::init(None);
            tracing::error!(error = %err, "Invalid configuration");
            std::process::exit(2);
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let _guard = logging::init(Some(&config.diagnostics_dir()));
            if let Err(err) = run(config) {
                tracing::error!(error = %err, "devwatch-daemon failed");
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let _guard = logging::init(None);
            if let Err(err) = check(config) {
                tracing::error!(error = %err, "devwatch-daemon check failed");
                std::process::exit(1);
            }
        }
    }
}

fn load_config(cli: &Cli) -> devwatch_core::Result<Config> {
    let config_path = cli.config.clone();
    let mut config = Config::from_lookup(|key| {
        if key == CONFIG_PATH_ENV {
            if let Some(path) = &config_path {
                return Some(path.display().to_string());
            }
        }
        std::env::var(key).ok()
    })?;
    if cli.dry_run {
        config.dry_run = true;
    }
    Ok(config)
}

fn run(config: Config) -> Result<(), String> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| format!("Failed to install signal handler: {}", err))?;

    let interval = config.poll_interval();
    let mut session = MonitorSession::system(config);
    session.start();

    match monitor_loop::run(&mut session, interval, CPU_SAMPLE_WINDOW, &interrupted) {
        monitor_loop::LoopExit::ShutdownSequenceRan => {
            tracing::info!("Monitor exiting after shutdown sequence")
        }
        monitor_loop::LoopExit::ShutdownIncomplete => {
            return Err("Shutdown sequence did not finish".to_string())
        }
        monitor_loop::LoopExit::Interrupted => tracing::info!("Monitor stopped"),
    }
    Ok(())
}

fn check(config: Config) -> Result<(), String> {
    let mut session = MonitorSession::system(config);
    std::thread::sleep(CPU_SAMPLE_WINDOW);
    let verdict = session.check();
    let json = serde_json::to_string_pretty(&verdict)
        .map_err(|err| format!("Failed to serialize verdict: {}", err))?;
    println!("{}", json);
    Ok(())
}
