//! Stirspeare CLI - IRC bot backed by MegaHAL.
//!
//! This is the main binary entry point. See the `stirspeare` library for
//! the units it runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use stirspeare::console::Console;
use stirspeare::shutdown::{self, EXIT_GRACE};
use stirspeare::{ClientUnit, Config, EngineUnit, ShutdownHook, Supervisor};
use tokio::io::BufReader;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long runtime shutdown waits for blocking work such as the stdin reader.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(100);

// CLI
#[derive(Parser)]
#[command(name = "stirspeare")]
#[command(version = VERSION)]
#[command(about = "IRC bot that answers channel mentions with MegaHAL")]
struct Cli {
    /// Config file (defaults to STIRSPEARE_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to IRC and start answering
    Run {
        /// Run without the operator console; stop with a signal
        #[arg(long)]
        headless: bool,
    },
    /// Print the effective configuration
    Config,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Log to `STIRSPEARE_LOG_FILE` or the engine data directory.
fn init_logging(config: &Config) -> Result<PathBuf> {
    let log_path = match std::env::var("STIRSPEARE_LOG_FILE") {
        Ok(path) => PathBuf::from(path),
        Err(_) => config.log_path(),
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file at {}", log_path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();
    Ok(log_path)
}

/// Supervise both units and run until shutdown.
async fn run_bridge(config: Config, headless: bool) -> Result<()> {
    let signal_flag = Arc::new(AtomicBool::new(false));
    shutdown::register_signals(&signal_flag)?;

    let (engine_unit, engine) = EngineUnit::new(config.engine.clone());
    let (client_unit, client) = ClientUnit::new(&config, Arc::new(engine.clone()))?;

    let mut supervisor = Supervisor::new(config.restart);
    supervisor.supervise(Arc::new(engine_unit), Arc::new(engine.clone()));
    supervisor.supervise(Arc::new(client_unit), Arc::new(client.clone()));
    let hook = ShutdownHook::new(&supervisor);

    log::info!(
        "Stirspeare v{} started as {} on {}",
        VERSION,
        config.irc.nick,
        config.server_addr()
    );

    if headless {
        println!("Running headless. Send SIGINT or SIGTERM to stop.");
        shutdown::wait_for_flag(&signal_flag).await;
        log::info!("Signal received");
        hook.trigger();
    } else {
        let console = Console::new(engine, client, hook.clone(), supervisor.registry().names());
        println!("Type 'help' for commands, 'quit' to exit.");
        tokio::select! {
            result = console.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
                if let Err(e) = result {
                    log::error!("[Console] {:#}", e);
                    hook.trigger();
                }
            }
            () = shutdown::wait_for_flag(&signal_flag) => {
                log::info!("Signal received");
                hook.trigger();
            }
        }
    }

    println!("Shutting down...");
    if shutdown::wait_for_units(supervisor, EXIT_GRACE).await.is_none() {
        eprintln!("Units did not stop within {:?}", EXIT_GRACE);
    }
    Ok(())
}

fn run(config_path: Option<&Path>, headless: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    std::fs::create_dir_all(&config.engine.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.engine.data_dir.display()
        )
    })?;
    let log_path = init_logging(&config)?;
    println!(
        "Starting Stirspeare v{} (logging to {})",
        VERSION,
        log_path.display()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run_bridge(config, headless));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { headless } => run(cli.config.as_deref(), headless)?,
        Commands::Config => {
            let path = Config::resolve_path(cli.config.as_deref());
            let config = Config::load(cli.config.as_deref())?;
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::InitConfig { force } => {
            let path = Config::resolve_path(cli.config.as_deref());
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
        }
    }

    Ok(())
}
