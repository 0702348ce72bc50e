use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use parking_lot::Mutex;
use tally_sync::{
    server, CounterBoard, CounterMap, CounterName, CounterSync, MutationKind, SyncConfig, SyncError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Shared counters, synchronized live across every connected client", version)]
#[command(after_help = "Configuration:
  TALLY_API_BASE            counter service base url (default http://127.0.0.1:3000)
  TALLY_REQUEST_TIMEOUT_MS  per-request timeout
  TALLY_TRANSPORTS          push transports in preference order, e.g. websocket,polling
  TALLY_POLL_INTERVAL_MS    polling transport interval
  TALLY_RECONNECT_DELAY_MS  pause before a dropped push stream reconnects

Values are also read from a .env file in the working directory.")]
struct Cli {
    /// Counter service base url (overrides TALLY_API_BASE)
    #[arg(long, global = true, value_name = "URL")]
    api: Option<String>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every counter
    List,

    /// Increment a counter by one
    Inc { name: String },

    /// Register a new counter
    Add { name: String },

    /// Live board; type `+name`, `add name`, `refresh` or `quit`
    Watch,

    /// Run an in-memory counter service
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref())?;

    let command = cli.command.unwrap_or(Commands::Watch);
    let api = cli.api.as_deref();

    match command {
        Commands::List => {
            let sync = connect(api)?;
            let snapshot = sync.fetch_all().await.map_err(report)?;
            print_counters(&snapshot);
        }

        Commands::Inc { name } => {
            let sync = connect(api)?;
            let name = CounterName::new(name.trim()).map_err(report)?;
            sync.mutate(MutationKind::Increment, &name).await.map_err(report)?;
            println!("{} Incremented {}", "✓".green(), name.to_string().bright_cyan());
            let snapshot = sync.fetch_all().await.map_err(report)?;
            print_counters(&snapshot);
        }

        Commands::Add { name } => {
            let sync = connect(api)?;
            let name = CounterName::new(name.trim()).map_err(report)?;
            sync.mutate(MutationKind::AddCounter, &name).await.map_err(report)?;
            println!("{} Added {}", "✓".green(), name.to_string().bright_cyan());
            let snapshot = sync.fetch_all().await.map_err(report)?;
            print_counters(&snapshot);
        }

        Commands::Watch => watch(connect(api)?).await?,

        Commands::Serve { port } => {
            println!(
                "{}",
                format!("🌐 Starting counter service on port {}...", port)
                    .cyan()
                    .bold()
            );
            server::start(port).await?;
        }
    }

    Ok(())
}

fn connect(api: Option<&str>) -> Result<CounterSync> {
    let mut config = SyncConfig::from_env().context("loading TALLY_* configuration")?;
    if let Some(api) = api {
        config.base_url = SyncConfig::new(api)?.base_url;
    }
    Ok(CounterSync::new(config)?)
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tally_sync=info,tally=info"));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "tally.log"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn report(err: SyncError) -> anyhow::Error {
    eprintln!("{} {}", "✗".red(), err);
    eprintln!("  {} {}", "hint:".bright_black(), err.category().hint());
    err.into()
}

fn print_counters(counters: &CounterMap) {
    println!("{}", "Counters".cyan().bold());
    println!("{}", "═".repeat(40).bright_black());

    if counters.is_empty() {
        println!("{}", "No counters yet.".yellow());
        return;
    }
    for (name, count) in counters.iter() {
        println!("{:<30} {}", name.to_string().bright_white(), count.to_string().bold());
    }
}

fn render(board: &CounterBoard) {
    println!();
    if board.is_loading() {
        println!("{}", "Loading…".bright_black());
    }
    print_counters(board.counters());
    if let Some(at) = board.last_synced() {
        println!(
            "{}",
            format!("synced {}", at.format("%H:%M:%S%.3f")).bright_black()
        );
    }
}

enum Input {
    Increment(CounterName),
    Add(CounterName),
    Refresh,
    Quit,
    Help,
}

fn parse_input(line: &str) -> std::result::Result<Input, SyncError> {
    let line = line.trim();
    if let Some(name) = line.strip_prefix('+') {
        return Ok(Input::Increment(CounterName::new(name.trim())?));
    }
    if let Some(name) = line.strip_prefix("add ") {
        return Ok(Input::Add(CounterName::new(name.trim())?));
    }
    Ok(match line {
        "refresh" | "r" => Input::Refresh,
        "quit" | "q" | "exit" => Input::Quit,
        _ => Input::Help,
    })
}

/// Fresh full read replacing whatever the board shows.
async fn reconcile(sync: &CounterSync, board: &Mutex<CounterBoard>) {
    board.lock().set_loading(true);
    match sync.fetch_all().await {
        Ok(snapshot) => board.lock().apply(&snapshot),
        Err(err) => {
            eprintln!("{} refresh failed: {}", "✗".red(), err);
            board.lock().set_loading(false);
        }
    }
    render(&board.lock());
}

async fn watch(sync: CounterSync) -> Result<()> {
    let board = Arc::new(Mutex::new(CounterBoard::new()));
    render(&board.lock());
    reconcile(&sync, &board).await;

    let subscription = sync.subscribe({
        let board = board.clone();
        move |snapshot| {
            let mut board = board.lock();
            board.apply(&snapshot);
            render(&board);
        }
    });

    println!(
        "{}",
        "Type +name to increment, add name to create, refresh, or quit.".bright_black()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(err) => {
                eprintln!("{} {}", "✗".red(), err);
                continue;
            }
        };

        match input {
            Input::Increment(name) => {
                {
                    let mut board = board.lock();
                    board.optimistic_increment(&name);
                    render(&board);
                }
                if let Err(err) = sync.mutate(MutationKind::Increment, &name).await {
                    eprintln!("{} increment failed: {}", "✗".red(), err);
                    reconcile(&sync, &board).await;
                }
            }
            Input::Add(name) => {
                if let Err(err) = sync.mutate(MutationKind::AddCounter, &name).await {
                    eprintln!("{} add failed: {}", "✗".red(), err);
                }
                reconcile(&sync, &board).await;
            }
            Input::Refresh => reconcile(&sync, &board).await,
            Input::Quit => break,
            Input::Help => println!(
                "{}",
                "Commands: +name | add name | refresh | quit".bright_black()
            ),
        }
    }

    subscription.unsubscribe().await;
    Ok(())
}
