//! DEX momentum paper trader - main entry point
//!
//! This binary provides three subcommands:
//! - run: Paper trade against the live feed
//! - scan: Fetch, score and rank once without trading
//! - collect: Store raw pair snapshots in SQLite on an interval

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "dex-momentum")]
#[command(about = "Momentum scoring and paper trading for DEX pairs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the paper trader
    Run {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Cycle interval in seconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,

        /// Ledger directory (overrides config)
        #[arg(long)]
        ledger_dir: Option<PathBuf>,

        /// Ignore any saved checkpoint and start from the starting balance
        #[arg(long)]
        fresh: bool,
    },

    /// Score and rank the current feed once
    Scan {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of candidates to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Export the full ranking as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Collect raw pair snapshots into SQLite
    Collect {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Snapshot database path
        #[arg(long, default_value = "data/snapshots.db")]
        db: PathBuf,

        /// Poll interval in seconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Quiet the HTTP stack
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // scan prints its own table; keep the console clean
    let (command_name, file_only) = match &cli.command {
        Commands::Run { .. } => ("run", false),
        Commands::Scan { .. } => ("scan", true),
        Commands::Collect { .. } => ("collect", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Run {
            config,
            interval,
            ledger_dir,
            fresh,
        } => commands::run::run(config, interval, ledger_dir, fresh),

        Commands::Scan { config, top, csv } => commands::scan::run(config, top, csv),

        Commands::Collect {
            config,
            db,
            interval,
        } => commands::collect::run(config, db, interval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["dex-momentum", "-v", "scan", "--top", "5"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Scan { top: 5, csv: None, .. }));

        let cli = Cli::try_parse_from(["dex-momentum", "run", "--fresh", "--interval", "15"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                fresh: true,
                interval: Some(15),
                ..
            }
        ));
    }

    #[test]
    fn test_console_and_file_logging_initializes() {
        // the global subscriber can only be set once per process
        setup_logging(false, "test", false).unwrap();
        info!("console and file layers active");
    }
}
