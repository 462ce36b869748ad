mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// vigil -- reliability watchdog for an AI-agent gateway.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Path to the watchdog's key=value config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (RUST_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the supervision loop in the foreground
    Start,

    /// Stop a running watchdog (SIGTERM to the recorded pid)
    Stop,

    /// Show supervisor, gateway, safeguard, and backup status
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Confirm the pending config change, disarming the rollback window
    Confirm,

    /// Roll the gateway config back to a snapshot
    Rollback {
        /// Snapshot path (defaults to the armed ticket's, else the newest)
        snapshot: Option<PathBuf>,
    },

    /// Take a manual snapshot of the gateway config
    Snapshot,

    /// Print the watchdog version
    Version,
}

fn env_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn main() {
    // The external dispatcher expects exit 1 for unknown commands or bad
    // arguments; clap's default of 2 is remapped here.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let filter = env_filter(cli.verbose, cli.quiet);
    let result = match cli.command {
        Commands::Start => commands::start(cli.config.as_deref(), filter),
        other => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            match other {
                Commands::Start => unreachable!("handled above"),
                Commands::Stop => commands::stop(cli.config.as_deref()),
                Commands::Status { format } => commands::status(cli.config.as_deref(), &format),
                Commands::Confirm => commands::confirm(cli.config.as_deref()),
                Commands::Rollback { snapshot } => {
                    commands::rollback(cli.config.as_deref(), snapshot.as_deref())
                }
                Commands::Snapshot => commands::snapshot(cli.config.as_deref()),
                Commands::Version => {
                    println!("vigil {}", env!("CARGO_PKG_VERSION"));
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
