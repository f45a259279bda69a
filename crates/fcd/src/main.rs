//! Folder Context Daemon CLI
//!
//! Thin client of the daemon's control surface, plus the `daemon`
//! subcommand that hosts it. Exit codes: 0 success, 2 usage error (from
//! clap), 3 daemon not running, 4 internal error.

mod client;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use fcd_infrastructure::config::FcdConfig;

const EXIT_DAEMON_NOT_RUNNING: u8 = 3;
const EXIT_INTERNAL: u8 = 4;

#[derive(Parser)]
#[command(name = "fcd", version, about = "Semantic folder search daemon for MCP clients")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon in the foreground
    Daemon {
        /// Additionally serve MCP on stdio (for MCP client subprocesses)
        #[arg(long)]
        stdio: bool,
    },
    /// Stop a running daemon
    Stop,
    /// Add a folder to the index
    Add {
        /// Folder path
        path: PathBuf,
        /// Embedding model id (daemon default when omitted)
        #[arg(long)]
        model: Option<String>,
    },
    /// Remove a folder from the index
    Remove {
        /// Folder path
        path: PathBuf,
    },
    /// Re-scan a folder, optionally switching the model
    Reindex {
        /// Folder path
        path: PathBuf,
        /// New embedding model id
        #[arg(long)]
        model: Option<String>,
    },
    /// Print daemon diagnostics
    Diagnostics,
    /// Print folder status
    Status,
    /// Print the version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match FcdConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet for config failures
            eprintln!("fcd: configuration error: {e}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fcd: runtime start failed: {e}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: FcdConfig) -> ExitCode {
    match command {
        Command::Daemon { stdio } => {
            let guard = match fcd_infrastructure::logging::init(
                "info",
                config.daemon.log_file.as_deref(),
            ) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("fcd: logging init failed: {e}");
                    return ExitCode::from(EXIT_INTERNAL);
                }
            };
            let result = fcd_server::run_daemon(config.clone(), stdio).await;
            drop(guard);
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "daemon failed");
                    if let Some(path) = &config.daemon.log_file {
                        eprintln!("fcd: daemon failed: {e} (log: {})", path.display());
                    } else {
                        eprintln!("fcd: daemon failed: {e}");
                    }
                    ExitCode::from(EXIT_INTERNAL)
                }
            }
        }
        Command::Version => {
            println!("fcd {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        other => {
            let client = client::ControlClient::new(&config.daemon.bind_addr);
            let outcome = match other {
                Command::Stop => client.stop().await,
                Command::Add { path, model } => client.add(&path, model).await,
                Command::Remove { path } => client.remove(&path).await,
                Command::Reindex { path, model } => client.reindex(&path, model).await,
                Command::Diagnostics => client.diagnostics().await,
                Command::Status => client.status().await,
                Command::Daemon { .. } | Command::Version => unreachable!(),
            };
            match outcome {
                Ok(output) => {
                    println!("{output}");
                    ExitCode::SUCCESS
                }
                Err(client::ClientError::NotRunning) => {
                    eprintln!(
                        "fcd: daemon not running at {} (start it with `fcd daemon`)",
                        config.daemon.bind_addr
                    );
                    ExitCode::from(EXIT_DAEMON_NOT_RUNNING)
                }
                Err(client::ClientError::Rejected(message)) => {
                    eprintln!("fcd: {message}");
                    ExitCode::from(2)
                }
                Err(client::ClientError::Internal(message)) => {
                    eprintln!("fcd: {message}");
                    ExitCode::from(EXIT_INTERNAL)
                }
            }
        }
    }
}
