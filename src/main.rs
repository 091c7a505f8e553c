//! fleet-proxy binary.
//!
//! `fleet-proxy --config proxy.yaml` runs the dispatcher and spawns the
//! configured number of worker processes from this same executable via the
//! hidden `worker` subcommand. A worker speaks newline-delimited JSON on
//! stdin/stdout and logs to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use fleet_proxy::config::load_config;
use fleet_proxy::lifecycle::{signals, ProxyServer, Shutdown};
use fleet_proxy::observability::{logging, metrics};
use fleet_proxy::{worker, ProxyError, WorkerMode};

#[derive(Parser, Debug)]
#[command(name = "fleet-proxy", version, about = "Rate-limiting, caching reverse proxy over a worker pool")]
struct Cli {
    /// Configuration file (.yaml, .yml, .json or .toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run workers as tasks in this process instead of child processes
    #[arg(long)]
    in_process: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one worker channel on stdin/stdout
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        id: usize,

        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Worker { id, log_level }) => run_worker(id, &log_level),
        None => match cli.config {
            Some(path) => run_dispatcher(path, cli.in_process),
            None => {
                eprintln!("error: --config <FILE> is required");
                return ExitCode::from(2);
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fleet-proxy exited with error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_dispatcher(path: PathBuf, in_process: bool) -> Result<(), ProxyError> {
    let config = load_config(&path)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        config = %path.display(),
        listen = config.server.listen,
        workers = config.server.workers,
        "fleet-proxy v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mode = if in_process {
        WorkerMode::InProcess
    } else {
        WorkerMode::Process { program: std::env::current_exe()? }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let server = ProxyServer::bind(config, mode).await?;
        let shutdown = Shutdown::new();
        tokio::spawn(signals::shutdown_on_ctrl_c(shutdown.clone()));
        server.run(&shutdown).await
    })?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn run_worker(id: usize, log_level: &str) -> Result<(), ProxyError> {
    logging::init_logging(log_level);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let served = runtime.block_on(worker::serve(id, tokio::io::stdin(), tokio::io::stdout()));
    // A stdin read may still be parked on the blocking pool.
    runtime.shutdown_background();
    served?;

    tracing::debug!(worker = id, "Worker exiting");
    Ok(())
}
