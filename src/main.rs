use anyhow::Result;
use clap::Parser;
use tracing::info;

use lustre_job_exporter::{config, exporter, jobs, server};

#[derive(Parser, Debug)]
#[command(
    name = "lustre-job-exporter",
    about = "Prometheus exporter for per-job and per-process Lustre I/O throughput"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/lustre-job-exporter/config.toml")]
    config: String,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("lustre-job-exporter {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let config = config::Config::load(&cli.config)?;

    if cli.check {
        println!("Configuration is valid.");
        return Ok(());
    }

    // Initialize logging
    init_logging(&config)?;

    // The queue-manager command must resolve before serving starts; a host
    // without it can never produce a job snapshot.
    let squeue = jobs::resolve_command(&config.slurm.squeue_command)?;
    info!(command = %squeue.display(), "Resolved queue-manager command");

    let exporter = exporter::Exporter::new(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind,
        "Starting Lustre job exporter"
    );

    server::serve(&config.server.bind, exporter).await
}

fn init_logging(config: &config::Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.agent.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}
