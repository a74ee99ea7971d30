use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use shell_worker::config::{JobsFile, DEFAULT_JOBS_FILE};
use shell_worker::shutdown::install_shutdown_handler;
use shell_worker::worker::{Dispatcher, Manager};

#[derive(Parser, Debug)]
#[command(name = "shell-worker")]
#[command(version)]
#[command(about = "Faktory worker that runs a configured command for each job type")]
struct Args {
    /// Jobs file mapping job types to commands
    #[arg(default_value = DEFAULT_JOBS_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let jobs_file = match JobsFile::load(&args.config) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %args.config.display(), error = %e, "Failed to load jobs file");
            return Err(e.into());
        }
    };

    let manager = Manager::new(&jobs_file.worker, Dispatcher::new(jobs_file.jobs));
    let shutdown = install_shutdown_handler();
    manager.run(shutdown).await?;

    Ok(())
}
