mod cli;

use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use surrogate::{SurrogateConfig, Surrogate, TaskKernel, TaskRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let home = cli.home_dir();

    surrogate::init_logging(&home)?;

    let mut config = match &cli.config {
        Some(path) => SurrogateConfig::load(path)?,
        None => SurrogateConfig::default(),
    };
    if let Some(cores) = cli.cores {
        config.cpu.cores = cores;
    }
    if cli.debug {
        tracing::debug!("debug logging requested via -d");
    }

    tracing::info!(home = %home.display(), cores = config.cpu.cores, "starting surrogate daemon");

    let registry = Arc::new(TaskRegistry::open(home.clone())?);
    let kernel = Arc::new(TaskKernel::with_demo_fixtures());
    let surrogate = Surrogate::start(registry, kernel, config);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    drop(surrogate);

    Ok(())
}
