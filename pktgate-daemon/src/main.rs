use anyhow::Result;
use clap::Parser;

use pktgate_core::config::PktgateConfig;
use pktgate_daemon::cli::DaemonCli;
use pktgate_daemon::logging::init_tracing;
use pktgate_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> env -> command line
    let mut config = PktgateConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);

    if cli.validate {
        Orchestrator::validate(&config).await?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "pktgate-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("pktgate-daemon shut down");
    Ok(())
}
