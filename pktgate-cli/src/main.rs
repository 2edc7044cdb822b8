mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // diagnostics go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        use colored::Colorize;
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let default_config = cli.config_path();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &default_config, &writer).await,
        Commands::Tables(args) => commands::tables::execute(args, config_path, &writer).await,
        Commands::Classify(args) => commands::classify::execute(args, config_path, &writer).await,
    }
}
