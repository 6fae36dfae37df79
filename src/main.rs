use clap::Parser;

use hotreload::cli::commands::{init, run, watch};
use hotreload::cli::{Cli, Commands};
use hotreload::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    hotreload::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => {
            init::run_config(&settings);
            Ok(())
        }
        Commands::Run { file, entry } => run::run(file, entry, settings).await,
        Commands::Watch { path } => watch::run(path, settings).await,
    }
}
