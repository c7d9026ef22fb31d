use clap::Parser;
use transfertool::cli::{self, Cli, Commands, Simulation};
use transfertool::config::AppConfig;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command {
        Commands::Targets { json } => {
            init_logging_simple();
            cli::show_targets(&config, json)?;
        }
        Commands::Route { address } => {
            init_logging_simple();
            cli::show_route(&config, &address)?;
        }
        Commands::Simulate {
            client,
            from,
            target,
            failures,
            hang,
            automatic,
            json,
        } => {
            init_logging(&config.logging);
            let status = cli::run_simulation(
                &config,
                Simulation {
                    client,
                    from,
                    target,
                    failures,
                    hang,
                    automatic,
                    json,
                },
            )
            .await?;

            if !status.is_confirmed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
