use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::domain::{
    ClientId, Destination, OutcomeRecord, TransferStatus, Trigger, DEFAULT_BEDROCK_PORT,
    DEFAULT_JAVA_PORT,
};
use crate::error::{Result, TransferError};
use crate::host::{SimulatedHost, SimulatedResponse};
use crate::mapping::{MappingDecision, TransferMappings};
use crate::orchestrator::TransferOrchestrator;
use crate::registry::TargetSet;

#[derive(Parser)]
#[command(name = "transfertool")]
#[command(version = "0.1.0")]
#[command(about = "Transfer orchestration core for Bedrock proxies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration directory (default.toml, then the TRANSFERTOOL_ENV file)
    #[arg(short, long, default_value = "config", env = "TRANSFERTOOL_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration and list transfer targets
    Targets {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show where a Java server transfer would land on Bedrock
    Route {
        /// Java address, host[:port] (default port 25565)
        address: String,
    },
    /// Run the transfer pipeline against a simulated host
    Simulate {
        /// Client id of the simulated player
        #[arg(long, default_value = "player")]
        client: String,
        /// Server the client is currently on, host[:port]
        #[arg(long)]
        from: Option<String>,
        /// Target name; omitted means policy-based selection
        target: Option<String>,
        /// Number of attempts the host rejects before acknowledging
        #[arg(long, default_value = "0")]
        failures: u32,
        /// Host never answers (exercises the attempt timeout)
        #[arg(long)]
        hang: bool,
        /// Use the Automatic trigger (allows fallback targets)
        #[arg(long)]
        automatic: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Print the validated target set
pub fn show_targets(config: &AppConfig, json: bool) -> Result<()> {
    let set = TargetSet::from_config(&config.targets)?;

    if json {
        println!("{}", serde_json::to_string_pretty(set.all())?);
        return Ok(());
    }

    if set.is_empty() {
        println!("No transfer targets configured.");
        return Ok(());
    }

    println!("{:<16} {:<32} {}", "NAME", "DESTINATION", "ALIASES");
    for target in set.all() {
        println!(
            "{:<16} {:<32} {}",
            target.name,
            target.destination.to_string(),
            target.aliases.join(", ")
        );
    }
    println!(
        "\n{} targets, selection {}, retry ceiling {}",
        set.len(),
        config.transfer.selection,
        config.transfer.retry_ceiling
    );
    Ok(())
}

/// Print the mapping decision for one Java address
pub fn show_route(config: &AppConfig, address: &str) -> Result<()> {
    let mappings = TransferMappings::from_config(&config.mappings)?;
    let java = Destination::parse(address, DEFAULT_JAVA_PORT)?;

    match mappings.route(&java) {
        MappingDecision::Unmapped => println!("{} -> no mapping (host default)", java),
        decision => println!("{} -> {}", java, decision),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    client_id: ClientId,
    status: TransferStatus,
    history: Vec<OutcomeRecord>,
}

/// Options of one simulated transfer
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    pub client: String,
    pub from: Option<String>,
    pub target: Option<String>,
    pub failures: u32,
    pub hang: bool,
    pub automatic: bool,
    pub json: bool,
}

/// Drive one transfer through the full pipeline and print the outcome
pub async fn run_simulation(config: &AppConfig, sim: Simulation) -> Result<TransferStatus> {
    let client_id = ClientId::new(sim.client.clone());
    let default = if sim.hang {
        SimulatedResponse::Hang
    } else {
        SimulatedResponse::Ack
    };
    let host = Arc::new(SimulatedHost::with_default(default).with_latency(Duration::from_millis(5)));
    host.script(
        &client_id,
        (0..sim.failures).map(|n| SimulatedResponse::Reject(format!("simulated rejection #{}", n + 1))),
    )
    .await;

    let core = TransferOrchestrator::new(config, host)?;
    core.start();

    let current = sim
        .from
        .as_deref()
        .map(|addr| Destination::parse(addr, DEFAULT_BEDROCK_PORT))
        .transpose()?;
    core.open_session(&client_id, current).await;

    let trigger = if sim.automatic {
        Trigger::Automatic
    } else {
        Trigger::Command
    };
    let ticket = core
        .request_transfer(&client_id, sim.target.as_deref(), trigger)
        .await?;
    let transfer_id = ticket.request.transfer_id;
    let status = ticket.wait().await;

    let session = core
        .tracker()
        .session(&client_id)
        .await
        .ok_or_else(|| TransferError::NotFound(format!("session of {}", client_id)))?;
    let history: Vec<OutcomeRecord> = session.run_history(transfer_id).cloned().collect();
    core.shutdown();

    if sim.json {
        let report = SimulationReport {
            client_id,
            status: status.clone(),
            history,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for record in &history {
            println!(
                "attempt {} -> {} ({}): {}",
                record.attempt, record.target, record.destination, record.outcome
            );
        }
        println!("{}", status);
    }

    Ok(status)
}
