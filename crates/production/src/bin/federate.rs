//! fedlink federate CLI
//!
//! Validates federate configuration and probes connectivity to a running
//! coordinator.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fedlink_control::FederatePlan;
use fedlink_core::{PhysicalClock, PortAnnotations, ReceivedMessage, Scheduler};
use fedlink_production::{telemetry, FederateConfig, FederateRuntime};
use fedlink_types::{PortId, PortRef, PortValue, Tag};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fedlink-federate")]
#[command(about = "Federate runtime for federated reactor execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file
    Check {
        /// Path to the federate configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Connect to the coordinator and peers, report the clock offset, then resign
    Connect {
        /// Path to the federate configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// How long to stay connected (e.g., "500ms", "10s")
        #[arg(long, default_value = "1s")]
        linger: humantime::Duration,
    },
}

/// Scheduler used by `connect`: no reactions, logs whatever arrives.
struct ProbeScheduler {
    clock: PhysicalClock,
}

impl Scheduler for ProbeScheduler {
    fn current_tag(&self) -> Tag {
        Tag::at(self.clock.now_physical())
    }

    fn is_present(&self, _port: &PortRef) -> bool {
        false
    }

    fn get(&self, _port: &PortRef) -> Option<PortValue> {
        None
    }

    fn set(&self, _port: &PortRef, _value: PortValue) {}

    fn annotate(&self, _port: &PortRef, _annotations: PortAnnotations) {}

    fn mark_absent(&self, _port: &PortRef) {}

    fn schedule_network_message(&self, action: PortId, message: ReceivedMessage) {
        info!(
            %action,
            bytes = message.payload.len(),
            tag = ?message.intended_tag,
            "Message received"
        );
    }
}

fn load(path: &PathBuf) -> anyhow::Result<FederateConfig> {
    let config = FederateConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = load(&config)?;
            println!("federate:      {}", config.federate_id);
            println!("federation:    {}", config.federation_id);
            println!(
                "coordinator:   {}:{}",
                config.coordinator.host, config.coordinator.port
            );
            println!("coordination:  {:?}", config.coordination.mode);
            println!("clock sync:    {:?}", config.clock_sync.mode);
            println!("inbound peers: {:?}", config.peers.inbound);
            println!(
                "outbound peers: {:?}",
                config.peers.outbound.iter().map(|p| p.id).collect::<Vec<_>>()
            );
        }

        Commands::Connect { config, linger } => {
            telemetry::init();
            let config = load(&config)?;

            let plan = FederatePlan::build(
                config.federate_id,
                &[],
                config.coordination.mode,
                &HashMap::new(),
            )?;
            let scheduler = Arc::new(ProbeScheduler {
                clock: PhysicalClock::new(),
            });
            let mut runtime = FederateRuntime::new(config, plan, scheduler)?;
            runtime.start()?;

            println!("clock offset: {}", runtime.clock().offset().get());
            std::thread::sleep(linger.into());
            runtime.shutdown();
        }
    }

    Ok(())
}
