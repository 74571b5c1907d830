//! meshroute simulator
//!
//! Runs the reactive and periodic routing engines over simulated meshes,
//! either in virtual time or live on tokio.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use meshroute_logging::{LogConfig, MeshSubscriberBuilder};
use meshroute_routing::RoutingMode;
use meshroute_simulation::{LiveNetwork, MeshBuilder, SimConfig, scenarios};

#[derive(Parser)]
#[command(
    name = "meshroute-sim",
    about = "Distance-vector routing over simulated meshes",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON simulation config (routing mode, latency, duration, link feedback)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// A sends to D through B and D answers
    RoundTrip,

    /// Route discovery along a line
    Line {
        /// Number of peers (max 26)
        #[arg(short, long, default_value = "5")]
        peers: usize,
    },

    /// Break a link on an active route and watch the error propagate
    LinkBreak,

    /// Send to a peer on another island until discovery gives up
    Unreachable,

    /// Periodic-mode convergence on a ring
    Ring {
        /// Number of peers (max 26)
        #[arg(short, long, default_value = "4")]
        peers: usize,
    },

    /// Create and visualize a topology
    Topology {
        /// Type of topology: ring, full, random, line, star
        #[arg(short, long, default_value = "ring")]
        topology: String,

        /// Number of peers (max 26)
        #[arg(short, long, default_value = "6")]
        peers: usize,

        /// Connection probability for random topology
        #[arg(long, default_value = "0.4")]
        connection_prob: f64,
    },

    /// Run the engines as tokio tasks and send one packet end to end
    Live {
        /// Type of topology: ring, full, random, line, star
        #[arg(short, long, default_value = "line")]
        topology: String,

        /// Number of peers (max 26)
        #[arg(short, long, default_value = "5")]
        peers: usize,

        /// Seconds to wait for delivery
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig {
            default_level: "info".to_string(),
            ..LogConfig::development()
        }
    };
    let _log_guard = MeshSubscriberBuilder::new().with_config(log_config).init();

    let file_config = cli
        .config
        .as_ref()
        .map(|path| SimConfig::load(path).with_context(|| format!("loading {}", path.display())))
        .transpose()?;
    let reactive = || file_config.clone().unwrap_or_else(SimConfig::quiet_reactive);

    match cli.command {
        Commands::RoundTrip => {
            scenarios::run_round_trip_scenario(reactive())?;
        }
        Commands::Line { peers } => {
            scenarios::run_line_discovery_scenario(peers, reactive())?;
        }
        Commands::LinkBreak => {
            scenarios::run_link_break_scenario(reactive())?;
        }
        Commands::Unreachable => {
            scenarios::run_unreachable_scenario(reactive())?;
        }
        Commands::Ring { peers } => {
            let config = file_config.clone().unwrap_or_else(SimConfig::periodic);
            scenarios::run_ring_convergence_scenario(peers, config)?;
        }
        Commands::Topology {
            topology,
            peers,
            connection_prob,
        } => {
            let Some(mesh) = MeshBuilder::new(peers).named(&topology, connection_prob) else {
                bail!("Unknown topology: {topology}. Use: ring, full, random, line, star");
            };
            println!("{}", mesh.visualize());
        }
        Commands::Live {
            topology,
            peers,
            timeout,
        } => {
            let mode = file_config.map(|c| c.mode).unwrap_or_else(RoutingMode::reactive);
            run_live(&topology, peers, mode, Duration::from_secs(timeout)).await?;
        }
    }

    Ok(())
}

async fn run_live(topology: &str, peers: usize, mode: RoutingMode, timeout: Duration) -> anyhow::Result<()> {
    let Some(mesh) = MeshBuilder::new(peers).named(topology, 0.4) else {
        bail!("Unknown topology: {topology}. Use: ring, full, random, line, star");
    };
    println!("{}", mesh.visualize());

    let ids = mesh.peer_ids();
    let (Some(&first), Some(&last)) = (ids.first(), ids.last()) else {
        bail!("Topology has no peers");
    };

    let mut network = LiveNetwork::spawn(mesh, mode)?;
    let started = tokio::time::Instant::now();
    let id = network.send(first, last, b"Hello over tokio".to_vec())?;

    match network.wait_for_delivery(last, timeout).await {
        Some(packet) => println!(
            "Packet {} from {} reached {} in {:?} ({} bytes, ttl {})",
            id,
            first,
            last,
            started.elapsed(),
            packet.payload.len(),
            packet.header.ttl
        ),
        None => println!("Packet {} from {} did not reach {} within {:?}", id, first, last, timeout),
    }
    network.shutdown().await;
    Ok(())
}
