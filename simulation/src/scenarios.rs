//! Pre-defined simulation scenarios
//!
//! Each scenario builds a mesh, drives it through a short story and
//! prints what happened. The returned [`Simulation`] can be inspected
//! afterwards.

use std::time::Duration;

use tracing::info;

use crate::simulation::{SimConfig, Simulation};
use crate::topology::{MeshBuilder, from_edges};
use crate::types::{NetworkEvent, PeerId, SimResult};

/// Round trip over a relay:
///
/// ```text
/// A - B - D
/// A sends to D with an empty table; the packet is buffered and a route
/// request floods through B
/// D replies, A installs the route via B and releases the packet
/// D answers A over the reverse route the request left behind
/// ```
pub fn run_round_trip_scenario(config: SimConfig) -> SimResult<Simulation> {
    info!("=== Running Round Trip Scenario ===");

    let mesh = from_edges(&[('A', 'B'), ('B', 'D')])?;
    println!("{}", mesh.visualize());

    let mut sim = Simulation::new(mesh, config)?;
    sim.start()?;

    println!("\n--- Step 1: A sends to D (no route yet) ---");
    sim.send_message(PeerId('A'), PeerId('D'), b"Hello D!".to_vec())?;
    sim.run_for(Duration::from_secs(1))?;
    println!("  {}", sim.state_summary());

    println!("\n--- Step 2: D answers A ---");
    sim.send_message(PeerId('D'), PeerId('A'), b"Hello A!".to_vec())?;
    sim.run_for(Duration::from_secs(1))?;
    println!("  {}", sim.state_summary());

    print_tables(&sim);
    Ok(sim)
}

/// Multi-hop discovery along a line of `peers` nodes: A sends to the far end
pub fn run_line_discovery_scenario(peers: usize, config: SimConfig) -> SimResult<Simulation> {
    info!(peers, "=== Running Line Discovery Scenario ===");

    let mesh = MeshBuilder::new(peers.max(2)).line();
    println!("{}", mesh.visualize());
    let ids = mesh.peer_ids();
    let (first, last) = (ids[0], ids[ids.len() - 1]);

    let mut sim = Simulation::new(mesh, config)?;
    sim.start()?;

    println!("\n--- {} sends to {} ---", first, last);
    sim.send_message(first, last, b"Across the line".to_vec())?;
    sim.run_for(Duration::from_secs(2))?;
    println!("  {}", sim.state_summary());

    print_tables(&sim);
    Ok(sim)
}

/// Link break with route error propagation
///
/// ```text
/// A - B - C - D
/// A reaches D, then the C - D link fails
/// C's next unicast to D fails, C reports the break upstream and
/// B and A drop their routes to D
/// ```
pub fn run_link_break_scenario(config: SimConfig) -> SimResult<Simulation> {
    info!("=== Running Link Break Scenario ===");

    let mesh = MeshBuilder::new(4).line();
    println!("{}", mesh.visualize());

    let mut sim = Simulation::new(mesh, config)?;
    sim.start()?;

    println!("\n--- Step 1: A reaches D ---");
    sim.send_message(PeerId('A'), PeerId('D'), b"first".to_vec())?;
    sim.run_for(Duration::from_secs(1))?;
    println!("  {}", sim.state_summary());

    println!("\n--- Step 2: C - D link fails, A sends again ---");
    sim.link_down_after(Duration::ZERO, PeerId('C'), PeerId('D'))?;
    sim.send_after(Duration::from_millis(10), PeerId('A'), PeerId('D'), b"second".to_vec())?;
    sim.run_for(Duration::from_millis(200))?;
    println!("  {}", sim.state_summary());

    print_tables(&sim);
    Ok(sim)
}

/// Unreachable destination: two islands, A keeps asking for C until it gives up
pub fn run_unreachable_scenario(config: SimConfig) -> SimResult<Simulation> {
    info!("=== Running Unreachable Destination Scenario ===");

    let mesh = from_edges(&[('A', 'B'), ('C', 'D')])?;
    println!("{}", mesh.visualize());

    let mut sim = Simulation::new(mesh, config)?;
    sim.start()?;

    println!("\n--- A sends to C across the gap ---");
    sim.send_message(PeerId('A'), PeerId('C'), b"anyone?".to_vec())?;
    sim.run_for(Duration::from_secs(30))?;
    println!("  {}", sim.state_summary());

    for event in sim.events() {
        if let NetworkEvent::RouteUnreachable { node, destination, reason, at } = event {
            println!("  {} gave up on {} at {}: {}", node, destination, at, reason);
        }
    }
    Ok(sim)
}

/// Periodic-mode convergence on a ring of `peers` nodes
pub fn run_ring_convergence_scenario(peers: usize, config: SimConfig) -> SimResult<Simulation> {
    info!(peers, "=== Running Ring Convergence Scenario ===");

    let mesh = MeshBuilder::new(peers.max(3)).ring();
    println!("{}", mesh.visualize());

    let mut sim = Simulation::new(mesh, config)?;
    sim.start()?;

    println!("\n--- Exchanging tables ---");
    sim.run_for(Duration::from_secs(20))?;
    println!("  {}", sim.state_summary());

    let ids = sim.mesh.peer_ids();
    let opposite = ids[ids.len() / 2];
    println!("\n--- A sends to {} ---", opposite);
    sim.send_message(PeerId('A'), opposite, b"Around the ring".to_vec())?;
    sim.run_for(Duration::from_secs(1))?;
    println!("  {}", sim.state_summary());

    print_tables(&sim);
    Ok(sim)
}

fn print_tables(sim: &Simulation) {
    println!("\n=== Routing Tables ===");
    for peer in sim.mesh.peer_ids() {
        println!("{}", sim.routing_table_summary(peer));
    }
}
