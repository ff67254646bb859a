//! Basic demonstration of the foraging simulation.
//!
//! Run with: cargo run --example foraging_demo
//! Set `RUST_LOG=debug` to see retargeting and feeding detail.

use forage_sim::{Action, ForageWorld, ForagerMode, SimConfig, SimError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), SimError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    println!("=== Forage Sim - Meadow Demo ===\n");

    let config = SimConfig { seed: 7, ..Default::default() };
    let (mut sim, agent) = ForageWorld::demo_meadow(config, ForagerMode::Evaluation)?;

    println!("Initial state:");
    print_snapshot(&sim);

    // Scripted forager: fly at the harvest point of the nearest flower.
    println!("\nRunning 1500 ticks (30 seconds at 50 ticks/sec)...\n");
    for _ in 0..1500 {
        let pose = sim.pose(agent)?;
        let action = match sim.nearest_target(agent)?.and_then(|t| sim.source(t)) {
            Some(source) => {
                let approach = source.position + source.up * 0.1;
                let heading = (approach - pose.position).normalize_or_zero();
                Action([heading.x, heading.y, heading.z, 0.0, 0.0])
            }
            None => Action::default(),
        };
        sim.set_action(agent, action)?;
        sim.fixed_update()?;

        if sim.current_tick() % 250 == 0 {
            println!("--- Tick {} (t={:.1}s) ---", sim.current_tick(), sim.current_time());
            print_snapshot(&sim);
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty()?);
    Ok(())
}

fn print_snapshot(sim: &ForageWorld) {
    let snapshot = sim.snapshot();

    for agent in &snapshot.agents {
        println!(
            "  Forager {}: pos=({:.2}, {:.2}, {:.2}) nectar={:.2} reward={:.3} target={:?}",
            agent.id,
            agent.position.x,
            agent.position.y,
            agent.position.z,
            agent.nectar_obtained,
            agent.episode_reward,
            agent.nearest_target
        );
    }

    let remaining: f32 = snapshot.sources.iter().map(|s| s.nectar).sum();
    let empty = snapshot.sources.iter().filter(|s| s.nectar <= 0.0).count();
    println!("  Sources: {} total, {} empty, {:.2} nectar left", snapshot.sources.len(), empty, remaining);
}
