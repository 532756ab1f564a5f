//! Basic demonstration of the skirmish simulation.
//!
//! Run with: cargo run --example basic_demo [config.json]
//! Set `RUST_LOG=skirmish_sim=debug` for more detail.

use skirmish_sim::{init_logging, Side, SimConfig, SimResult, SimWorld};

fn main() -> SimResult<()> {
    init_logging("skirmish_sim=info");

    let config = match std::env::args().nth(1) {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig {
            seed: Some(2024),
            ..SimConfig::default()
        },
    };
    let mut sim = SimWorld::new(config)?;
    let stats = sim.terrain_stats();
    println!(
        "Battlefield: {} trees ({} cleared for roads), {} walls, {} road segments",
        stats.trees, stats.trees_cleared, stats.walls, stats.road_segments
    );
    print_status(&mut sim);

    // Ten simulated minutes at most, reported every ten seconds.
    for second in 1..=600 {
        sim.step(1.0);
        for line in sim.drain_info() {
            println!("[{:>6.1}s] {line}", sim.current_time());
        }
        if second % 10 == 0 {
            print_status(&mut sim);
        }
        if sim.outcome().is_decided() {
            break;
        }
    }

    match sim.outcome().winner() {
        Some(side) => println!("\n{} wins ({})", side.label(), sim.outcome().reason().unwrap_or("")),
        None => println!("\nNo decision after {:.0}s", sim.current_time()),
    }
    Ok(())
}

fn print_status(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();
    println!(
        "--- t={:.0}s tick {}: Blue {} alive, Red {} alive, {} bullets in flight, {} foxholes",
        snapshot.time,
        snapshot.tick,
        sim.living(Side::Blue),
        sim.living(Side::Red),
        snapshot.bullets.len(),
        snapshot.foxholes.len()
    );
}
