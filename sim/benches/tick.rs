//! Tick cost with a company on each side.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use skirmish_sim::{SimConfig, SimWorld, UnitSize};

fn battle(unit: UnitSize) -> SimWorld {
    SimWorld::new(SimConfig {
        seed: Some(42),
        starting_unit: Some(unit),
        reinforcement_interval: None,
        ..SimConfig::default()
    })
    .expect("battlefield")
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for (label, unit) in [("platoon", UnitSize::Platoon), ("company", UnitSize::Company)] {
        group.bench_function(label, |b| {
            b.iter_batched_ref(
                || {
                    let mut sim = battle(unit);
                    // Let the first orders go out and sensing settle.
                    for _ in 0..30 {
                        sim.tick();
                    }
                    sim
                },
                |sim| {
                    sim.tick();
                    black_box(sim.current_tick())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_world_build(c: &mut Criterion) {
    c.bench_function("build_world", |b| b.iter(|| black_box(battle(UnitSize::Squad))));
}

criterion_group!(benches, bench_tick, bench_world_build);
criterion_main!(benches);
