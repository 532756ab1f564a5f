//! End-to-end scenarios driven through the public `SimWorld` API.

use bevy_ecs::entity::Entity;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use skirmish_sim::config::RoadConfig;
use skirmish_sim::geometry::Rect;
use skirmish_sim::roads;
use skirmish_sim::systems::bullets::kill;
use skirmish_sim::systems::command::promote;
use skirmish_sim::*;

fn empty_world() -> SimWorld {
    SimWorld::new(SimConfig {
        seed: Some(11),
        ..SimConfig::empty()
    })
    .unwrap()
}

fn bullets(sim: &mut SimWorld) -> usize {
    let world = sim.world_mut();
    world.query::<&Bullet>().iter(world).count()
}

#[test]
fn dead_soldiers_cannot_act() {
    let mut sim = empty_world();
    let soldier = sim
        .spawn_soldier(Side::Blue, Rank::Sergeant, Vec2::new(100.0, 100.0), 0.0, &["Rifle"], false)
        .unwrap();
    let friend = sim
        .spawn_soldier(Side::Blue, Rank::Private, Vec2::new(102.0, 100.0), 0.0, &[], false)
        .unwrap();
    kill(sim.world_mut(), soldier).unwrap();

    for action in [
        SoldierAction::Move(Vec2::X),
        SoldierAction::Turn(Vec2::Y),
        SoldierAction::Shoot(Vec2::X),
        SoldierAction::Dig,
        SoldierAction::Communicate {
            target: friend,
            kind: MessageKind::Acknowledgement,
        },
    ] {
        assert_eq!(sim.perform(soldier, action).unwrap(), ActionOutcome::Refused(Refusal::Dead));
    }
    assert!(!sim.soldier(friend).unwrap().can_communicate_with(sim.world(), soldier).unwrap());
}

#[test]
fn stale_handle_is_an_error() {
    let mut sim = empty_world();
    let soldier = sim
        .spawn_soldier(Side::Red, Rank::Private, Vec2::new(100.0, 100.0), 0.0, &[], false)
        .unwrap();
    sim.world_mut().despawn(soldier);
    assert!(matches!(
        sim.perform(soldier, SoldierAction::Move(Vec2::X)),
        Err(SimError::InvalidReference(_))
    ));
    assert!(matches!(sim.soldier(soldier), Err(SimError::InvalidReference(_))));
}

#[test]
fn promotion_happens_once() {
    let mut sim = empty_world();
    let lt = sim
        .spawn_soldier(Side::Blue, Rank::Lieutenant, Vec2::new(100.0, 100.0), 0.0, &[], true)
        .unwrap();
    let sgt = sim
        .spawn_soldier(Side::Blue, Rank::Sergeant, Vec2::new(120.0, 100.0), 0.0, &[], true)
        .unwrap();
    let privates: Vec<Entity> = (0..3)
        .map(|i| {
            sim.spawn_soldier(Side::Blue, Rank::Private, Vec2::new(125.0, 95.0 + i as f32 * 5.0), 0.0, &["Rifle"], true)
                .unwrap()
        })
        .collect();
    sim.attach(lt, sgt).unwrap();
    for &p in &privates {
        sim.attach(sgt, p).unwrap();
    }
    kill(sim.world_mut(), sgt).unwrap();

    // Every private checks; only the first one in gets the job.
    let promoted: Vec<bool> = privates.iter().map(|&p| promote(sim.world_mut(), p).unwrap()).collect();
    assert_eq!(promoted, vec![true, false, false]);
    let heir = sim.soldier(privates[0]).unwrap();
    assert_eq!(heir.rank, Rank::Sergeant);
    assert_eq!(heir.leader, Some(lt));
    assert_eq!(heir.commandees, privates[1..].to_vec());
    assert_eq!(sim.soldier(lt).unwrap().commandees, vec![privates[0]]);

    // Running the AI afterwards changes nothing structural.
    for _ in 0..60 {
        sim.tick();
    }
    assert_eq!(sim.soldier(privates[0]).unwrap().rank, Rank::Sergeant);
    assert_eq!(sim.soldier(privates[1]).unwrap().rank, Rank::Private);
}

#[test]
fn voice_and_radio_ranges() {
    let mut sim = empty_world();
    let private = sim
        .spawn_soldier(Side::Blue, Rank::Private, Vec2::new(100.0, 100.0), 0.0, &[], false)
        .unwrap();
    let near = sim
        .spawn_soldier(Side::Blue, Rank::Sergeant, Vec2::new(199.0, 100.0), 0.0, &[], false)
        .unwrap();
    let far = sim
        .spawn_soldier(Side::Blue, Rank::Sergeant, Vec2::new(100.0, 201.0), 0.0, &[], false)
        .unwrap();
    let radio_near = sim
        .spawn_soldier(Side::Blue, Rank::Lieutenant, Vec2::new(1099.0, 201.0), 0.0, &[], false)
        .unwrap();
    let radio_far = sim
        .spawn_soldier(Side::Blue, Rank::Captain, Vec2::new(1101.0, 201.0), 0.0, &[], false)
        .unwrap();

    let view = sim.soldier(private).unwrap();
    assert!(view.can_communicate_with(sim.world(), near).unwrap());
    assert!(!view.can_communicate_with(sim.world(), far).unwrap());

    // Both carry radios: 999 apart works, 1001 does not.
    let sergeant = sim.soldier(far).unwrap();
    assert!(sergeant.can_communicate_with(sim.world(), radio_near).unwrap());
    assert!(!sergeant.can_communicate_with(sim.world(), radio_far).unwrap());
}

#[test]
fn bullet_lives_for_range_over_velocity() {
    let mut sim = empty_world();
    let shooter = sim
        .spawn_soldier(Side::Blue, Rank::Private, Vec2::new(100.0, 400.0), 0.0, &["Rifle"], false)
        .unwrap();
    assert_eq!(sim.perform(shooter, SoldierAction::Shoot(Vec2::X)).unwrap(), ActionOutcome::Done);
    assert_eq!(bullets(&mut sim), 1);

    // Rifle: 300 / 700 = 0.4286 s, which is between tick 12 and tick 13 at 30 Hz.
    for _ in 0..12 {
        sim.tick();
    }
    assert_eq!(bullets(&mut sim), 1);
    sim.tick();
    assert_eq!(bullets(&mut sim), 0);

    // The gun is still cycling.
    assert_eq!(
        sim.perform(shooter, SoldierAction::Shoot(Vec2::X)).unwrap(),
        ActionOutcome::Refused(Refusal::Reloading)
    );
}

#[test]
fn bullet_hits_only_the_first_body() {
    let mut sim = empty_world();
    let shooter = sim
        .spawn_soldier(Side::Blue, Rank::Private, Vec2::new(100.0, 400.0), 0.0, &["Rifle"], false)
        .unwrap();
    let front = sim
        .spawn_soldier(Side::Red, Rank::Private, Vec2::new(110.0, 400.0), 0.0, &[], false)
        .unwrap();
    let behind = sim
        .spawn_soldier(Side::Red, Rank::Private, Vec2::new(112.0, 400.0), 0.0, &[], false)
        .unwrap();
    sim.perform(shooter, SoldierAction::Shoot(Vec2::X)).unwrap();
    for _ in 0..15 {
        sim.tick();
    }
    assert!(!sim.soldier(front).unwrap().alive);
    let rear = sim.soldier(behind).unwrap();
    assert!(rear.alive);
    assert_eq!(rear.health, sim.config().soldier_health);
    assert_eq!(bullets(&mut sim), 0);
}

#[test]
fn roads_repeat_for_the_same_seed() {
    let bounds = Rect::new(Vec2::ZERO, Vec2::new(1200.0, 800.0));
    let config = RoadConfig::default();
    let a = roads::generate(bounds, &config, &mut StdRng::seed_from_u64(99)).unwrap();
    let b = roads::generate(bounds, &config, &mut StdRng::seed_from_u64(99)).unwrap();
    assert_eq!(a.nodes, b.nodes);
    assert_eq!(a.significant, b.significant);
    assert_eq!(a.edges, b.edges);
    assert!(!a.edges.is_empty());
}

#[test]
fn private_shoots_the_dictator() {
    let mut sim = empty_world();
    let dictator = sim.spawn_dictator(Side::Red).unwrap();
    let at = sim.soldier(dictator).unwrap().position;
    let private = sim
        .spawn_soldier(Side::Blue, Rank::Private, at - Vec2::new(5.0, 0.0), 0.0, &["Rifle"], true)
        .unwrap();

    let mut ticks = 0;
    while !sim.outcome().is_decided() && ticks < 3000 {
        sim.tick();
        ticks += 1;
    }
    assert!(sim.team_won(Side::Blue), "undecided after {ticks} ticks");
    // The body may already have been reaped.
    assert!(sim.soldier(dictator).map_or(true, |d| !d.alive));
    assert!(sim.soldier(private).unwrap().alive);
    assert!(sim.drain_info().iter().any(|m| m.contains("Blue")));
}

#[test]
fn armies_fight_to_a_result() {
    let mut sim = SimWorld::new(SimConfig {
        seed: Some(5),
        starting_unit: Some(UnitSize::Squad),
        spawn_dictators: false,
        reinforcement_interval: None,
        world_width: 400.0,
        world_height: 200.0,
        roads: RoadConfig {
            enabled: false,
            ..RoadConfig::default()
        },
        ..SimConfig::default()
    })
    .unwrap();
    let start = (sim.living(Side::Blue), sim.living(Side::Red));
    assert_eq!(start, (8, 8));

    // Five simulated minutes is ample for two squads on a small field.
    for _ in 0..(30 * 300) {
        sim.tick();
        if sim.outcome().is_decided() {
            break;
        }
    }
    let losses = (8 - sim.living(Side::Blue)) + (8 - sim.living(Side::Red));
    assert!(losses > 0, "nobody was hurt in five minutes");
}

#[test]
fn armed_soldier_wins_a_close_duel() {
    let mut sim = empty_world();
    let shooter = sim
        .spawn_soldier(Side::Blue, Rank::Private, Vec2::new(300.0, 400.0), 0.0, &["Rifle"], true)
        .unwrap();
    let target = sim
        .spawn_soldier(Side::Red, Rank::Private, Vec2::new(305.0, 400.0), std::f32::consts::PI, &[], false)
        .unwrap();

    for _ in 0..(30 * 30) {
        sim.tick();
        if sim.outcome().is_decided() {
            break;
        }
    }
    assert!(sim.soldier(target).map_or(true, |t| !t.alive && t.health <= 0.0));
    assert!(sim.soldier(shooter).unwrap().alive);
    assert!(sim.team_won(Side::Blue));
    assert!(!sim.team_won(Side::Red));
}
