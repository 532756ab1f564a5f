//! Match lifecycle: win detection, reinforcements and reaping the dead.

use crate::components::*;
use crate::config::{SimConfig, SimRng, UnitSize};
use crate::logging::InfoChannel;
use crate::spatial::SpatialGrid;
use crate::spawn::{attach, side_heading, spawn_unit};
use crate::systems::actions::is_alive;
use crate::systems::movement::DeltaTime;
use crate::terrain::deployment_zone;
use crate::timer::Countdown;
use bevy_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;
use tracing::{debug, info, warn};

/// How the match stands.
#[derive(Resource, Debug, Clone, Default)]
pub struct Outcome {
    winner: Option<Side>,
    reason: Option<String>,
    /// Soldiers ever fielded per side, dictators excluded.
    pub fielded: [usize; 2],
}

impl Outcome {
    /// Record `winner`. Only the first declaration counts; returns whether this one did.
    pub fn declare(&mut self, winner: Side, reason: String) -> bool {
        if self.winner.is_some() {
            return false;
        }
        self.winner = Some(winner);
        self.reason = Some(reason);
        true
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn team_won(&self, side: Side) -> bool {
        self.winner == Some(side)
    }

    pub fn is_decided(&self) -> bool {
        self.winner.is_some()
    }
}

/// Duty-cycle clocks for the lifecycle sweeps.
#[derive(Resource, Debug, Clone)]
pub struct LifecycleClocks {
    pub reap: Countdown,
    pub win: Countdown,
    pub reinforce: [Option<Countdown>; 2],
}

impl LifecycleClocks {
    pub fn from_config(config: &SimConfig) -> Self {
        let reinforce = config.reinforcement_interval.filter(|p| *p > 0.0).map(Countdown::repeating);
        Self {
            reap: Countdown::repeating(config.reap_period),
            win: Countdown::repeating(config.win_check_period),
            reinforce: [reinforce, reinforce],
        }
    }
}

/// System that ends the match once a side has nobody left standing.
///
/// A side loses when it has fielded soldiers and none of them is alive. Dictators
/// do not count; their own death is decided where they die.
///
/// ## Data Access
/// - Reads: DeltaTime, Side, Dead, Dictator
/// - Writes: Outcome, LifecycleClocks, InfoChannel
pub fn win_check_system(
    dt: Res<DeltaTime>,
    mut clocks: ResMut<LifecycleClocks>,
    mut outcome: ResMut<Outcome>,
    mut channel: ResMut<InfoChannel>,
    soldiers: Query<&Side, (With<Soldier>, Without<Dead>, Without<Dictator>)>,
) {
    if !clocks.win.tick(dt.0) || outcome.is_decided() {
        return;
    }
    let mut living = [0usize; 2];
    for side in soldiers.iter() {
        living[side.index()] += 1;
    }
    for side in Side::BOTH {
        if outcome.fielded[side.index()] > 0 && living[side.index()] == 0 {
            let winner = side.opponent();
            let reason = format!("{} annihilated", side.label());
            if outcome.declare(winner, reason.clone()) {
                info!(winner = winner.label(), %reason, "match decided");
                channel.post(format!("{} wins: {reason}", winner.label()));
            }
            return;
        }
    }
}

/// Highest-ranked living root of `side`'s command tree.
fn side_root(world: &mut World, side: Side) -> Option<Entity> {
    world
        .query_filtered::<(Entity, &Side, &Rank, &SoldierId, &CommandNode), (With<Soldier>, Without<Dead>, Without<Dictator>)>()
        .iter(world)
        .filter(|(_, s, _, _, node)| **s == side && node.leader.is_none())
        .max_by(|a, b| a.2.cmp(b.2).then(b.3.cmp(a.3)))
        .map(|(entity, ..)| entity)
}

/// Exclusive system that periodically lands a fresh squad in each side's deployment
/// strip and puts it under the side's senior leader.
pub fn reinforcement_system(world: &mut World) {
    let dt = world.resource::<DeltaTime>().0;
    if world.resource::<Outcome>().is_decided() {
        return;
    }
    let due: Vec<Side> = {
        let mut clocks = world.resource_mut::<LifecycleClocks>();
        Side::BOTH
            .into_iter()
            .filter(|side| clocks.reinforce[side.index()].as_mut().map_or(false, |c| c.tick(dt)))
            .collect()
    };

    for side in due {
        let zone = deployment_zone(side, world.resource::<SimConfig>());
        let center = world.resource_scope(|_, mut rng: Mut<SimRng>| {
            let margin = (zone.size() * 0.25).min(Vec2::splat(20.0));
            Vec2::new(
                rng.0.gen_range(zone.min.x + margin.x..=zone.max.x - margin.x),
                rng.0.gen_range(zone.min.y + margin.y..=zone.max.y - margin.y),
            )
        });
        let root = side_root(world, side);
        let squad = match spawn_unit(world, side, UnitSize::Squad, center, side_heading(side)) {
            Ok(squad) => squad,
            Err(err) => {
                warn!(side = side.label(), %err, "reinforcement failed");
                continue;
            }
        };
        if let Some(root) = root {
            if let Err(err) = attach(world, root, squad) {
                warn!(side = side.label(), %err, "reinforcements left unattached");
            }
        }
        info!(side = side.label(), x = center.x, y = center.y, "reinforcements arrived");
        world
            .resource_mut::<InfoChannel>()
            .post(format!("{} reinforcements arrived", side.label()));
    }
}

/// Exclusive system that removes bodies nobody refers to any more.
///
/// A dead soldier stays while any AI commandee lives, since that commandee still needs
/// its node to take over. Player-controlled commandees never take over; they are cut
/// loose as roots when the body goes. Destroyed vehicles go once empty.
pub fn reap_system(world: &mut World) {
    let dt = world.resource::<DeltaTime>().0;
    if !world.resource_mut::<LifecycleClocks>().reap.tick(dt) {
        return;
    }

    let bodies: Vec<(Entity, Vec<Entity>)> = world
        .query_filtered::<(Entity, &CommandNode), (With<Soldier>, With<Dead>)>()
        .iter(world)
        .map(|(entity, node)| (entity, node.commandees.clone()))
        .collect();
    let mut reaped = Vec::new();
    let mut orphans = Vec::new();
    for (entity, commandees) in bodies {
        let survivors: Vec<Entity> = commandees.into_iter().filter(|&c| is_alive(world, c)).collect();
        if survivors.iter().any(|&c| world.get::<AiControlled>(c).is_some()) {
            continue;
        }
        orphans.extend(survivors);
        reaped.push(entity);
    }
    for orphan in orphans {
        if let Some(mut node) = world.get_mut::<CommandNode>(orphan) {
            node.leader = None;
        }
    }
    reaped.extend(
        world
            .query_filtered::<(Entity, &Armor), With<Dead>>()
            .iter(world)
            .filter(|(_, armor)| armor.is_empty())
            .map(|(entity, _)| entity),
    );

    for entity in &reaped {
        world.resource_mut::<SpatialGrid>().remove(*entity);
        world.despawn(*entity);
    }
    if !reaped.is_empty() {
        debug!(count = reaped.len(), "reaped bodies");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armory::Armory;
    use crate::spawn::{spawn_dictator, spawn_soldier, SoldierRoster};
    use crate::systems::bullets::kill;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lifecycle_world(config: SimConfig) -> World {
        let mut world = World::new();
        world.insert_resource(DeltaTime(1.0));
        world.insert_resource(SpatialGrid::new(config.cell_size));
        world.insert_resource(Armory::standard());
        world.insert_resource(SimRng(StdRng::seed_from_u64(3)));
        world.insert_resource(Outcome::default());
        world.insert_resource(SoldierRoster::default());
        world.insert_resource(InfoChannel::default());
        world.insert_resource(LifecycleClocks::from_config(&config));
        world.insert_resource(config);
        world
    }

    fn run_win_check(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(win_check_system);
        schedule.run(world);
    }

    #[test]
    fn test_first_declaration_sticks() {
        let mut outcome = Outcome::default();
        assert!(outcome.declare(Side::Red, "first".into()));
        assert!(!outcome.declare(Side::Blue, "second".into()));
        assert!(outcome.team_won(Side::Red));
        assert_eq!(outcome.reason(), Some("first"));
    }

    #[test]
    fn test_annihilation_decides_match() {
        let mut world = lifecycle_world(SimConfig::empty());
        let blue = spawn_soldier(&mut world, Side::Blue, Rank::Private, Vec2::new(10.0, 10.0), 0.0, &[], false).unwrap();
        spawn_soldier(&mut world, Side::Red, Rank::Private, Vec2::new(90.0, 10.0), 0.0, &[], false).unwrap();
        run_win_check(&mut world);
        assert!(!world.resource::<Outcome>().is_decided());

        kill(&mut world, blue).unwrap();
        run_win_check(&mut world);
        assert!(world.resource::<Outcome>().team_won(Side::Red));
    }

    #[test]
    fn test_side_with_only_a_dictator_has_not_lost() {
        let mut world = lifecycle_world(SimConfig::empty());
        spawn_dictator(&mut world, Side::Red).unwrap();
        spawn_soldier(&mut world, Side::Blue, Rank::Private, Vec2::new(10.0, 10.0), 0.0, &[], false).unwrap();
        run_win_check(&mut world);
        assert!(!world.resource::<Outcome>().is_decided());
    }

    #[test]
    fn test_reinforcements_join_the_root() {
        let config = SimConfig {
            reinforcement_interval: Some(1.0),
            ..SimConfig::empty()
        };
        let mut world = lifecycle_world(config);
        let captain = spawn_soldier(&mut world, Side::Blue, Rank::Captain, Vec2::new(50.0, 400.0), 0.0, &[], true).unwrap();
        reinforcement_system(&mut world);

        let squads = world.get::<CommandNode>(captain).unwrap().commandees.clone();
        assert_eq!(squads.len(), 1);
        assert_eq!(*world.get::<Rank>(squads[0]).unwrap(), Rank::Sergeant);
        let zone = deployment_zone(Side::Blue, world.resource::<SimConfig>());
        assert!(zone.contains_point(world.get::<Position>(squads[0]).unwrap().0));
        // Red had no root; its squad stands on its own.
        let red_roots = world
            .query::<(&Side, &CommandNode)>()
            .iter(&world)
            .filter(|(side, node)| **side == Side::Red && node.leader.is_none())
            .count();
        assert_eq!(red_roots, 1);
    }

    #[test]
    fn test_reap_waits_for_commandees() {
        let config = SimConfig {
            reap_period: 1.0,
            ..SimConfig::empty()
        };
        let mut world = lifecycle_world(config);
        let sgt = spawn_soldier(&mut world, Side::Blue, Rank::Sergeant, Vec2::new(10.0, 10.0), 0.0, &[], true).unwrap();
        let private = spawn_soldier(&mut world, Side::Blue, Rank::Private, Vec2::new(12.0, 10.0), 0.0, &[], true).unwrap();
        attach(&mut world, sgt, private).unwrap();
        kill(&mut world, sgt).unwrap();

        reap_system(&mut world);
        assert!(world.entities().contains(sgt));

        kill(&mut world, private).unwrap();
        reap_system(&mut world);
        assert!(!world.entities().contains(sgt));
        assert!(!world.entities().contains(private));
        assert_eq!(world.resource::<SpatialGrid>().total_count(), 0);
    }

    #[test]
    fn test_player_commandees_do_not_keep_a_body() {
        let config = SimConfig {
            reap_period: 1.0,
            ..SimConfig::empty()
        };
        let mut world = lifecycle_world(config);
        let sgt = spawn_soldier(&mut world, Side::Blue, Rank::Sergeant, Vec2::new(10.0, 10.0), 0.0, &[], true).unwrap();
        let player = spawn_soldier(&mut world, Side::Blue, Rank::Private, Vec2::new(12.0, 10.0), 0.0, &[], false).unwrap();
        world.entity_mut(player).insert(PlayerControlled);
        attach(&mut world, sgt, player).unwrap();
        kill(&mut world, sgt).unwrap();

        reap_system(&mut world);
        assert!(!world.entities().contains(sgt));
        assert_eq!(world.get::<CommandNode>(player).unwrap().leader, None);
    }
}
