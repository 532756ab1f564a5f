//! Spawning soldiers, units, dictators and vehicles.
//!
//! Units are built from fixed templates: a squad is a sergeant and seven privates, a
//! platoon is a lieutenant and three squads, a company is a captain and three
//! platoons. Every new body is indexed in the `SpatialGrid` straight away so it is
//! visible on the very next sensing pass.

use crate::armory::Armory;
use crate::components::*;
use crate::config::{SimConfig, UnitSize, SQUAD_SIZE};
use crate::error::{SimError, SimResult};
use crate::geometry::local_to_world;
use crate::spatial::{BodyKind, SpatialEntry, SpatialGrid};
use crate::systems::command::formation_offset;
use crate::systems::lifecycle::Outcome;
use crate::terrain::deployment_zone;
use bevy_ecs::prelude::*;
use glam::Vec2;

const SURNAMES: [&str; 24] = [
    "Baker", "Carter", "Dawson", "Ellis", "Fisher", "Graves", "Hale", "Irving", "Jensen", "Keller", "Lowe", "Mercer",
    "Nolan", "Oakes", "Parker", "Quinn", "Rhodes", "Sawyer", "Tanner", "Usher", "Vance", "Walsh", "Yates", "Zeller",
];

/// World-scoped sequence of soldier ids and names.
#[derive(Resource, Debug, Default)]
pub struct SoldierRoster {
    next: u32,
}

impl SoldierRoster {
    pub fn next(&mut self) -> (SoldierId, SoldierName) {
        let id = self.next;
        self.next += 1;
        let surname = SURNAMES[id as usize % SURNAMES.len()];
        (SoldierId(id), SoldierName(format!("{surname} {id}")))
    }

    pub fn issued(&self) -> u32 {
        self.next
    }
}

/// Spread duty cycles so agents spawned together do not all think on the same tick.
fn phase_for(id: SoldierId) -> f32 {
    (id.0 as f32 * 0.618_034).fract()
}

/// Standard kit for a rank; every fourth private carries something heavier.
pub fn standard_kit(rank: Rank, index: usize) -> &'static [&'static str] {
    match rank {
        Rank::Private => match index % 8 {
            3 => &["Machine Gun"],
            6 => &["Bazooka", "Pistol"],
            _ => &["Rifle"],
        },
        Rank::Sergeant => &["Assault Rifle", "Pistol"],
        Rank::Lieutenant | Rank::Captain => &["Pistol"],
    }
}

/// Spawn one soldier. `ai` attaches the command AI.
pub fn spawn_soldier(
    world: &mut World,
    side: Side,
    rank: Rank,
    pos: Vec2,
    heading: f32,
    weapons: &[&str],
    ai: bool,
) -> SimResult<Entity> {
    let config = world.resource::<SimConfig>().clone();
    let loadout = {
        let armory = world.resource::<Armory>();
        let issued = weapons.iter().map(|name| armory.issue(name)).collect::<SimResult<Vec<_>>>()?;
        Loadout::new(issued)
    };
    let (id, name) = world.resource_mut::<SoldierRoster>().next();
    let phase = phase_for(id);

    let entity = world
        .spawn(SoldierBundle {
            marker: Soldier,
            id,
            name,
            side,
            rank,
            position: Position(pos),
            velocity: Velocity::default(),
            thrust: Thrust::default(),
            heading: Heading(heading),
            physique: Physique {
                radius: config.soldier_radius,
                max_speed: config.soldier_max_speed,
                max_acceleration: config.soldier_max_acceleration,
                fov: config.soldier_fov,
            },
            health: Health::new(config.soldier_health),
            vitals: Vitals::default(),
            loadout,
            node: CommandNode::default(),
            orders: Orders::default(),
            perception: Perception::new(config.sensing_period, phase),
            obstacles: ObstacleCache::new(config.obstacle_cache_period),
            inbox: Inbox::default(),
        })
        .id();
    if ai {
        world.entity_mut(entity).insert(AiBundle {
            marker: AiControlled,
            brain: Brain::new(rank, config.leader_check_period, config.order_period, phase),
        });
    }

    world.resource_mut::<SpatialGrid>().insert(SpatialEntry {
        entity,
        pos,
        side,
        radius: config.soldier_radius,
        kind: BodyKind::Soldier,
        alive: true,
    })?;
    world.resource_mut::<Outcome>().fielded[side.index()] += 1;
    Ok(entity)
}

/// Put `commandee` under `leader`, detaching it from any previous leader.
///
/// Panics if the link would close a loop in the command tree.
pub fn attach(world: &mut World, leader: Entity, commandee: Entity) -> SimResult<()> {
    for entity in [leader, commandee] {
        if !world.entities().contains(entity) {
            return Err(SimError::InvalidReference(entity));
        }
        if world.get::<CommandNode>(entity).is_none() {
            return Err(SimError::NotASoldier(entity));
        }
    }
    assert_ne!(leader, commandee, "a soldier cannot lead itself");
    assert!(
        !leads_transitively(world, commandee, leader),
        "attaching {commandee:?} under {leader:?} would create a command cycle"
    );

    if let Some(old) = world.get::<CommandNode>(commandee).and_then(|n| n.leader) {
        if let Some(mut node) = world.get_mut::<CommandNode>(old) {
            node.commandees.retain(|&c| c != commandee);
        }
    }
    if let Some(mut node) = world.get_mut::<CommandNode>(commandee) {
        node.leader = Some(leader);
    }
    if let Some(mut node) = world.get_mut::<CommandNode>(leader) {
        if !node.commandees.contains(&commandee) {
            node.commandees.push(commandee);
        }
    }
    Ok(())
}

/// Whether `ancestor` appears on the leader chain above `entity` (or is `entity`).
pub fn leads_transitively(world: &World, ancestor: Entity, entity: Entity) -> bool {
    let mut current = Some(entity);
    let mut steps = 0usize;
    while let Some(e) = current {
        if e == ancestor {
            return true;
        }
        steps += 1;
        assert!(steps <= 10_000, "command chain above {entity:?} does not terminate");
        current = world.get::<CommandNode>(e).and_then(|n| n.leader);
    }
    false
}

/// Spawn a complete unit around `center` facing `heading`. Returns its leader.
pub fn spawn_unit(world: &mut World, side: Side, size: UnitSize, center: Vec2, heading: f32) -> SimResult<Entity> {
    match size {
        UnitSize::Squad => {
            let sergeant = spawn_soldier(
                world,
                side,
                Rank::Sergeant,
                center,
                heading,
                standard_kit(Rank::Sergeant, 0),
                true,
            )?;
            for index in 0..SQUAD_SIZE - 1 {
                let offset = formation_offset(Rank::Private, index);
                let pos = center + local_to_world(offset, heading);
                let private = spawn_soldier(
                    world,
                    side,
                    Rank::Private,
                    pos,
                    heading,
                    standard_kit(Rank::Private, index),
                    true,
                )?;
                attach(world, sergeant, private)?;
                if let Some(mut orders) = world.get_mut::<Orders>(private) {
                    orders.station = Station::Offset(offset);
                }
            }
            Ok(sergeant)
        }
        UnitSize::Platoon | UnitSize::Company => {
            let (rank, part) = match size {
                UnitSize::Platoon => (Rank::Lieutenant, UnitSize::Squad),
                _ => (Rank::Captain, UnitSize::Platoon),
            };
            let leader = spawn_soldier(world, side, rank, center, heading, standard_kit(rank, 0), true)?;
            for index in 0..3 {
                let sub_rank = rank_of(part);
                let offset = formation_offset(sub_rank, index);
                let sub = spawn_unit(world, side, part, center + local_to_world(offset, heading), heading)?;
                attach(world, leader, sub)?;
                if let Some(mut orders) = world.get_mut::<Orders>(sub) {
                    orders.station = Station::Offset(offset);
                }
            }
            Ok(leader)
        }
    }
}

fn rank_of(size: UnitSize) -> Rank {
    match size {
        UnitSize::Squad => Rank::Sergeant,
        UnitSize::Platoon => Rank::Lieutenant,
        UnitSize::Company => Rank::Captain,
    }
}

/// Facing from `side`'s deployment strip toward the enemy.
pub fn side_heading(side: Side) -> f32 {
    match side {
        Side::Blue => 0.0,
        Side::Red => std::f32::consts::PI,
    }
}

/// Spawn `side`'s dictator at the rear of its deployment strip. Dictators carry no
/// weapon and have no AI.
pub fn spawn_dictator(world: &mut World, side: Side) -> SimResult<Entity> {
    let (zone, depth) = {
        let config = world.resource::<SimConfig>();
        (deployment_zone(side, config), config.world_width * config.deployment_depth)
    };
    let rear = depth * 0.25;
    let pos = match side {
        Side::Blue => Vec2::new(zone.min.x + rear, zone.center().y),
        Side::Red => Vec2::new(zone.max.x - rear, zone.center().y),
    };
    let entity = spawn_soldier(world, side, Rank::Private, pos, side_heading(side), &[], false)?;
    world.entity_mut(entity).insert(Dictator);
    // Dictators do not count toward the fielded force.
    world.resource_mut::<Outcome>().fielded[side.index()] -= 1;
    Ok(entity)
}

/// Spawn an empty vehicle carrying the armory's vehicle-mounted weapons.
pub fn spawn_vehicle(world: &mut World, side: Side, pos: Vec2, heading: f32) -> SimResult<Entity> {
    let config = world.resource::<SimConfig>().clone();
    let weapons = {
        let armory = world.resource::<Armory>();
        (0..armory.len())
            .map(crate::armory::WeaponTypeId)
            .filter(|&id| armory.get(id).vehicle_mounted)
            .collect()
    };
    let entity = world
        .spawn(ArmorBundle {
            armor: Armor {
                driver: None,
                passengers: Vec::new(),
                capacity: config.vehicle_passengers,
                weapons,
                fov: config.vehicle_fov,
            },
            side,
            position: Position(pos),
            velocity: Velocity::default(),
            thrust: Thrust::default(),
            heading: Heading(heading),
            physique: Physique {
                radius: config.vehicle_radius,
                max_speed: config.vehicle_max_speed,
                max_acceleration: config.vehicle_max_speed,
                fov: config.vehicle_fov,
            },
            health: Health::new(config.vehicle_health),
        })
        .id();
    world.resource_mut::<SpatialGrid>().insert(SpatialEntry {
        entity,
        pos,
        side,
        radius: config.vehicle_radius,
        kind: BodyKind::Vehicle,
        alive: true,
    })?;
    Ok(entity)
}
