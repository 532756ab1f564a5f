//! Bullet flight, hit detection and damage.
//!
//! ## Gather / Apply
//!
//! `bullet_flight_system` advances every bullet and records what it hit in the
//! `PendingHits` resource without touching any target. `apply_hits_system` then applies
//! damage and handles deaths, so the outcome of one bullet never depends on the order
//! bullets were processed in.

use crate::armory::{Armory, TargetClass};
use crate::components::*;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::geometry::{segment_circle_entry, segment_circle_intersects};
use crate::logging::InfoChannel;
use crate::quadtree::{ObstacleIndex, Shape, StaticKind};
use crate::spatial::{BodyKind, SpatialGrid};
use crate::systems::actions::release_seat;
use crate::systems::lifecycle::Outcome;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use glam::Vec2;
use tracing::{info, warn};

/// Radius of the trigger left behind by each dropped weapon.
pub const PICKUP_RADIUS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub bullet: Entity,
    pub shooter: Entity,
    pub target: Entity,
    pub class: TargetClass,
    pub damage: f32,
}

/// Hits and spent bullets collected during flight.
#[derive(Resource, Debug, Default)]
pub struct PendingHits {
    pub hits: Vec<Hit>,
    pub spent: Vec<Entity>,
}

/// Apparent hit radius of a soldier standing in a foxhole of `depth`.
pub fn effective_radius(radius: f32, foxhole_depth: f32, cover: f32) -> f32 {
    radius * (1.0 - cover.clamp(0.0, 1.0) * foxhole_depth.clamp(0.0, 1.0))
}

/// Depth of the deepest foxhole covering `pos`.
fn cover_depth(index: Option<&ObstacleIndex>, foxholes: &Query<&Foxhole>, pos: Vec2) -> f32 {
    let Some(index) = index else {
        return 0.0;
    };
    index
        .0
        .query_at(pos, 0.5, Some(StaticKind::Foxhole))
        .into_iter()
        .filter(|entry| match entry.shape {
            Shape::Circle { center, radius } => center.distance(pos) <= radius,
            Shape::Segment { .. } => false,
        })
        .filter_map(|entry| foxholes.get(entry.entity).ok())
        .map(|hole| hole.depth)
        .fold(0.0, f32::max)
}

/// System that moves bullets and finds what they hit.
///
/// ## Data Access
/// - Reads: DeltaTime, SimConfig, Armory, SpatialGrid, ObstacleIndex, Mounted, Foxhole
/// - Writes: Bullet, Position, Velocity (bullets only), PendingHits
pub fn bullet_flight_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    armory: Res<Armory>,
    grid: Res<SpatialGrid>,
    index: Option<Res<ObstacleIndex>>,
    mut pending: ResMut<PendingHits>,
    mut bullets: Query<(Entity, &mut Bullet, &mut Position, &mut Velocity)>,
    mounted: Query<&Mounted>,
    foxholes: Query<&Foxhole>,
) {
    let delta = dt.0;
    let index = index.as_deref();

    for (entity, mut bullet, mut pos, mut vel) in bullets.iter_mut() {
        bullet.age += delta;
        let start = pos.0;

        // Trees are ignored right out of the muzzle; afterwards each one crossed this
        // tick bleeds speed.
        if bullet.age > config.bullet_pass_through_time {
            let end = start + vel.0 * delta;
            let crossed = bullet
                .trees
                .iter()
                .filter(|(center, radius)| segment_circle_intersects(start, end, *center, *radius))
                .count();
            if crossed > 0 {
                vel.0 *= (1.0 - config.tree_speed_loss).powi(crossed as i32);
                if vel.0.length() < config.min_bullet_speed_fraction * bullet.muzzle_speed {
                    pending.spent.push(entity);
                    continue;
                }
            }
        }

        let end = start + vel.0 * delta;
        let shooter_vehicle = mounted.get(bullet.shooter).ok().map(|m| m.vehicle);
        let reach = start.distance(end) * 0.5 + config.vehicle_radius.max(config.soldier_radius);

        let mut closest: Option<(f32, Entity, TargetClass)> = None;
        for body in grid.query_living((start + end) * 0.5, reach) {
            if body.entity == bullet.shooter || Some(body.entity) == shooter_vehicle {
                continue;
            }
            let (radius, class) = match body.kind {
                BodyKind::Soldier => (
                    effective_radius(body.radius, cover_depth(index, &foxholes, body.pos), config.foxhole_cover),
                    TargetClass::Soldier,
                ),
                BodyKind::Vehicle => (body.radius, TargetClass::Vehicle),
            };
            if let Some(t) = segment_circle_entry(start, end, body.pos, radius) {
                if closest.map_or(true, |(best, _, _)| t < best) {
                    closest = Some((t, body.entity, class));
                }
            }
        }

        if let Some((_, target, class)) = closest {
            pending.hits.push(Hit {
                bullet: entity,
                shooter: bullet.shooter,
                target,
                class,
                damage: armory.get(bullet.weapon).damage_against(class),
            });
            pending.spent.push(entity);
            continue;
        }

        pos.0 = end;
        if bullet.age >= bullet.time_to_live {
            pending.spent.push(entity);
        }
    }
}

/// Exclusive system that removes spent bullets and applies damage.
pub fn apply_hits_system(world: &mut World) {
    let PendingHits { hits, spent } = std::mem::take(&mut *world.resource_mut::<PendingHits>());
    for bullet in spent {
        if world.entities().contains(bullet) {
            world.despawn(bullet);
        }
    }
    for hit in hits {
        let killed = match world.get_mut::<Health>(hit.target) {
            Some(mut health) if health.is_alive() => {
                health.damage(hit.damage);
                !health.is_alive()
            }
            _ => false,
        };
        if killed {
            if let Err(err) = kill(world, hit.target) {
                warn!(victim = ?hit.target, %err, "failed to resolve death");
            }
        }
    }
}

/// Mark `entity` dead and resolve the consequences: dropped weapons, dictator defeat,
/// and the crew of a destroyed vehicle.
pub fn kill(world: &mut World, entity: Entity) -> SimResult<()> {
    if !world.entities().contains(entity) {
        return Err(SimError::InvalidReference(entity));
    }
    if world.get::<Dead>(entity).is_some() {
        return Ok(());
    }
    world.entity_mut(entity).insert(Dead);
    if let Some(mut health) = world.get_mut::<Health>(entity) {
        health.current = health.current.min(0.0);
    }
    if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
        vel.0 = Vec2::ZERO;
    }
    world.resource_mut::<SpatialGrid>().mark_dead(entity);

    let side = world.get::<Side>(entity).copied();
    let pos = world.get::<Position>(entity).map_or(Vec2::ZERO, |p| p.0);

    // A destroyed vehicle takes its crew with it.
    if let Some(armor) = world.get::<Armor>(entity) {
        let crew: Vec<Entity> = armor.occupants().collect();
        info!(?entity, crew = crew.len(), "vehicle destroyed");
        for occupant in crew {
            kill(world, occupant)?;
        }
        return Ok(());
    }

    drop_weapons(world, entity, pos);

    let label = describe(world, entity);
    info!(?entity, soldier = %label, "killed");
    if let Some(mut channel) = world.get_resource_mut::<InfoChannel>() {
        channel.post(format!("{label} was killed"));
    }

    if world.get::<Dictator>(entity).is_some() {
        if let Some(side) = side {
            let reason = format!("{} dictator killed", side.label());
            if world.resource_mut::<Outcome>().declare(side.opponent(), reason.clone()) {
                info!(winner = side.opponent().label(), %reason, "match decided");
                if let Some(mut channel) = world.get_resource_mut::<InfoChannel>() {
                    channel.post(format!("{} wins: {reason}", side.opponent().label()));
                }
            }
        }
    }
    Ok(())
}

/// Leave a pickup trigger for every hand-carried weapon and empty the loadout. A
/// mounted soldier drops what was stowed.
fn drop_weapons(world: &mut World, entity: Entity, pos: Vec2) {
    let carried = match world.entity_mut(entity).take::<Mounted>() {
        Some(mounted) => {
            release_seat(world, entity, mounted.vehicle);
            mounted.stowed.weapons
        }
        None => world
            .get_mut::<Loadout>(entity)
            .map(|mut l| std::mem::take(&mut l.weapons))
            .unwrap_or_default(),
    };
    if let Some(mut loadout) = world.get_mut::<Loadout>(entity) {
        loadout.weapons.clear();
        loadout.current = 0;
    }

    let droppable: Vec<_> = {
        let armory = world.resource::<Armory>();
        carried
            .into_iter()
            .filter(|w| !armory.get(w.kind).vehicle_mounted)
            .map(|w| w.kind)
            .collect()
    };
    for weapon in droppable {
        world.spawn((
            TriggerZone {
                kind: TriggerKind::Pickup { weapon },
                radius: PICKUP_RADIUS,
            },
            Position(pos),
        ));
    }
}

/// "Pvt. Baker (Blue)" style label for logs and the info feed.
pub fn describe(world: &World, entity: Entity) -> String {
    let rank = world.get::<Rank>(entity).map_or("", |r| r.abbreviation());
    let name = world.get::<SoldierName>(entity).map_or("unknown", |n| n.0.as_str());
    let side = world.get::<Side>(entity).map_or("?", |s| s.label());
    format!("{rank} {name} ({side})")
}
