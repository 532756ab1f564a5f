//! Area triggers: sounds and weapon pickups.
//!
//! Triggers fire against the refreshed soldier index at the end of the tick. Sounds are
//! one-shot and reach every living soldier in the radius regardless of line of sight.
//! A pickup persists until the first eligible soldier walks into it.

use crate::armory::Armory;
use crate::components::*;
use crate::config::SimConfig;
use crate::spatial::{BodyKind, SpatialGrid};
use crate::systems::movement::DeltaTime;
use crate::timer::Countdown;
use bevy_ecs::prelude::*;
use glam::Vec2;
use tracing::debug;

/// Most recent sounds a soldier remembers between AI drains.
pub const HEARING_MEMORY: usize = 16;

/// Clock for the footstep sweep.
#[derive(Resource, Debug, Clone)]
pub struct FootstepClock(pub Countdown);

impl Default for FootstepClock {
    fn default() -> Self {
        Self(Countdown::repeating(0.5))
    }
}

fn hear(perception: &mut Perception, source: Entity, at: Vec2) {
    if perception.heard.len() >= HEARING_MEMORY {
        perception.heard.remove(0);
    }
    perception.heard.push((source, at));
}

/// System that fires every trigger against the soldiers inside it.
///
/// ## Data Access
/// - Reads: SimConfig, Armory, SpatialGrid, TriggerZone, Position, Side, Mounted
/// - Writes: Perception, Vitals, Loadout; despawns spent triggers
pub fn trigger_system(
    mut commands: Commands,
    config: Res<SimConfig>,
    armory: Res<Armory>,
    grid: Res<SpatialGrid>,
    triggers: Query<(Entity, &TriggerZone, &Position)>,
    mut soldiers: Query<(&Side, &mut Perception, &mut Vitals, &mut Loadout, Has<Mounted>), (With<Soldier>, Without<Dead>)>,
) {
    for (trigger_entity, trigger, pos) in triggers.iter() {
        let inside = grid.query_living(pos.0, trigger.radius);
        match trigger.kind {
            TriggerKind::Sound { source, side } => {
                for body in inside.iter().filter(|b| b.kind == BodyKind::Soldier && b.entity != source) {
                    let Ok((listener_side, mut perception, mut vitals, _, _)) = soldiers.get_mut(body.entity) else {
                        continue;
                    };
                    hear(&mut perception, source, pos.0);
                    if *listener_side != side && vitals.activity == Activity::Sleeping {
                        vitals.wake();
                    }
                }
                commands.entity(trigger_entity).despawn();
            }
            TriggerKind::Pickup { weapon } => {
                // Closest eligible soldier takes it.
                let taker = inside.iter().filter(|b| b.kind == BodyKind::Soldier).find_map(|body| {
                    let (_, _, _, loadout, mounted) = soldiers.get(body.entity).ok()?;
                    (!mounted && loadout.weapons.len() < config.max_weapons && !loadout.has(weapon)).then_some(body.entity)
                });
                if let Some(taker) = taker {
                    if let Ok((_, _, _, mut loadout, _)) = soldiers.get_mut(taker) {
                        loadout.weapons.push(armory.issue_id(weapon));
                        debug!(?taker, weapon = %armory.get(weapon).name, "weapon picked up");
                    }
                    commands.entity(trigger_entity).despawn();
                }
            }
        }
    }
}

/// System that makes running soldiers audible.
pub fn footstep_system(
    mut commands: Commands,
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    mut clock: ResMut<FootstepClock>,
    query: Query<(Entity, &Position, &Velocity, &Physique, &Side), (With<Soldier>, Without<Dead>, Without<Mounted>)>,
) {
    if !clock.0.tick(dt.0) {
        return;
    }
    for (entity, pos, vel, physique, side) in query.iter() {
        if vel.speed() > physique.max_speed * 0.5 {
            commands.spawn((
                TriggerZone {
                    kind: TriggerKind::Sound {
                        source: entity,
                        side: *side,
                    },
                    radius: config.footstep_sound_radius,
                },
                *pos,
            ));
        }
    }
}
