//! Firing and weapon upkeep.
//!
//! A discharge spawns one `Bullet` entity and one sound trigger. Flight and hit
//! resolution live in [`crate::systems::bullets`].

use crate::armory::Armory;
use crate::components::*;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::geometry::vec_angle;
use crate::quadtree::{ObstacleIndex, Shape, StaticKind};
use crate::systems::actions::{ActionOutcome, Refusal};
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;

/// Gap between the shooter's hull and a fresh bullet.
const MUZZLE_CLEARANCE: f32 = 0.1;

/// Aim spread for a shooter moving at `speed`: doubles once per threshold crossed,
/// never beyond the configured cap.
pub fn aim_variation(base: f32, speed: f32, config: &SimConfig) -> f32 {
    let crossed = config
        .variation_speed_thresholds
        .iter()
        .filter(|&&threshold| speed > threshold)
        .count();
    (base * 2f32.powi(crossed as i32)).min(config.max_variation)
}

/// Fire `shooter`'s current weapon along `dir`. Liveness and rest checks are the
/// caller's; see [`crate::systems::actions::perform`].
pub fn fire(world: &mut World, shooter: Entity, dir: Vec2, rng: &mut impl Rng) -> SimResult<ActionOutcome> {
    let Some(weapon) = world.get::<Loadout>(shooter).and_then(|l| l.current().copied()) else {
        return Ok(ActionOutcome::Refused(Refusal::NoWeapon));
    };
    if !weapon.is_loaded() {
        return Ok(ActionOutcome::Refused(Refusal::Reloading));
    }
    let Some(side) = world.get::<Side>(shooter).copied() else {
        return Err(SimError::NotASoldier(shooter));
    };

    // Mounted shooters fire from the vehicle body.
    let body = world.get::<Mounted>(shooter).map_or(shooter, |m| m.vehicle);
    let (origin, body_vel, body_radius) = match (
        world.get::<Position>(body),
        world.get::<Velocity>(body),
        world.get::<Physique>(body),
    ) {
        (Some(pos), Some(vel), Some(physique)) => (pos.0, vel.0, physique.radius),
        _ => return Err(SimError::InvalidReference(body)),
    };

    let config = world.resource::<SimConfig>();
    let kind = world.resource::<Armory>().get(weapon.kind);
    let variation = aim_variation(kind.variation, body_vel.length(), config);
    let (muzzle_speed, time_to_live, sound_radius) = (kind.velocity, kind.flight_time(), kind.sound_radius);

    let spread = if variation > 0.0 {
        rng.gen_range(-variation..=variation)
    } else {
        0.0
    };
    let aim = Vec2::from_angle(spread).rotate(dir.normalize());
    let velocity = aim * muzzle_speed + body_vel;
    let start = origin + aim * (body_radius + MUZZLE_CLEARANCE);

    // Trees along the whole flight, looked up once.
    let trees = world
        .get_resource::<ObstacleIndex>()
        .map(|index| {
            index
                .0
                .along_segment(start, start + velocity * time_to_live, 0.0, Some(StaticKind::Tree))
                .into_iter()
                .filter_map(|entry| match entry.shape {
                    Shape::Circle { center, radius } => Some((center, radius)),
                    Shape::Segment { .. } => None,
                })
                .collect()
        })
        .unwrap_or_default();

    world.spawn((
        Bullet {
            shooter,
            side,
            weapon: weapon.kind,
            muzzle_speed,
            age: 0.0,
            time_to_live,
            trees,
        },
        Position(start),
        Velocity(velocity),
    ));
    world.spawn((
        TriggerZone {
            kind: TriggerKind::Sound { source: shooter, side },
            radius: sound_radius,
        },
        Position(origin),
    ));

    if let Some(mut loadout) = world.get_mut::<Loadout>(shooter) {
        if let Some(current) = loadout.current_mut() {
            current.start_reload();
        }
    }
    if let Some(mut heading) = world.get_mut::<Heading>(shooter) {
        heading.0 = vec_angle(aim, heading.0);
    }
    Ok(ActionOutcome::Done)
}

/// System that runs reload countdowns on every carried weapon.
pub fn weapon_reload_system(dt: Res<DeltaTime>, mut query: Query<&mut Loadout, Without<Dead>>) {
    for mut loadout in query.iter_mut() {
        loadout.tick(dt.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimRng;
    use crate::spatial::SpatialGrid;
    use crate::systems::actions::{perform, PendingActions, SoldierAction};
    use crate::systems::lifecycle::Outcome;
    use crate::spawn::{self, SoldierRoster};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_world() -> World {
        let config = SimConfig::empty();
        let mut world = World::new();
        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SpatialGrid::new(config.cell_size));
        world.insert_resource(Armory::standard());
        world.insert_resource(SimRng(StdRng::seed_from_u64(1)));
        world.insert_resource(PendingActions::default());
        world.insert_resource(Outcome::default());
        world.insert_resource(SoldierRoster::default());
        world.insert_resource(config);
        world
    }

    #[test]
    fn test_variation_doubles_per_threshold_and_caps() {
        let config = SimConfig::default();
        let base = 2f32.to_radians();
        assert_eq!(aim_variation(base, 0.0, &config), base);
        assert_eq!(aim_variation(base, 2.0, &config), base * 2.0);
        assert_eq!(aim_variation(base, 10.0, &config), base * 4.0);
        assert_eq!(aim_variation(30f32.to_radians(), 10.0, &config), config.max_variation);
    }

    #[test]
    fn test_fire_spawns_bullet_and_sound_then_reloads() {
        let mut world = test_world();
        let me = spawn::spawn_soldier(&mut world, Side::Blue, Rank::Private, Vec2::new(100.0, 100.0), 0.0, &["Rifle"], false)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        assert!(perform(&mut world, me, SoldierAction::Shoot(Vec2::X), &mut rng).unwrap().succeeded());
        let (bullet, pos, vel) = world.query::<(&Bullet, &Position, &Velocity)>().single(&world);
        let rifle = world.resource::<Armory>().get(bullet.weapon).clone();
        assert!((bullet.time_to_live - rifle.range / rifle.velocity).abs() < 1e-6);
        assert!(pos.0.x > 100.5);
        assert!((vel.0.length() - rifle.velocity).abs() < 1.0);
        assert_eq!(world.query::<&TriggerZone>().iter(&world).count(), 1);

        assert_eq!(
            perform(&mut world, me, SoldierAction::Shoot(Vec2::X), &mut rng).unwrap(),
            ActionOutcome::Refused(Refusal::Reloading)
        );
    }

    #[test]
    fn test_unarmed_cannot_fire() {
        let mut world = test_world();
        let me = spawn::spawn_soldier(&mut world, Side::Red, Rank::Private, Vec2::new(50.0, 50.0), 0.0, &[], false).unwrap();
        assert_eq!(
            perform(&mut world, me, SoldierAction::Shoot(Vec2::Y), &mut StdRng::seed_from_u64(0)).unwrap(),
            ActionOutcome::Refused(Refusal::NoWeapon)
        );
    }
}
