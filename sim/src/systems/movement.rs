//! Movement system - integrates thrust into velocity and velocity into position.

use crate::components::*;
use crate::config::SimConfig;
use crate::geometry::truncate;
use bevy_ecs::prelude::*;
use glam::Vec2;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Resource counting fixed updates.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

/// System that applies thrust and velocity to free bodies (soldiers on foot and vehicles).
///
/// Bodies that received no thrust this tick brake at their maximum deceleration.
/// Positions are clamped to the battlefield.
pub fn movement_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    mut query: Query<(&mut Position, &mut Velocity, &mut Thrust, &Physique, Has<Dead>), Without<Mounted>>,
) {
    let delta = dt.0;
    let max = Vec2::new(config.world_width, config.world_height);

    for (mut pos, mut vel, mut thrust, physique, dead) in query.iter_mut() {
        if dead {
            vel.0 = Vec2::ZERO;
            thrust.0 = Vec2::ZERO;
            continue;
        }

        let accel = truncate(thrust.0, physique.max_acceleration);
        if accel == Vec2::ZERO {
            let speed = vel.0.length();
            let slowed = (speed - physique.max_acceleration * delta).max(0.0);
            vel.0 = vel.0.normalize_or_zero() * slowed;
        } else {
            vel.0 = truncate(vel.0 + accel * delta, physique.max_speed);
        }
        thrust.0 = Vec2::ZERO;

        let next = pos.0 + vel.0 * delta;
        let clamped = next.clamp(Vec2::ZERO, max);
        if clamped.x != next.x {
            vel.0.x = 0.0;
        }
        if clamped.y != next.y {
            vel.0.y = 0.0;
        }
        pos.0 = clamped;
    }
}

/// System that carries mounted soldiers along with their vehicle.
pub fn mounted_follow_system(
    mut riders: Query<(&Mounted, &mut Position, &mut Velocity), With<Soldier>>,
    vehicles: Query<(&Position, &Velocity), (With<Armor>, Without<Soldier>)>,
) {
    for (mounted, mut pos, mut vel) in riders.iter_mut() {
        if let Ok((vehicle_pos, vehicle_vel)) = vehicles.get(mounted.vehicle) {
            pos.0 = vehicle_pos.0;
            vel.0 = vehicle_vel.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physique() -> Physique {
        Physique {
            radius: 0.5,
            max_speed: 5.0,
            max_acceleration: 10.0,
            fov: 2.0,
        }
    }

    fn world_with(dt: f32) -> World {
        let mut world = World::new();
        world.insert_resource(DeltaTime(dt));
        world.insert_resource(SimConfig::empty());
        world
    }

    #[test]
    fn test_movement_applies_velocity() {
        let mut world = world_with(1.0);
        world.spawn((
            Position::new(10.0, 10.0),
            Velocity(Vec2::new(3.0, 4.0)),
            Thrust(Vec2::new(30.0, 40.0)),
            physique(),
        ));

        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        schedule.run(&mut world);

        let mut query = world.query::<(&Position, &Velocity, &Thrust)>();
        let (pos, vel, thrust) = query.single(&world);
        // Thrust is capped at max acceleration, speed at max speed.
        assert!((vel.speed() - 5.0).abs() < 1e-4);
        assert!((pos.0 - Vec2::new(13.0, 14.0)).length() < 1e-4);
        assert_eq!(thrust.0, Vec2::ZERO);
    }

    #[test]
    fn test_no_thrust_brakes() {
        let mut world = world_with(0.1);
        world.spawn((Position::new(10.0, 10.0), Velocity(Vec2::new(5.0, 0.0)), Thrust::default(), physique()));

        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        schedule.run(&mut world);

        let vel = world.query::<&Velocity>().single(&world).0;
        assert!((vel.x - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_clamped_to_battlefield() {
        let mut world = world_with(1.0);
        world.spawn((Position::new(1.0, 1.0), Velocity(Vec2::new(-5.0, 0.0)), Thrust(Vec2::new(-1.0, 0.0)), physique()));

        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        schedule.run(&mut world);

        let (pos, vel) = world.query::<(&Position, &Velocity)>().single(&world);
        assert_eq!(pos.0.x, 0.0);
        assert_eq!(vel.0.x, 0.0);
    }

    #[test]
    fn test_dead_bodies_stop() {
        let mut world = world_with(1.0);
        world.spawn((Position::new(10.0, 10.0), Velocity(Vec2::new(2.0, 0.0)), Thrust(Vec2::X), physique(), Dead));

        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        schedule.run(&mut world);

        let (pos, vel) = world.query::<(&Position, &Velocity)>().single(&world);
        assert_eq!(pos.0, Vec2::new(10.0, 10.0));
        assert_eq!(vel.0, Vec2::ZERO);
    }
}
