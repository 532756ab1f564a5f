//! Fatigue and hunger.

use crate::components::*;
use crate::config::SimConfig;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;

/// Seconds a nap lasts.
pub const SLEEP_DURATION: f32 = 60.0;
/// Seconds a meal lasts.
pub const MEAL_DURATION: f32 = 20.0;

/// System that grows fatigue and hunger and ends finished rests.
///
/// Fatigue grows faster the closer the soldier runs to top speed. A completed
/// nap clears fatigue; a completed meal clears hunger.
pub fn vitals_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    mut query: Query<(&mut Vitals, &Velocity, &Physique), (With<Soldier>, Without<Dead>)>,
) {
    let delta = dt.0;
    for (mut vitals, vel, physique) in query.iter_mut() {
        let exertion = if physique.max_speed > 0.0 {
            (vel.speed() / physique.max_speed).min(1.0)
        } else {
            0.0
        };
        vitals.fatigue = (vitals.fatigue + config.fatigue_rate * (1.0 + exertion) * delta).clamp(0.0, 1.0);
        vitals.hunger = (vitals.hunger + config.hunger_rate * delta).clamp(0.0, 1.0);

        if vitals.is_resting() && vitals.activity_timer.tick(delta) {
            match vitals.activity {
                Activity::Sleeping => vitals.fatigue = 0.0,
                Activity::Eating => vitals.hunger = 0.0,
                Activity::Awake => {}
            }
            vitals.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn spawn(world: &mut World, speed: f32) -> Entity {
        world
            .spawn((
                Soldier,
                Vitals::default(),
                Velocity(Vec2::new(speed, 0.0)),
                Physique {
                    radius: 0.5,
                    max_speed: 5.0,
                    max_acceleration: 10.0,
                    fov: 2.0,
                },
            ))
            .id()
    }

    #[test]
    fn test_running_tires_faster() {
        let mut world = World::new();
        world.insert_resource(DeltaTime(1.0));
        world.insert_resource(SimConfig::default());
        let idle = spawn(&mut world, 0.0);
        let runner = spawn(&mut world, 5.0);

        let mut schedule = Schedule::default();
        schedule.add_systems(vitals_system);
        schedule.run(&mut world);

        let idle_fatigue = world.get::<Vitals>(idle).unwrap().fatigue;
        let run_fatigue = world.get::<Vitals>(runner).unwrap().fatigue;
        assert!((run_fatigue - 2.0 * idle_fatigue).abs() < 1e-6);
        assert!(world.get::<Vitals>(idle).unwrap().hunger > 0.0);
    }

    #[test]
    fn test_sleep_resets_fatigue() {
        let mut world = World::new();
        world.insert_resource(DeltaTime(1.0));
        world.insert_resource(SimConfig::default());
        let sleeper = spawn(&mut world, 0.0);
        {
            let mut vitals = world.get_mut::<Vitals>(sleeper).unwrap();
            vitals.fatigue = 0.9;
            vitals.begin(Activity::Sleeping, 2.0);
        }

        let mut schedule = Schedule::default();
        schedule.add_systems(vitals_system);
        schedule.run(&mut world);
        assert!(world.get::<Vitals>(sleeper).unwrap().is_resting());
        schedule.run(&mut world);
        let vitals = world.get::<Vitals>(sleeper).unwrap();
        assert!(!vitals.is_resting());
        assert_eq!(vitals.fatigue, 0.0);
    }
}
