//! Perception - what each soldier sees.
//!
//! Every soldier refreshes its `Perception` on its own duty cycle rather than every
//! tick. The refresh reads the spatial grid and positions as left by the previous
//! tick, so visibility never depends on the order soldiers are processed in.
//!
//! ## Parallel Feature
//!
//! With `--features parallel` the gather phase (the visibility tests) runs on rayon;
//! results are written back sequentially.

use crate::components::*;
use crate::config::SimConfig;
use crate::geometry::{angle_between, heading_vec};
use crate::quadtree::{ObstacleIndex, QuadTree, StaticKind};
use crate::spatial::{BodyKind, SpatialEntry, SpatialGrid};
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use glam::Vec2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Who is looking, and how.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub entity: Entity,
    pub pos: Vec2,
    pub heading: f32,
    pub fov: f32,
    pub side: Side,
}

/// Visibility test, in order:
/// 1. self, and anyone within the behind-the-back radius,
/// 2. same-side soldiers within the near radius,
/// 3. otherwise within `visibility * factor * target radius`, inside half the field of
///    view, with no tree or wall across the line of sight.
pub fn can_see(viewer: &Viewer, target: &SpatialEntry, config: &SimConfig, index: Option<&QuadTree>) -> bool {
    if target.entity == viewer.entity {
        return true;
    }
    let distance = viewer.pos.distance(target.pos);
    if distance <= config.behind_back_radius {
        return true;
    }
    if target.side == viewer.side && distance <= config.same_side_radius {
        return true;
    }
    if distance > config.visibility * config.visibility_radius_factor * target.radius {
        return false;
    }
    if angle_between(heading_vec(viewer.heading), target.pos - viewer.pos) > viewer.fov * 0.5 {
        return false;
    }
    !index.map_or(false, |i| i.blocks_sight(viewer.pos, target.pos))
}

/// Longest distance any body can be seen from.
pub fn max_sight_range(config: &SimConfig) -> f32 {
    let largest = config.vehicle_radius.max(config.soldier_radius);
    (config.visibility * config.visibility_radius_factor * largest)
        .max(config.same_side_radius)
        .max(config.behind_back_radius)
}

/// Result of one perception refresh.
#[derive(Debug, Default, Clone)]
pub struct Sighting {
    pub soldiers: Vec<Entity>,
    pub vehicles: Vec<Entity>,
    pub foxholes: Vec<Entity>,
}

/// Everything `viewer` can currently see.
pub fn look(viewer: &Viewer, grid: &SpatialGrid, index: Option<&QuadTree>, config: &SimConfig) -> Sighting {
    let mut sighting = Sighting::default();
    for body in grid.query_living(viewer.pos, max_sight_range(config)) {
        if body.entity == viewer.entity || !can_see(viewer, &body, config, index) {
            continue;
        }
        match body.kind {
            BodyKind::Soldier => sighting.soldiers.push(body.entity),
            BodyKind::Vehicle => sighting.vehicles.push(body.entity),
        }
    }

    // Foxholes only need distance and a clear line.
    if let Some(index) = index {
        for hole in index.query_at(viewer.pos, config.visibility, Some(StaticKind::Foxhole)) {
            let center = hole.shape.bounds().center();
            if viewer.pos.distance(center) <= config.visibility && !index.blocks_sight(viewer.pos, center) {
                sighting.foxholes.push(hole.entity);
            }
        }
    }
    sighting
}

/// System that refreshes due perceptions.
///
/// Viewers and targets are both read from the spatial grid, which only moves in
/// `spatial_grid_update_system` at the end of a tick.
///
/// ## Data Access
/// - Reads: DeltaTime, SimConfig, SpatialGrid, ObstacleIndex, Position, Heading, Physique, Side
/// - Writes: Perception
pub fn sensing_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    grid: Res<SpatialGrid>,
    index: Option<Res<ObstacleIndex>>,
    mut query: Query<(Entity, &Position, &Heading, &Physique, &Side, &mut Perception, Has<Dead>)>,
) {
    let delta = dt.0;
    let mut due = Vec::new();

    for (entity, pos, heading, physique, side, mut perception, dead) in query.iter_mut() {
        if dead {
            perception.clear();
            continue;
        }
        if perception.timer.tick(delta) {
            // Look from where the grid last saw us, like everyone else does.
            let seen_at = grid.get(entity).map_or(pos.0, |entry| entry.pos);
            due.push(Viewer {
                entity,
                pos: seen_at,
                heading: heading.0,
                fov: physique.fov,
                side: *side,
            });
        }
    }
    if due.is_empty() {
        return;
    }

    let tree = index.as_ref().map(|i| &i.0);
    let grid: &SpatialGrid = &grid;
    let config: &SimConfig = &config;

    // Gather
    #[cfg(feature = "parallel")]
    let results: Vec<(Entity, Sighting)> = due
        .par_iter()
        .map(|viewer| (viewer.entity, look(viewer, grid, tree, config)))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Entity, Sighting)> = due
        .iter()
        .map(|viewer| (viewer.entity, look(viewer, grid, tree, config)))
        .collect();

    // Apply
    for (entity, sighting) in results {
        if let Ok((_, _, _, _, _, mut perception, _)) = query.get_mut(entity) {
            perception.soldiers = sighting.soldiers;
            perception.vehicles = sighting.vehicles;
            perception.foxholes = sighting.foxholes;
        }
    }
}

/// System that refreshes the steering obstacle cache on its own duty cycle.
pub fn obstacle_cache_system(
    dt: Res<DeltaTime>,
    index: Option<Res<ObstacleIndex>>,
    mut query: Query<(&Position, &Physique, &mut ObstacleCache), Without<Dead>>,
) {
    let Some(index) = index else {
        return;
    };
    for (pos, physique, mut cache) in query.iter_mut() {
        if !cache.timer.tick(dt.0) {
            continue;
        }
        let reach = physique.max_speed * 2.0 + physique.radius + 5.0;
        cache.entries = index
            .0
            .query_at(pos.0, reach, None)
            .into_iter()
            .filter(|e| matches!(e.kind, StaticKind::Tree | StaticKind::Wall))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::quadtree::{Shape, StaticEntry};

    fn viewer_at_origin(heading: f32) -> Viewer {
        Viewer {
            entity: Entity::from_raw(1),
            pos: Vec2::new(100.0, 100.0),
            heading,
            fov: 120f32.to_radians(),
            side: Side::Blue,
        }
    }

    fn target(id: u32, x: f32, y: f32, side: Side) -> SpatialEntry {
        SpatialEntry {
            entity: Entity::from_raw(id),
            pos: Vec2::new(x, y),
            side,
            radius: 0.5,
            kind: BodyKind::Soldier,
            alive: true,
        }
    }

    #[test]
    fn test_field_of_view() {
        let config = SimConfig::default();
        let viewer = viewer_at_origin(0.0);
        // Ahead, within 150 * 2 * 0.5 = 150
        assert!(can_see(&viewer, &target(2, 200.0, 100.0, Side::Red), &config, None));
        // Too far
        assert!(!can_see(&viewer, &target(3, 260.0, 100.0, Side::Red), &config, None));
        // Behind
        assert!(!can_see(&viewer, &target(4, 50.0, 100.0, Side::Red), &config, None));
        // Behind but very close
        assert!(can_see(&viewer, &target(5, 97.0, 100.0, Side::Red), &config, None));
        // Behind, same side, near
        assert!(can_see(&viewer, &target(6, 70.0, 100.0, Side::Blue), &config, None));
    }

    #[test]
    fn test_trees_block_sight() {
        let config = SimConfig::default();
        let mut index = QuadTree::new(Rect::new(Vec2::ZERO, Vec2::splat(400.0)), 6, 4).unwrap();
        index
            .insert(StaticEntry {
                entity: Entity::from_raw(50),
                kind: StaticKind::Tree,
                shape: Shape::Circle {
                    center: Vec2::new(150.0, 100.0),
                    radius: 2.0,
                },
            })
            .unwrap();
        let viewer = viewer_at_origin(0.0);
        assert!(!can_see(&viewer, &target(2, 200.0, 100.0, Side::Red), &config, Some(&index)));
        assert!(can_see(&viewer, &target(3, 200.0, 130.0, Side::Red), &config, Some(&index)));
    }

    fn sensing_world() -> World {
        let mut world = World::new();
        let config = SimConfig::empty();
        world.insert_resource(DeltaTime(0.1));
        world.insert_resource(SpatialGrid::new(config.cell_size));
        world.insert_resource(config);
        world
    }

    /// A soldier with a due perception, registered in the grid.
    fn spawn_viewer(world: &mut World, x: f32, heading: f32, side: Side) -> Entity {
        let config = world.resource::<SimConfig>().clone();
        let physique = Physique {
            radius: 0.5,
            max_speed: 5.0,
            max_acceleration: 10.0,
            fov: config.soldier_fov,
        };
        let entity = world
            .spawn((
                Position::new(x, 100.0),
                Heading(heading),
                physique,
                side,
                Perception::new(config.sensing_period, 0.0),
            ))
            .id();
        world
            .resource_mut::<SpatialGrid>()
            .insert(SpatialEntry {
                entity,
                ..target(0, x, 100.0, side)
            })
            .unwrap();
        entity
    }

    #[test]
    fn test_same_tick_moves_are_invisible() {
        let mut world = sensing_world();
        let blue = spawn_viewer(&mut world, 100.0, 0.0, Side::Blue);
        let red = spawn_viewer(&mut world, 140.0, std::f32::consts::PI, Side::Red);

        // Red has already moved out of sight this tick; the grid still holds last tick.
        world.get_mut::<Position>(red).unwrap().0 = Vec2::new(390.0, 100.0);
        let mut schedule = Schedule::default();
        schedule.add_systems(sensing_system);
        schedule.run(&mut world);

        assert!(world.get::<Perception>(blue).unwrap().sees(red));
        assert!(world.get::<Perception>(red).unwrap().sees(blue));
    }

    #[test]
    fn test_dead_bodies_are_not_perceived() {
        let mut world = sensing_world();
        let blue = spawn_viewer(&mut world, 100.0, 0.0, Side::Blue);
        let body = world.spawn_empty().id();
        world
            .resource_mut::<SpatialGrid>()
            .insert(SpatialEntry {
                entity: body,
                ..target(0, 120.0, 100.0, Side::Red)
            })
            .unwrap();
        world.resource_mut::<SpatialGrid>().mark_dead(body);

        let mut schedule = Schedule::default();
        schedule.add_systems(sensing_system);
        schedule.run(&mut world);
        assert!(!world.get::<Perception>(blue).unwrap().sees(body));
    }

    #[test]
    fn test_sensing_uses_duty_cycle() {
        let mut world = sensing_world();
        let watcher = spawn_viewer(&mut world, 100.0, 0.0, Side::Blue);
        let enemy = world.spawn_empty().id();
        world
            .resource_mut::<SpatialGrid>()
            .insert(SpatialEntry {
                entity: enemy,
                ..target(0, 120.0, 100.0, Side::Red)
            })
            .unwrap();

        let mut schedule = Schedule::default();
        schedule.add_systems(sensing_system);
        schedule.run(&mut world);
        assert!(world.get::<Perception>(watcher).unwrap().sees(enemy));

        // The enemy walks away; the cached set lasts until the next refresh.
        world.resource_mut::<SpatialGrid>().update(enemy, Vec2::new(390.0, 100.0)).unwrap();
        schedule.run(&mut world);
        assert!(world.get::<Perception>(watcher).unwrap().sees(enemy));
        for _ in 0..5 {
            schedule.run(&mut world);
        }
        assert!(!world.get::<Perception>(watcher).unwrap().sees(enemy));
    }
}
