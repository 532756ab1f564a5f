//! Terrain generation - trees, walls and roads.
//!
//! Everything here is static after construction except foxholes, which soldiers dig
//! during play. All static features are entities with a `Position` plus a terrain
//! component, and each one is mirrored in the `ObstacleIndex` quad-tree.
//!
//! Generation is fatal on failure: a feature the index refuses, or a road graph that
//! cannot be built, aborts world construction.

use crate::components::*;
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::geometry::Rect;
use crate::quadtree::{ObstacleIndex, QuadTree, Shape, StaticEntry, StaticKind};
use crate::roads;
use bevy_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Trees per forest patch, on average.
const TREES_PER_PATCH: usize = 12;
const PATCH_RADIUS: f32 = 45.0;

/// Whole battlefield as a rectangle anchored at the origin.
pub fn world_bounds(config: &SimConfig) -> Rect {
    Rect::new(Vec2::ZERO, Vec2::new(config.world_width, config.world_height))
}

/// Strip along the map edge where `side` deploys and reinforces.
pub fn deployment_zone(side: Side, config: &SimConfig) -> Rect {
    let depth = config.world_width * config.deployment_depth.clamp(0.0, 0.5);
    match side {
        Side::Blue => Rect::new(Vec2::ZERO, Vec2::new(depth, config.world_height)),
        Side::Red => Rect::new(
            Vec2::new(config.world_width - depth, 0.0),
            Vec2::new(config.world_width, config.world_height),
        ),
    }
}

/// Counts from one generation run, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerrainStats {
    pub trees: usize,
    pub walls: usize,
    pub road_segments: usize,
    pub trees_cleared: usize,
}

/// Build the static obstacle field and insert the `ObstacleIndex` resource.
pub fn generate_terrain(world: &mut World, config: &SimConfig, rng: &mut impl Rng) -> SimResult<TerrainStats> {
    let bounds = world_bounds(config);
    // Road shoulders may overhang the map edge.
    let margin = Vec2::splat(config.roads.road_width.max(0.0));
    let index_bounds = Rect::new(bounds.min - margin, bounds.max + margin);
    let mut index = QuadTree::new(index_bounds, config.quadtree_depth, config.quadtree_leaf_capacity)?;
    let mut stats = TerrainStats::default();

    let keep_clear = [deployment_zone(Side::Blue, config), deployment_zone(Side::Red, config)];
    let usable = |p: Vec2, r: f32| {
        bounds.contains_rect(&Rect::from_center(p, r)) && !keep_clear.iter().any(|z| z.contains_point(p))
    };

    // Forest patches
    let area = config.world_width * config.world_height;
    let tree_total = (config.tree_density * area / 10_000.0).round() as usize;
    let patches = tree_total.div_ceil(TREES_PER_PATCH);
    let (r_min, r_max) = config.tree_radius_range;
    for _ in 0..patches {
        let center = Vec2::new(
            rng.gen_range(0.0..config.world_width),
            rng.gen_range(0.0..config.world_height),
        );
        for _ in 0..TREES_PER_PATCH {
            if stats.trees >= tree_total {
                break;
            }
            let offset = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU))
                * rng.gen_range(0.0..PATCH_RADIUS);
            let pos = center + offset;
            let radius = if r_max > r_min { rng.gen_range(r_min..r_max) } else { r_min };
            if !usable(pos, radius) {
                continue;
            }
            let entity = world.spawn((Tree { radius }, Position(pos))).id();
            index.insert(StaticEntry {
                entity,
                kind: StaticKind::Tree,
                shape: Shape::Circle { center: pos, radius },
            })?;
            stats.trees += 1;
        }
    }

    // Walls
    for _ in 0..config.wall_count {
        let a = Vec2::new(
            rng.gen_range(0.0..config.world_width),
            rng.gen_range(0.0..config.world_height),
        );
        let b = a + Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU)) * rng.gen_range(20.0..60.0);
        if !usable(a, 0.0) || !usable(b, 0.0) {
            continue;
        }
        let entity = world.spawn((Wall { a, b }, Position((a + b) * 0.5))).id();
        index.insert(StaticEntry {
            entity,
            kind: StaticKind::Wall,
            shape: Shape::Segment { a, b, half_width: 0.0 },
        })?;
        stats.walls += 1;
    }

    // Roads, clearing the trees they run through
    if config.roads.enabled {
        let network = roads::generate(bounds, &config.roads, rng)?;
        let half_width = config.roads.road_width * 0.5;
        for (a, b) in network.segments() {
            for tree in index.along_segment(a, b, half_width, Some(StaticKind::Tree)) {
                index.remove(tree.entity, &tree.shape);
                world.despawn(tree.entity);
                stats.trees_cleared += 1;
            }
            let entity = world
                .spawn((
                    RoadSegment {
                        a,
                        b,
                        width: config.roads.road_width,
                    },
                    Position((a + b) * 0.5),
                ))
                .id();
            index.insert(StaticEntry {
                entity,
                kind: StaticKind::Road,
                shape: Shape::Segment { a, b, half_width },
            })?;
            stats.road_segments += 1;
        }
        if network.unreachable_pairs > 0 {
            debug!(pairs = network.unreachable_pairs, "some significant nodes left unconnected");
        }
    }

    info!(
        trees = stats.trees - stats.trees_cleared,
        walls = stats.walls,
        roads = stats.road_segments,
        "terrain generated"
    );
    world.insert_resource(ObstacleIndex(index));
    Ok(stats)
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSnapshot {
    pub ax: f32,
    pub ay: f32,
    pub bx: f32,
    pub by: f32,
    pub width: f32,
}

/// Static terrain for a renderer's initial load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerrainSnapshot {
    pub width: f32,
    pub height: f32,
    pub trees: Vec<TreeSnapshot>,
    pub walls: Vec<SegmentSnapshot>,
    pub roads: Vec<SegmentSnapshot>,
}

impl TerrainSnapshot {
    pub fn from_world(world: &mut World) -> Self {
        let (width, height) = world
            .get_resource::<SimConfig>()
            .map(|c| (c.world_width, c.world_height))
            .unwrap_or_default();

        let trees = world
            .query::<(&Tree, &Position)>()
            .iter(world)
            .map(|(tree, pos)| TreeSnapshot {
                x: pos.0.x,
                y: pos.0.y,
                radius: tree.radius,
            })
            .collect();
        let walls = world
            .query::<&Wall>()
            .iter(world)
            .map(|w| SegmentSnapshot {
                ax: w.a.x,
                ay: w.a.y,
                bx: w.b.x,
                by: w.b.y,
                width: 0.0,
            })
            .collect();
        let roads = world
            .query::<&RoadSegment>()
            .iter(world)
            .map(|r| SegmentSnapshot {
                ax: r.a.x,
                ay: r.a.y,
                bx: r.b.x,
                by: r.b.y,
                width: r.width,
            })
            .collect();

        Self {
            width,
            height,
            trees,
            walls,
            roads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generation_indexes_every_feature() {
        let config = SimConfig::default();
        let mut world = World::new();
        let mut rng = StdRng::seed_from_u64(3);
        let stats = generate_terrain(&mut world, &config, &mut rng).unwrap();

        assert!(stats.trees > 0);
        assert!(stats.road_segments > 0);

        let index = &world.resource::<ObstacleIndex>().0;
        assert_eq!(index.len(), stats.trees - stats.trees_cleared + stats.walls + stats.road_segments);
        let tree_entities = world.query::<&Tree>().iter(&world).count();
        assert_eq!(tree_entities, stats.trees - stats.trees_cleared);
    }

    #[test]
    fn test_roads_clear_trees_in_their_path() {
        let config = SimConfig::default();
        let mut world = World::new();
        let mut rng = StdRng::seed_from_u64(11);
        generate_terrain(&mut world, &config, &mut rng).unwrap();

        let index = world.resource::<ObstacleIndex>().0.clone();
        let half = config.roads.road_width * 0.5;
        for road in world.query::<&RoadSegment>().iter(&world) {
            assert!(index
                .along_segment(road.a, road.b, half, Some(StaticKind::Tree))
                .is_empty());
        }
    }

    #[test]
    fn test_deployment_zones_stay_clear() {
        let config = SimConfig {
            roads: crate::config::RoadConfig {
                enabled: false,
                ..Default::default()
            },
            tree_density: 20.0,
            ..SimConfig::default()
        };
        let mut world = World::new();
        generate_terrain(&mut world, &config, &mut StdRng::seed_from_u64(5)).unwrap();
        let zones = [deployment_zone(Side::Blue, &config), deployment_zone(Side::Red, &config)];
        for (_, pos) in world.query::<(&Tree, &Position)>().iter(&world) {
            assert!(!zones.iter().any(|z| z.contains_point(pos.0)));
        }
    }

    #[test]
    fn test_empty_config_has_no_features() {
        let mut world = World::new();
        let stats = generate_terrain(&mut world, &SimConfig::empty(), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(stats, TerrainStats::default());
        assert!(world.resource::<ObstacleIndex>().0.is_empty());
        let snapshot = TerrainSnapshot::from_world(&mut world);
        assert!(snapshot.trees.is_empty() && snapshot.roads.is_empty());
    }
}
