//! Simulation tuning.
//!
//! `SimConfig` is inserted as a resource at world construction. Every field has a
//! default, so a JSON file only needs the values it wants to change.

use crate::error::SimResult;
use bevy_ecs::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size of the starting unit fielded by each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSize {
    Squad,
    Platoon,
    Company,
}

impl UnitSize {
    /// Soldiers in one unit of this size, leaders included.
    pub fn headcount(&self) -> usize {
        match self {
            UnitSize::Squad => SQUAD_SIZE,
            UnitSize::Platoon => 3 * SQUAD_SIZE + 1,
            UnitSize::Company => 3 * (3 * SQUAD_SIZE + 1) + 1,
        }
    }
}

/// Soldiers per squad, the sergeant included.
pub const SQUAD_SIZE: usize = 8;

/// Parameters of the one-shot road network generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadConfig {
    pub enabled: bool,
    /// Side length of the square cells graph nodes are scattered in.
    pub node_cell_size: f32,
    pub nodes_per_cell: usize,
    /// Upper bound on the links a node makes to its geometrically nearest neighbours.
    pub node_degree: usize,
    /// Chance of a node being picked as a road endpoint.
    pub significant_fraction: f32,
    /// Each significant node is paired with this many nearest significant nodes.
    pub significant_degree: usize,
    /// Path cost of an edge that is already part of the road network.
    pub road_edge_cost: f32,
    /// Base cost of a raw edge; `sqrt(length)` is added on top.
    pub raw_edge_base_cost: f32,
    pub road_width: f32,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_cell_size: 120.0,
            nodes_per_cell: 2,
            node_degree: 4,
            significant_fraction: 0.15,
            significant_degree: 2,
            road_edge_cost: 1.0,
            raw_edge_base_cost: 10.0,
            road_width: 6.0,
        }
    }
}

/// Configuration for a simulation world.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // --- world ---
    pub world_width: f32,
    pub world_height: f32,
    /// Cell size of the soldier cell-space partition.
    pub cell_size: f32,
    /// Fixed timestep in game seconds.
    pub fixed_timestep: f32,
    /// Game seconds per real second.
    pub time_coefficient: f32,
    /// `None` seeds from entropy.
    pub seed: Option<u64>,

    // --- forces ---
    /// Unit fielded by each side at setup; `None` starts with an empty battlefield.
    pub starting_unit: Option<UnitSize>,
    pub spawn_dictators: bool,
    /// Seconds between reinforcement squads; `None` disables reinforcements.
    pub reinforcement_interval: Option<f32>,

    // --- duty cycles ---
    pub sensing_period: f32,
    pub obstacle_cache_period: f32,
    pub leader_check_period: f32,
    pub order_period: f32,
    pub reap_period: f32,
    pub win_check_period: f32,

    // --- perception ---
    /// Base visibility; the range to a target is `visibility * visibility_radius_factor * radius`.
    pub visibility: f32,
    pub visibility_radius_factor: f32,
    pub behind_back_radius: f32,
    pub same_side_radius: f32,
    pub soldier_fov: f32,
    pub vehicle_fov: f32,
    /// Radius of the sound trigger raised by a weapon discharge is the weapon's
    /// `sound_radius`; running soldiers raise this one.
    pub footstep_sound_radius: f32,

    // --- communication ---
    pub radio_range: f32,
    pub voice_range: f32,

    // --- ballistics ---
    pub bullet_pass_through_time: f32,
    pub tree_speed_loss: f32,
    pub min_bullet_speed_fraction: f32,
    /// Fraction of the hit radius a full-depth foxhole removes.
    pub foxhole_cover: f32,
    pub max_variation: f32,
    /// Shooter speeds above which aim variation doubles (each threshold doubles once).
    pub variation_speed_thresholds: [f32; 2],

    // --- soldiers ---
    pub soldier_radius: f32,
    pub soldier_health: f32,
    pub soldier_max_speed: f32,
    pub soldier_max_acceleration: f32,
    pub max_weapons: usize,
    /// Foxhole depth gained per second of digging.
    pub dig_rate: f32,
    pub foxhole_radius: f32,
    pub fatigue_rate: f32,
    pub hunger_rate: f32,

    // --- vehicles ---
    pub vehicle_radius: f32,
    pub vehicle_health: f32,
    pub vehicle_max_speed: f32,
    pub vehicle_passengers: usize,

    // --- terrain ---
    /// Trees per 10 000 square units.
    pub tree_density: f32,
    pub tree_radius_range: (f32, f32),
    /// Stone walls scattered over the map.
    pub wall_count: usize,
    /// Fraction of the map width kept clear at each side for deployment.
    pub deployment_depth: f32,
    pub roads: RoadConfig,
    /// Deepest level of the static quad-tree.
    pub quadtree_depth: usize,
    pub quadtree_leaf_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: 1200.0,
            world_height: 800.0,
            cell_size: 40.0,
            fixed_timestep: 1.0 / 30.0,
            time_coefficient: 1.0,
            seed: None,

            starting_unit: Some(UnitSize::Platoon),
            spawn_dictators: true,
            reinforcement_interval: Some(120.0),

            sensing_period: 0.5,
            obstacle_cache_period: 1.0,
            leader_check_period: 1.0,
            order_period: 3.0,
            reap_period: 10.0,
            win_check_period: 1.0,

            visibility: 150.0,
            visibility_radius_factor: 2.0,
            behind_back_radius: 4.0,
            same_side_radius: 40.0,
            soldier_fov: 120f32.to_radians(),
            vehicle_fov: 75f32.to_radians(),
            footstep_sound_radius: 12.0,

            radio_range: 1000.0,
            voice_range: 100.0,

            bullet_pass_through_time: 0.1,
            tree_speed_loss: 0.2,
            min_bullet_speed_fraction: 0.5,
            foxhole_cover: 0.8,
            max_variation: 45f32.to_radians(),
            variation_speed_thresholds: [1.0, 3.5],

            soldier_radius: 0.5,
            soldier_health: 100.0,
            soldier_max_speed: 5.0,
            soldier_max_acceleration: 10.0,
            max_weapons: 3,
            dig_rate: 0.05,
            foxhole_radius: 1.0,
            fatigue_rate: 1.0 / 600.0,
            hunger_rate: 1.0 / 900.0,

            vehicle_radius: 2.5,
            vehicle_health: 400.0,
            vehicle_max_speed: 12.0,
            vehicle_passengers: 4,

            tree_density: 2.0,
            tree_radius_range: (1.0, 2.5),
            wall_count: 6,
            deployment_depth: 0.1,
            roads: RoadConfig::default(),
            quadtree_depth: 8,
            quadtree_leaf_capacity: 16,
        }
    }
}

impl SimConfig {
    /// Parse a (possibly partial) JSON config over the defaults.
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// A bare battlefield: no trees, no roads, no starting units, no reinforcements.
    /// Handy for scripted scenarios.
    pub fn empty() -> Self {
        Self {
            starting_unit: None,
            spawn_dictators: false,
            reinforcement_interval: None,
            tree_density: 0.0,
            wall_count: 0,
            roads: RoadConfig {
                enabled: false,
                ..RoadConfig::default()
            },
            ..Self::default()
        }
    }
}

/// World-owned random source for generation, aim variation and AI choices.
#[derive(Resource, Debug, Clone)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn from_config(config: &SimConfig) -> Self {
        match config.seed {
            Some(seed) => Self(StdRng::seed_from_u64(seed)),
            None => Self(StdRng::from_entropy()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json_str(
            r#"{ "world_width": 500.0, "seed": 7, "roads": { "road_width": 9.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.world_width, 500.0);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.roads.road_width, 9.0);
        assert_eq!(config.roads.node_degree, RoadConfig::default().node_degree);
        assert_eq!(config.radio_range, 1000.0);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = SimConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::SimError::Config(_)));
    }

    #[test]
    fn test_unit_headcount() {
        assert_eq!(UnitSize::Squad.headcount(), 8);
        assert_eq!(UnitSize::Platoon.headcount(), 25);
        assert_eq!(UnitSize::Company.headcount(), 76);
    }
}
