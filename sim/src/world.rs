//! Serializable per-tick view of the simulation.
//!
//! The `Snapshot` is what a renderer or recorder pulls each frame; static terrain
//! goes separately through `TerrainSnapshot` since it only changes when foxholes are dug.

use crate::armory::Armory;
use crate::components::*;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// One soldier's state for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldierSnapshot {
    pub id: u32,
    pub name: String,
    pub side: String,
    pub rank: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub heading: f32,
    pub health: f32,
    pub health_max: f32,
    pub alive: bool,
    pub weapon: Option<String>,
    pub mounted: bool,
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub side: String,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub health: f32,
    pub health_max: f32,
    pub alive: bool,
    pub occupants: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoxholeSnapshot {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub depth: f32,
}

/// Complete dynamic state at one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub soldiers: Vec<SoldierSnapshot>,
    pub vehicles: Vec<VehicleSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
    pub foxholes: Vec<FoxholeSnapshot>,
    pub winner: Option<String>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world. Soldiers come out in id order.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut soldiers: Vec<SoldierSnapshot> = {
            let armory = world.resource::<Armory>().clone();
            let mut query = world.query_filtered::<(
                &SoldierId,
                &SoldierName,
                &Side,
                &Rank,
                &Position,
                &Velocity,
                &Heading,
                &Health,
                &Loadout,
                Has<Dead>,
                Has<Mounted>,
                Option<&Brain>,
            ), With<Soldier>>();
            query
                .iter(world)
                .map(|(id, name, side, rank, pos, vel, heading, health, loadout, dead, mounted, brain)| SoldierSnapshot {
                    id: id.0,
                    name: name.0.clone(),
                    side: side.label().to_string(),
                    rank: rank.abbreviation().to_string(),
                    x: pos.0.x,
                    y: pos.0.y,
                    vx: vel.0.x,
                    vy: vel.0.y,
                    heading: heading.0,
                    health: health.current,
                    health_max: health.max,
                    alive: !dead && health.is_alive(),
                    weapon: loadout.current().map(|w| armory.get(w.kind).name.clone()),
                    mounted,
                    goal: brain.map(|b| b.goal.label().to_string()),
                })
                .collect()
        };
        soldiers.sort_by_key(|s| s.id);

        let vehicles = world
            .query::<(&Armor, &Side, &Position, &Heading, &Health, Has<Dead>)>()
            .iter(world)
            .map(|(armor, side, pos, heading, health, dead)| VehicleSnapshot {
                side: side.label().to_string(),
                x: pos.0.x,
                y: pos.0.y,
                heading: heading.0,
                health: health.current,
                health_max: health.max,
                alive: !dead && health.is_alive(),
                occupants: armor.occupants().count(),
            })
            .collect();

        let bullets = world
            .query_filtered::<(&Position, &Velocity), With<Bullet>>()
            .iter(world)
            .map(|(pos, vel)| BulletSnapshot {
                x: pos.0.x,
                y: pos.0.y,
                vx: vel.0.x,
                vy: vel.0.y,
            })
            .collect();

        let foxholes = world
            .query::<(&Foxhole, &Position)>()
            .iter(world)
            .map(|(hole, pos)| FoxholeSnapshot {
                x: pos.0.x,
                y: pos.0.y,
                radius: hole.radius,
                depth: hole.depth,
            })
            .collect();

        let winner = world
            .get_resource::<crate::systems::lifecycle::Outcome>()
            .and_then(|o| o.winner())
            .map(|side| side.label().to_string());

        Self {
            tick,
            time,
            soldiers,
            vehicles,
            bullets,
            foxholes,
            winner,
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
