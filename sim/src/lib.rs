//! Skirmish - Simulation Core
//!
//! A deterministic, fixed-timestep two-sided tactical simulation: soldiers perceive,
//! steer, take orders through a rank hierarchy and fight with simulated ballistics on
//! a procedurally generated battlefield. Uses `bevy_ecs` for the
//! entity-component-system architecture.

pub mod api;
pub mod armory;
pub mod components;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod quadtree;
pub mod query;
pub mod roads;
pub mod spatial;
pub mod spawn;
pub mod systems;
pub mod terrain;
pub mod timer;
pub mod world;

pub use api::SimWorld;
pub use armory::{Armory, WeaponType, WeaponTypeId};
pub use components::*;
pub use config::{SimConfig, UnitSize};
pub use error::{SimError, SimResult};
pub use logging::init_logging;
pub use query::{ArmorQuery, SoldierQuery};
pub use spatial::{SpatialEntry, SpatialGrid};
pub use systems::actions::{ActionOutcome, Refusal, SoldierAction};
pub use terrain::TerrainSnapshot;
pub use world::Snapshot;
