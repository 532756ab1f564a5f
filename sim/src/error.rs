//! Error types.
//!
//! Ordinary gameplay outcomes (missed shots, refused actions, unreachable radios) are
//! never errors; see [`crate::systems::actions::ActionOutcome`]. Errors are reserved for
//! stale handles and for failures that leave the world unusable.

use bevy_ecs::entity::Entity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// The handle refers to an entity that has been despawned.
    #[error("entity {0:?} no longer exists")]
    InvalidReference(Entity),

    #[error("entity {0:?} is not a soldier")]
    NotASoldier(Entity),

    #[error("entity {0:?} is not a vehicle")]
    NotAVehicle(Entity),

    #[error("unknown weapon type `{0}`")]
    UnknownWeapon(String),

    #[error("spatial index: {0}")]
    Spatial(#[from] SpatialError),

    #[error("road generation: {0}")]
    Road(#[from] RoadError),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Insertion failures of the static quad-tree and the soldier cell space.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpatialError {
    #[error("bounds are not finite or inverted")]
    Degenerate,

    #[error("item at ({x:.1}, {y:.1}) lies outside the indexed area")]
    OutOfBounds { x: f32, y: f32 },

    #[error("leaf at depth {depth} already holds {items} items")]
    CellFull { depth: usize, items: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoadError {
    #[error("need at least two significant nodes, got {0}")]
    TooFewSignificantNodes(usize),

    #[error("road area {width}x{height} is smaller than one node cell")]
    AreaTooSmall { width: f32, height: f32 },
}

pub type SimResult<T> = Result<T, SimError>;
