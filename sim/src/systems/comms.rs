//! Intra-unit communication.
//!
//! Messages go into the receiver's `Inbox` and are read one tick later. Whether two
//! soldiers can talk depends only on distance and whether both carry a radio.

use crate::components::*;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use bevy_ecs::prelude::*;
use glam::Vec2;

/// Range at which two soldiers of the given ranks can talk.
pub fn comm_range(a: Rank, b: Rank, config: &SimConfig) -> f32 {
    if a.has_radio() && b.has_radio() {
        config.radio_range
    } else {
        config.voice_range
    }
}

/// Endpoint of a possible conversation.
#[derive(Debug, Clone, Copy)]
pub struct CommEndpoint {
    pub pos: Vec2,
    pub rank: Rank,
    pub alive: bool,
}

impl CommEndpoint {
    pub fn fetch(world: &World, entity: Entity) -> SimResult<Self> {
        if !world.entities().contains(entity) {
            return Err(SimError::InvalidReference(entity));
        }
        let (Some(pos), Some(rank)) = (world.get::<Position>(entity), world.get::<Rank>(entity)) else {
            return Err(SimError::NotASoldier(entity));
        };
        let alive = world.get::<Dead>(entity).is_none()
            && world.get::<Health>(entity).map_or(false, |h| h.is_alive());
        Ok(Self {
            pos: pos.0,
            rank: *rank,
            alive,
        })
    }
}

/// Dead soldiers never communicate.
pub fn can_communicate(a: &CommEndpoint, b: &CommEndpoint, config: &SimConfig) -> bool {
    a.alive && b.alive && a.pos.distance(b.pos) <= comm_range(a.rank, b.rank, config)
}

/// Whether `a` can currently reach `b`.
pub fn reachable(world: &World, a: Entity, b: Entity) -> SimResult<bool> {
    let from = CommEndpoint::fetch(world, a)?;
    let to = CommEndpoint::fetch(world, b)?;
    let config = world.resource::<SimConfig>();
    Ok(can_communicate(&from, &to, config))
}

/// Queue a message for `receiver`. Range is the caller's concern.
pub fn post(world: &mut World, receiver: Entity, message: Message) -> SimResult<()> {
    if !world.entities().contains(receiver) {
        return Err(SimError::InvalidReference(receiver));
    }
    let mut inbox = world.get_mut::<Inbox>(receiver).ok_or(SimError::NotASoldier(receiver))?;
    inbox.arriving.push(message);
    Ok(())
}

/// System that makes last tick's messages readable.
pub fn inbox_flip_system(mut query: Query<&mut Inbox>) {
    for mut inbox in query.iter_mut() {
        inbox.flip();
    }
}
