//! Read-only views of soldiers and vehicles for clients and tests.

use crate::armory::Armory;
use crate::components::*;
use crate::error::{SimError, SimResult};
use crate::systems::comms;
use bevy_ecs::prelude::*;
use glam::Vec2;

/// Everything a client may ask about one soldier.
#[derive(Debug, Clone)]
pub struct SoldierQuery {
    pub entity: Entity,
    pub id: SoldierId,
    pub name: String,
    pub side: Side,
    pub rank: Rank,
    pub position: Vec2,
    pub heading: f32,
    pub velocity: Vec2,
    pub health: f32,
    pub alive: bool,
    pub weapons: Vec<String>,
    pub current_weapon: Option<String>,
    pub mounted: Option<(Entity, Seat)>,
    pub visible_soldiers: Vec<Entity>,
    pub visible_vehicles: Vec<Entity>,
    pub visible_foxholes: Vec<Entity>,
    pub leader: Option<Entity>,
    pub commandees: Vec<Entity>,
    pub orders: Orders,
    pub goal: Option<&'static str>,
    pub activity: Activity,
    pub dictator: bool,
}

impl SoldierQuery {
    pub fn fetch(world: &World, entity: Entity) -> SimResult<Self> {
        if !world.entities().contains(entity) {
            return Err(SimError::InvalidReference(entity));
        }
        let entity_ref = world.entity(entity);
        let (Some(id), Some(side), Some(rank), Some(pos), Some(health)) = (
            entity_ref.get::<SoldierId>(),
            entity_ref.get::<Side>(),
            entity_ref.get::<Rank>(),
            entity_ref.get::<Position>(),
            entity_ref.get::<Health>(),
        ) else {
            return Err(SimError::NotASoldier(entity));
        };

        let armory = world.resource::<Armory>();
        let loadout = entity_ref.get::<Loadout>();
        let weapons = loadout
            .map(|l| l.weapons.iter().map(|w| armory.get(w.kind).name.clone()).collect())
            .unwrap_or_default();
        let current_weapon = loadout.and_then(|l| l.current()).map(|w| armory.get(w.kind).name.clone());
        let perception = entity_ref.get::<Perception>();
        let node = entity_ref.get::<CommandNode>();

        Ok(Self {
            entity,
            id: *id,
            name: entity_ref.get::<SoldierName>().map(|n| n.0.clone()).unwrap_or_default(),
            side: *side,
            rank: *rank,
            position: pos.0,
            heading: entity_ref.get::<Heading>().map_or(0.0, |h| h.0),
            velocity: entity_ref.get::<Velocity>().map_or(Vec2::ZERO, |v| v.0),
            health: health.current,
            alive: entity_ref.get::<Dead>().is_none() && health.is_alive(),
            weapons,
            current_weapon,
            mounted: entity_ref.get::<Mounted>().map(|m| (m.vehicle, m.seat)),
            visible_soldiers: perception.map(|p| p.soldiers.clone()).unwrap_or_default(),
            visible_vehicles: perception.map(|p| p.vehicles.clone()).unwrap_or_default(),
            visible_foxholes: perception.map(|p| p.foxholes.clone()).unwrap_or_default(),
            leader: node.and_then(|n| n.leader),
            commandees: node.map(|n| n.commandees.clone()).unwrap_or_default(),
            orders: entity_ref.get::<Orders>().copied().unwrap_or_default(),
            goal: entity_ref.get::<Brain>().map(|b| b.goal.label()),
            activity: entity_ref.get::<Vitals>().map(|v| v.activity).unwrap_or_default(),
            dictator: entity_ref.contains::<Dictator>(),
        })
    }

    /// Whether this soldier can currently talk to `other`.
    pub fn can_communicate_with(&self, world: &World, other: Entity) -> SimResult<bool> {
        comms::reachable(world, self.entity, other)
    }

    pub fn attack_order(&self) -> Option<AttackOrder> {
        self.orders.attack
    }
}

/// Everything a client may ask about one vehicle.
#[derive(Debug, Clone)]
pub struct ArmorQuery {
    pub entity: Entity,
    pub side: Side,
    pub position: Vec2,
    pub heading: f32,
    pub velocity: Vec2,
    pub health: f32,
    pub alive: bool,
    pub driver: Option<Entity>,
    pub passengers: Vec<Entity>,
    pub free_seats: usize,
}

impl ArmorQuery {
    pub fn fetch(world: &World, entity: Entity) -> SimResult<Self> {
        if !world.entities().contains(entity) {
            return Err(SimError::InvalidReference(entity));
        }
        let entity_ref = world.entity(entity);
        let (Some(armor), Some(side), Some(pos), Some(health)) = (
            entity_ref.get::<Armor>(),
            entity_ref.get::<Side>(),
            entity_ref.get::<Position>(),
            entity_ref.get::<Health>(),
        ) else {
            return Err(SimError::NotAVehicle(entity));
        };
        Ok(Self {
            entity,
            side: *side,
            position: pos.0,
            heading: entity_ref.get::<Heading>().map_or(0.0, |h| h.0),
            velocity: entity_ref.get::<Velocity>().map_or(Vec2::ZERO, |v| v.0),
            health: health.current,
            alive: entity_ref.get::<Dead>().is_none() && health.is_alive(),
            driver: armor.driver,
            passengers: armor.passengers.clone(),
            free_seats: usize::from(armor.driver.is_none()) + armor.capacity.saturating_sub(armor.passengers.len()),
        })
    }
}
