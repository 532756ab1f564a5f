//! The action vocabulary and its executor.
//!
//! Controllers (the command AI or an external player) express intent as
//! [`SoldierAction`]s. Each one either takes effect or is refused with a reason;
//! refusals are ordinary gameplay and never errors. Errors are kept for stale or
//! wrongly-typed handles.

use crate::armory::Armory;
use crate::components::*;
use crate::config::{SimConfig, SimRng};
use crate::error::{SimError, SimResult};
use crate::geometry::{vec_angle, wrap_angle};
use crate::quadtree::{ObstacleIndex, Shape, StaticEntry, StaticKind};
use crate::systems::movement::DeltaTime;
use crate::systems::{combat, comms};
use bevy_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;
use tracing::{debug, warn};

/// Extra slack beyond touching distance for climbing into a vehicle.
const MOUNT_REACH: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SoldierAction {
    /// Face along a direction.
    Turn(Vec2),
    /// Rotate by an angle in radians.
    TurnBy(f32),
    /// Request an acceleration for this tick.
    Move(Vec2),
    /// Fire the current weapon along a direction.
    Shoot(Vec2),
    SwitchWeapon(usize),
    Mount(Entity),
    Unmount,
    SetVelocityToHeading,
    SetVelocityToNegativeHeading,
    Communicate { target: Entity, kind: MessageKind },
    /// Deepen the foxhole underfoot, digging a new one if needed.
    Dig,
}

impl SoldierAction {
    fn moves_body(&self) -> bool {
        matches!(
            self,
            SoldierAction::Turn(_)
                | SoldierAction::TurnBy(_)
                | SoldierAction::Move(_)
                | SoldierAction::SetVelocityToHeading
                | SoldierAction::SetVelocityToNegativeHeading
        )
    }

    /// Malformed payloads are programming errors, not gameplay.
    fn assert_well_formed(&self) {
        match self {
            SoldierAction::Turn(v) | SoldierAction::Move(v) | SoldierAction::Shoot(v) => {
                assert!(v.is_finite(), "non-finite vector in {self:?}");
            }
            SoldierAction::TurnBy(angle) => assert!(angle.is_finite(), "non-finite angle in {self:?}"),
            SoldierAction::Communicate {
                kind: MessageKind::Order(directive),
                ..
            } => {
                let point = match directive {
                    Directive::Formation { offset } => *offset,
                    Directive::Defend { position } | Directive::Goto { position } => *position,
                    Directive::Attack(order) => order.center + order.line,
                };
                assert!(point.is_finite(), "non-finite position in {self:?}");
            }
            _ => {}
        }
    }
}

/// Why an action did not take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Dead,
    Resting,
    Passenger,
    NotMounted,
    AlreadyMounted,
    Reloading,
    NoWeapon,
    NoSuchWeapon,
    VehicleFull,
    VehicleDestroyed,
    OutOfReach,
    OutOfRange,
    WrongSide,
    ZeroDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    Refused(Refusal),
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ActionOutcome::Done)
    }
}

/// Actions queued by controllers, executed in submission order by [`action_system`].
#[derive(Resource, Debug, Default)]
pub struct PendingActions(pub Vec<(Entity, SoldierAction)>);

impl PendingActions {
    pub fn push(&mut self, actor: Entity, action: SoldierAction) {
        self.0.push((actor, action));
    }
}

pub(crate) fn is_alive(world: &World, entity: Entity) -> bool {
    world.get::<Dead>(entity).is_none() && world.get::<Health>(entity).map_or(false, |h| h.is_alive())
}

/// Execute one action for `actor` immediately.
pub fn perform(world: &mut World, actor: Entity, action: SoldierAction, rng: &mut impl Rng) -> SimResult<ActionOutcome> {
    if !world.entities().contains(actor) {
        return Err(SimError::InvalidReference(actor));
    }
    if world.get::<Soldier>(actor).is_none() {
        return Err(SimError::NotASoldier(actor));
    }
    action.assert_well_formed();

    if !is_alive(world, actor) {
        return Ok(ActionOutcome::Refused(Refusal::Dead));
    }
    let resting = world.get::<Vitals>(actor).map_or(false, |v| v.is_resting());
    if resting && !matches!(action, SoldierAction::Communicate { .. } | SoldierAction::SwitchWeapon(_)) {
        return Ok(ActionOutcome::Refused(Refusal::Resting));
    }

    // A driver's movement goes to the vehicle; passengers cannot steer.
    let mut body = actor;
    if action.moves_body() {
        if let Some(mounted) = world.get::<Mounted>(actor) {
            if mounted.seat == Seat::Passenger {
                return Ok(ActionOutcome::Refused(Refusal::Passenger));
            }
            body = mounted.vehicle;
        }
    }

    let outcome = match action {
        SoldierAction::Turn(dir) => {
            if dir == Vec2::ZERO {
                ActionOutcome::Refused(Refusal::ZeroDirection)
            } else {
                set_heading(world, body, |h| vec_angle(dir, h))
            }
        }
        SoldierAction::TurnBy(angle) => set_heading(world, body, |h| wrap_angle(h + angle)),
        SoldierAction::Move(accel) => {
            if let Some(mut thrust) = world.get_mut::<Thrust>(body) {
                thrust.0 += accel;
            }
            ActionOutcome::Done
        }
        SoldierAction::SetVelocityToHeading | SoldierAction::SetVelocityToNegativeHeading => {
            let sign = if action == SoldierAction::SetVelocityToHeading { 1.0 } else { -1.0 };
            let dir = world.get::<Heading>(body).map_or(Vec2::X, |h| h.dir());
            if let Some(mut vel) = world.get_mut::<Velocity>(body) {
                vel.0 = dir * vel.speed() * sign;
            }
            ActionOutcome::Done
        }
        SoldierAction::Shoot(dir) => {
            if dir == Vec2::ZERO {
                ActionOutcome::Refused(Refusal::ZeroDirection)
            } else {
                combat::fire(world, actor, dir, rng)?
            }
        }
        SoldierAction::SwitchWeapon(index) => match world.get_mut::<Loadout>(actor) {
            Some(mut loadout) if index < loadout.weapons.len() => {
                loadout.current = index;
                ActionOutcome::Done
            }
            _ => ActionOutcome::Refused(Refusal::NoSuchWeapon),
        },
        SoldierAction::Mount(vehicle) => mount(world, actor, vehicle)?,
        SoldierAction::Unmount => unmount(world, actor)?,
        SoldierAction::Communicate { target, kind } => {
            if comms::reachable(world, actor, target)? {
                comms::post(world, target, Message { sender: actor, kind })?;
                ActionOutcome::Done
            } else {
                ActionOutcome::Refused(Refusal::OutOfRange)
            }
        }
        SoldierAction::Dig => dig(world, actor)?,
    };
    Ok(outcome)
}

fn set_heading(world: &mut World, body: Entity, f: impl FnOnce(f32) -> f32) -> ActionOutcome {
    if let Some(mut heading) = world.get_mut::<Heading>(body) {
        heading.0 = f(heading.0);
    }
    ActionOutcome::Done
}

fn mount(world: &mut World, actor: Entity, vehicle: Entity) -> SimResult<ActionOutcome> {
    if !world.entities().contains(vehicle) {
        return Err(SimError::InvalidReference(vehicle));
    }
    let Some(armor) = world.get::<Armor>(vehicle) else {
        return Err(SimError::NotAVehicle(vehicle));
    };
    if world.get::<Mounted>(actor).is_some() {
        return Ok(ActionOutcome::Refused(Refusal::AlreadyMounted));
    }
    if !is_alive(world, vehicle) {
        return Ok(ActionOutcome::Refused(Refusal::VehicleDestroyed));
    }
    if world.get::<Side>(vehicle) != world.get::<Side>(actor) {
        return Ok(ActionOutcome::Refused(Refusal::WrongSide));
    }
    if !armor.has_free_seat() {
        return Ok(ActionOutcome::Refused(Refusal::VehicleFull));
    }

    let reach = |e: Entity| world.get::<Physique>(e).map_or(0.0, |p| p.radius);
    let gap = match (world.get::<Position>(actor), world.get::<Position>(vehicle)) {
        (Some(a), Some(b)) => a.distance_to(b),
        _ => f32::INFINITY,
    };
    if gap > reach(actor) + reach(vehicle) + MOUNT_REACH {
        return Ok(ActionOutcome::Refused(Refusal::OutOfReach));
    }

    let seat = if armor.driver.is_none() { Seat::Driver } else { Seat::Passenger };
    let vehicle_fov = armor.fov;
    let issued: Vec<_> = {
        let armory = world.resource::<Armory>();
        armor.weapons.iter().map(|&id| armory.issue_id(id)).collect()
    };

    let stowed = world
        .get_mut::<Loadout>(actor)
        .map(|mut l| std::mem::replace(&mut *l, Loadout::new(issued)))
        .unwrap_or_default();
    let stowed_fov = match world.get_mut::<Physique>(actor) {
        Some(mut physique) => std::mem::replace(&mut physique.fov, vehicle_fov),
        None => vehicle_fov,
    };
    if let Some(mut armor) = world.get_mut::<Armor>(vehicle) {
        match seat {
            Seat::Driver => armor.driver = Some(actor),
            Seat::Passenger => armor.passengers.push(actor),
        }
    }
    world.entity_mut(actor).insert(Mounted {
        vehicle,
        seat,
        stowed,
        stowed_fov,
    });
    Ok(ActionOutcome::Done)
}

fn unmount(world: &mut World, actor: Entity) -> SimResult<ActionOutcome> {
    let Some(mounted) = world.entity_mut(actor).take::<Mounted>() else {
        return Ok(ActionOutcome::Refused(Refusal::NotMounted));
    };
    release_seat(world, actor, mounted.vehicle);

    if let Some(mut loadout) = world.get_mut::<Loadout>(actor) {
        *loadout = mounted.stowed;
    }
    if let Some(mut physique) = world.get_mut::<Physique>(actor) {
        physique.fov = mounted.stowed_fov;
    }

    // Step out beside the hull.
    let exit = match (world.get::<Position>(mounted.vehicle), world.get::<Heading>(mounted.vehicle)) {
        (Some(pos), Some(heading)) => {
            let hull = world.get::<Physique>(mounted.vehicle).map_or(0.0, |p| p.radius);
            let own = world.get::<Physique>(actor).map_or(0.0, |p| p.radius);
            Some(pos.0 + heading.dir().perp() * (hull + own + 0.5))
        }
        _ => None,
    };
    if let Some(exit) = exit {
        if let Some(mut pos) = world.get_mut::<Position>(actor) {
            pos.0 = exit;
        }
    }
    if let Some(mut vel) = world.get_mut::<Velocity>(actor) {
        vel.0 = Vec2::ZERO;
    }
    Ok(ActionOutcome::Done)
}

/// Free `actor`'s seat in `vehicle`, if the vehicle still exists.
pub(crate) fn release_seat(world: &mut World, actor: Entity, vehicle: Entity) {
    if let Some(mut armor) = world.get_mut::<Armor>(vehicle) {
        if armor.driver == Some(actor) {
            armor.driver = None;
        }
        armor.passengers.retain(|&p| p != actor);
    }
}

/// Foxhole under `pos`, if any.
pub fn foxhole_at(world: &World, pos: Vec2) -> Option<Entity> {
    let index = world.get_resource::<ObstacleIndex>()?;
    index
        .0
        .query_at(pos, 0.5, Some(StaticKind::Foxhole))
        .into_iter()
        .find(|entry| match entry.shape {
            Shape::Circle { center, radius } => center.distance(pos) <= radius,
            Shape::Segment { .. } => false,
        })
        .map(|entry| entry.entity)
}

fn dig(world: &mut World, actor: Entity) -> SimResult<ActionOutcome> {
    if world.get::<Mounted>(actor).is_some() {
        return Ok(ActionOutcome::Refused(Refusal::AlreadyMounted));
    }
    let Some(pos) = world.get::<Position>(actor).map(|p| p.0) else {
        return Err(SimError::NotASoldier(actor));
    };
    let dt = world.get_resource::<DeltaTime>().map_or(0.0, |d| d.0);
    let (rate, radius) = {
        let config = world.resource::<SimConfig>();
        (config.dig_rate, config.foxhole_radius)
    };

    if let Some(hole) = foxhole_at(world, pos) {
        if let Some(mut foxhole) = world.get_mut::<Foxhole>(hole) {
            foxhole.deepen(rate * dt);
        }
        return Ok(ActionOutcome::Done);
    }

    let mut foxhole = Foxhole { depth: 0.0, radius };
    foxhole.deepen(rate * dt);
    let entity = world.spawn((foxhole, Position(pos))).id();
    if let Some(mut index) = world.get_resource_mut::<ObstacleIndex>() {
        index.0.insert(StaticEntry {
            entity,
            kind: StaticKind::Foxhole,
            shape: Shape::Circle { center: pos, radius },
        })?;
    }
    debug!(?actor, x = pos.x, y = pos.y, "foxhole started");
    Ok(ActionOutcome::Done)
}

/// Exclusive system that executes the queued actions.
///
/// ## Data Access
/// - Reads: PendingActions, SimConfig, Armory, ObstacleIndex
/// - Writes: SimRng, soldier and vehicle state, Inbox, bullets, triggers, foxholes
pub fn action_system(world: &mut World) {
    let pending = std::mem::take(&mut world.resource_mut::<PendingActions>().0);
    if pending.is_empty() {
        return;
    }
    world.resource_scope(|world, mut rng: Mut<SimRng>| {
        for (actor, action) in pending {
            match perform(world, actor, action, &mut rng.0) {
                Ok(ActionOutcome::Done) => {}
                Ok(ActionOutcome::Refused(reason)) => debug!(?actor, ?action, ?reason, "action refused"),
                Err(err) => warn!(?actor, ?action, %err, "dropping action"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::SpatialGrid;
    use crate::spawn;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_world() -> World {
        let config = SimConfig::empty();
        let mut world = World::new();
        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SpatialGrid::new(config.cell_size));
        world.insert_resource(Armory::standard());
        world.insert_resource(SimRng(StdRng::seed_from_u64(1)));
        world.insert_resource(PendingActions::default());
        world.insert_resource(crate::systems::lifecycle::Outcome::default());
        world.insert_resource(spawn::SoldierRoster::default());
        world.insert_resource(config);
        world
    }

    fn soldier(world: &mut World, side: Side, x: f32) -> Entity {
        spawn::spawn_soldier(world, side, Rank::Private, Vec2::new(x, 100.0), 0.0, &["Rifle"], false).unwrap()
    }

    #[test]
    fn test_dead_soldier_refuses_everything() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        world.entity_mut(me).insert(Dead);
        let before = *world.get::<Position>(me).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        for action in [
            SoldierAction::Turn(Vec2::Y),
            SoldierAction::Move(Vec2::X),
            SoldierAction::Shoot(Vec2::X),
            SoldierAction::SwitchWeapon(0),
            SoldierAction::Dig,
            SoldierAction::Unmount,
        ] {
            let outcome = perform(&mut world, me, action, &mut rng).unwrap();
            assert_eq!(outcome, ActionOutcome::Refused(Refusal::Dead));
        }
        assert_eq!(*world.get::<Position>(me).unwrap(), before);
        assert_eq!(world.get::<Thrust>(me).unwrap().0, Vec2::ZERO);
    }

    #[test]
    fn test_resting_refuses_movement_but_talks() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        let mate = soldier(&mut world, Side::Blue, 110.0);
        world.get_mut::<Vitals>(me).unwrap().begin(Activity::Sleeping, 30.0);
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(
            perform(&mut world, me, SoldierAction::Move(Vec2::X), &mut rng).unwrap(),
            ActionOutcome::Refused(Refusal::Resting)
        );
        let talk = SoldierAction::Communicate {
            target: mate,
            kind: MessageKind::Acknowledgement,
        };
        assert!(perform(&mut world, me, talk, &mut rng).unwrap().succeeded());
    }

    #[test]
    fn test_stale_actor_is_invalid_reference() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        world.despawn(me);
        let result = perform(&mut world, me, SoldierAction::TurnBy(0.5), &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(SimError::InvalidReference(_))));
    }

    #[test]
    #[should_panic]
    fn test_malformed_payload_asserts() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        let _ = perform(&mut world, me, SoldierAction::Move(Vec2::NAN), &mut StdRng::seed_from_u64(0));
    }

    #[test]
    fn test_mount_swaps_weapons_and_driver_steers() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        let tank = spawn::spawn_vehicle(&mut world, Side::Blue, Vec2::new(103.0, 100.0), 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(perform(&mut world, me, SoldierAction::Mount(tank), &mut rng).unwrap().succeeded());
        let autocannon = world.resource::<Armory>().find("Autocannon").unwrap();
        assert!(world.get::<Loadout>(me).unwrap().has(autocannon));
        assert_eq!(world.get::<Physique>(me).unwrap().fov, world.resource::<SimConfig>().vehicle_fov);
        assert_eq!(world.get::<Armor>(tank).unwrap().driver, Some(me));

        perform(&mut world, me, SoldierAction::Move(Vec2::X), &mut rng).unwrap();
        assert_eq!(world.get::<Thrust>(tank).unwrap().0, Vec2::X);
        assert_eq!(world.get::<Thrust>(me).unwrap().0, Vec2::ZERO);

        assert!(perform(&mut world, me, SoldierAction::Unmount, &mut rng).unwrap().succeeded());
        let rifle = world.resource::<Armory>().find("Rifle").unwrap();
        assert!(world.get::<Loadout>(me).unwrap().has(rifle));
        assert!(world.get::<Armor>(tank).unwrap().is_empty());
        assert_eq!(
            perform(&mut world, me, SoldierAction::Unmount, &mut rng).unwrap(),
            ActionOutcome::Refused(Refusal::NotMounted)
        );
    }

    #[test]
    fn test_mount_refusals() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        let far = spawn::spawn_vehicle(&mut world, Side::Blue, Vec2::new(200.0, 100.0), 0.0).unwrap();
        let enemy = spawn::spawn_vehicle(&mut world, Side::Red, Vec2::new(101.0, 100.0), 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            perform(&mut world, me, SoldierAction::Mount(far), &mut rng).unwrap(),
            ActionOutcome::Refused(Refusal::OutOfReach)
        );
        assert_eq!(
            perform(&mut world, me, SoldierAction::Mount(enemy), &mut rng).unwrap(),
            ActionOutcome::Refused(Refusal::WrongSide)
        );
        let mate = soldier(&mut world, Side::Blue, 101.0);
        assert!(matches!(
            perform(&mut world, me, SoldierAction::Mount(mate), &mut rng),
            Err(SimError::NotAVehicle(_))
        ));
    }

    #[test]
    fn test_digging_creates_then_deepens() {
        let mut world = test_world();
        let bounds = crate::terrain::world_bounds(world.resource::<SimConfig>());
        world.insert_resource(ObstacleIndex(crate::quadtree::QuadTree::new(bounds, 6, 8).unwrap()));
        let me = soldier(&mut world, Side::Blue, 100.0);
        let mut rng = StdRng::seed_from_u64(0);

        perform(&mut world, me, SoldierAction::Dig, &mut rng).unwrap();
        let hole = foxhole_at(&world, Vec2::new(100.0, 100.0)).unwrap();
        let first = world.get::<Foxhole>(hole).unwrap().depth;
        assert!(first > 0.0);

        perform(&mut world, me, SoldierAction::Dig, &mut rng).unwrap();
        assert_eq!(foxhole_at(&world, Vec2::new(100.0, 100.0)), Some(hole));
        assert!(world.get::<Foxhole>(hole).unwrap().depth > first);
        assert_eq!(world.resource::<ObstacleIndex>().0.len(), 1);
    }

    #[test]
    fn test_switch_weapon_bounds() {
        let mut world = test_world();
        let me = soldier(&mut world, Side::Blue, 100.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(perform(&mut world, me, SoldierAction::SwitchWeapon(0), &mut rng).unwrap().succeeded());
        assert_eq!(
            perform(&mut world, me, SoldierAction::SwitchWeapon(3), &mut rng).unwrap(),
            ActionOutcome::Refused(Refusal::NoSuchWeapon)
        );
    }
}
