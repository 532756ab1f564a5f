//! ECS Components for the skirmish simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use crate::armory::{Weapon, WeaponTypeId};
use crate::geometry::heading_vec;
use crate::quadtree::StaticEntry;
use crate::timer::Countdown;
use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 2D position on the battlefield (x = east/west, y = north/south).
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec2);

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vec2::new(x, y))
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        self.0.distance(other.0)
    }
}

/// 2D velocity vector.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity(pub Vec2);

impl Velocity {
    pub fn speed(&self) -> f32 {
        self.0.length()
    }
}

/// Acceleration requested this tick by `Move` actions; consumed by movement.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thrust(pub Vec2);

/// Facing angle in radians.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Heading(pub f32);

impl Heading {
    pub fn dir(&self) -> Vec2 {
        heading_vec(self.0)
    }
}

/// Size and locomotion limits of a body. `fov` is swapped while mounted.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Physique {
    pub radius: f32,
    pub max_speed: f32,
    pub max_acceleration: f32,
    /// Full field-of-view angle in radians.
    pub fov: f32,
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// World-scoped soldier number, also the AI iteration order.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoldierId(pub u32);

#[derive(Component, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldierName(pub String);

/// One of the two opposing factions.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Blue,
    Red,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Blue, Side::Red];

    pub fn index(&self) -> usize {
        match self {
            Side::Blue => 0,
            Side::Red => 1,
        }
    }

    pub fn opponent(&self) -> Side {
        match self {
            Side::Blue => Side::Red,
            Side::Red => Side::Blue,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Blue => "Blue",
            Side::Red => "Red",
        }
    }
}

/// Command rank. Ordering follows seniority.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    Private,
    Sergeant,
    Lieutenant,
    Captain,
}

impl Rank {
    /// Sergeants and above carry a radio.
    pub fn has_radio(&self) -> bool {
        *self >= Rank::Sergeant
    }

    pub fn is_leader(&self) -> bool {
        *self >= Rank::Sergeant
    }

    /// Rank that leads a unit made of units led by `self`.
    pub fn superior(&self) -> Rank {
        match self {
            Rank::Private => Rank::Sergeant,
            Rank::Sergeant => Rank::Lieutenant,
            Rank::Lieutenant | Rank::Captain => Rank::Captain,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Rank::Private => "Pvt.",
            Rank::Sergeant => "Sgt.",
            Rank::Lieutenant => "Lt.",
            Rank::Captain => "Capt.",
        }
    }
}

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Health of a soldier or vehicle.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn fraction(&self) -> f32 {
        if self.max <= 0.0 {
            0.0
        } else {
            (self.current / self.max).clamp(0.0, 1.0)
        }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current -= amount;
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Carried weapons and the selected one.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Loadout {
    pub weapons: Vec<Weapon>,
    pub current: usize,
}

impl Loadout {
    pub fn new(weapons: Vec<Weapon>) -> Self {
        Self { weapons, current: 0 }
    }

    pub fn current(&self) -> Option<&Weapon> {
        self.weapons.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut Weapon> {
        self.weapons.get_mut(self.current)
    }

    pub fn has(&self, kind: WeaponTypeId) -> bool {
        self.weapons.iter().any(|w| w.kind == kind)
    }

    pub fn tick(&mut self, dt: f32) {
        for weapon in &mut self.weapons {
            weapon.tick(dt);
        }
    }
}

/// Marker for soldier entities.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Soldier;

/// Marks a soldier or vehicle whose health reached zero. It stays indexed until the
/// next reap sweep.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Dead;

/// The non-combat side representative whose death ends the match.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Dictator;

// ============================================================================
// VITALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activity {
    #[default]
    Awake,
    Sleeping,
    Eating,
}

/// Fatigue and hunger counters in [0, 1], plus the current rest activity.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Vitals {
    pub fatigue: f32,
    pub hunger: f32,
    pub activity: Activity,
    /// Runs while sleeping or eating.
    pub activity_timer: Countdown,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            fatigue: 0.0,
            hunger: 0.0,
            activity: Activity::Awake,
            activity_timer: Countdown::one_shot(0.0).expired(),
        }
    }
}

impl Vitals {
    pub fn is_resting(&self) -> bool {
        self.activity != Activity::Awake
    }

    pub fn begin(&mut self, activity: Activity, duration: f32) {
        self.activity = activity;
        self.activity_timer = Countdown::one_shot(duration);
    }

    pub fn wake(&mut self) {
        self.activity = Activity::Awake;
    }
}

// ============================================================================
// COMMAND COMPONENTS
// ============================================================================

/// A node of the side's command tree. The tree owns commandees top-down; `leader` is
/// the non-owning back-link and always names the node whose `commandees` holds us.
#[derive(Component, Debug, Clone, Default)]
pub struct CommandNode {
    pub leader: Option<Entity>,
    pub commandees: Vec<Entity>,
}

/// A linear front: a centre point and the direction the line runs along.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackOrder {
    pub center: Vec2,
    pub line: Vec2,
}

impl AttackOrder {
    /// Front through `center`, perpendicular to the approach from `from`.
    pub fn facing(from: Vec2, center: Vec2) -> Self {
        let approach = (center - from).normalize_or_zero();
        let line = if approach == Vec2::ZERO {
            Vec2::Y
        } else {
            approach.perp()
        };
        Self { center, line }
    }

    /// Direction of advance (perpendicular to the line).
    pub fn front(&self) -> Vec2 {
        -self.line.perp()
    }

    /// Point `lateral` units along the line from the centre.
    pub fn slot(&self, lateral: f32) -> Vec2 {
        self.center + self.line.normalize_or_zero() * lateral
    }

    /// Same front shifted along the line.
    pub fn shifted(&self, lateral: f32) -> Self {
        Self {
            center: self.slot(lateral),
            line: self.line,
        }
    }
}

/// Where the soldier should be when nothing more urgent is happening.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Station {
    #[default]
    Free,
    /// Formation slot in the leader's frame (x forward, y left).
    Offset(Vec2),
    /// Hold this world position.
    Defend(Vec2),
}

/// Orders currently in force for a soldier.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Orders {
    pub station: Station,
    pub defending: bool,
    pub attack: Option<AttackOrder>,
}

/// Marker for AI-driven soldiers.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct AiControlled;

/// What a private is busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoldierGoal {
    #[default]
    KeepStation,
    Engage(Entity),
    Evade(Entity),
    Assault,
    DigIn,
    Rest,
    Investigate,
}

/// What a unit leader is busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandGoal {
    #[default]
    Hold,
    Lead,
    Engage(Entity),
    Evade(Entity),
}

/// Current goal, tagged by role. Privates run `Soldier`; sergeants and up run `Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Soldier(SoldierGoal),
    Command(CommandGoal),
}

impl Goal {
    pub fn for_rank(rank: Rank) -> Self {
        if rank.is_leader() {
            Goal::Command(CommandGoal::Hold)
        } else {
            Goal::Soldier(SoldierGoal::KeepStation)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Goal::Soldier(SoldierGoal::KeepStation) => "keep-station",
            Goal::Soldier(SoldierGoal::Engage(_)) | Goal::Command(CommandGoal::Engage(_)) => "engage",
            Goal::Soldier(SoldierGoal::Evade(_)) | Goal::Command(CommandGoal::Evade(_)) => "evade",
            Goal::Soldier(SoldierGoal::Assault) => "assault",
            Goal::Soldier(SoldierGoal::DigIn) => "dig-in",
            Goal::Soldier(SoldierGoal::Rest) => "rest",
            Goal::Soldier(SoldierGoal::Investigate) => "investigate",
            Goal::Command(CommandGoal::Hold) => "hold",
            Goal::Command(CommandGoal::Lead) => "lead",
        }
    }
}

/// Per-agent AI state.
#[derive(Component, Debug, Clone)]
pub struct Brain {
    pub goal: Goal,
    pub leader_timer: Countdown,
    pub order_timer: Countdown,
    pub wander_target: Vec2,
    /// Seconds since the current attack order arrived.
    pub attack_clock: f32,
    /// Success or failure for the current attack order has been sent upward.
    pub reported: bool,
    pub successes: Vec<Entity>,
    pub failures: Vec<Entity>,
    /// Seconds without contacts.
    pub quiet_time: f32,
}

impl Brain {
    pub fn new(rank: Rank, leader_check_period: f32, order_period: f32, phase: f32) -> Self {
        Self {
            goal: Goal::for_rank(rank),
            leader_timer: Countdown::repeating(leader_check_period).with_phase(phase),
            order_timer: Countdown::repeating(order_period).with_phase(phase).expired(),
            wander_target: Vec2::X,
            attack_clock: 0.0,
            reported: false,
            successes: Vec::new(),
            failures: Vec::new(),
            quiet_time: 0.0,
        }
    }

    /// Forget reports gathered for the previous attack order.
    pub fn reset_reports(&mut self) {
        self.attack_clock = 0.0;
        self.reported = false;
        self.successes.clear();
        self.failures.clear();
    }
}

/// Bundle for AI-controlled soldiers.
#[derive(Bundle)]
pub struct AiBundle {
    pub marker: AiControlled,
    pub brain: Brain,
}

// ============================================================================
// COMMUNICATION
// ============================================================================

/// Payload of an order message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive {
    /// Keep a slot in the leader's frame.
    Formation { offset: Vec2 },
    /// Hold a world position and dig in.
    Defend { position: Vec2 },
    /// Advance to and hold a front.
    Attack(AttackOrder),
    /// Move to a position without digging in.
    Goto { position: Vec2 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageKind {
    Order(Directive),
    Acknowledgement,
    ReportSuccess,
    ReportFail,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Message {
    pub sender: Entity,
    pub kind: MessageKind,
}

/// Double-buffered mailbox. Messages sent during a tick become readable on the next,
/// so delivery never depends on agent iteration order.
#[derive(Component, Debug, Clone, Default)]
pub struct Inbox {
    pub delivered: Vec<Message>,
    pub arriving: Vec<Message>,
}

impl Inbox {
    pub fn flip(&mut self) {
        self.delivered = std::mem::take(&mut self.arriving);
    }

    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.delivered)
    }
}

/// Marker for soldiers driven from outside through submitted actions.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PlayerControlled;

// ============================================================================
// PERCEPTION COMPONENTS
// ============================================================================

/// Cached perception, refreshed on a duty cycle rather than every tick.
#[derive(Component, Debug, Clone)]
pub struct Perception {
    pub soldiers: Vec<Entity>,
    pub vehicles: Vec<Entity>,
    pub foxholes: Vec<Entity>,
    /// Sound sources heard since the last refresh.
    pub heard: Vec<(Entity, Vec2)>,
    pub timer: Countdown,
}

impl Perception {
    pub fn new(period: f32, phase: f32) -> Self {
        Self {
            soldiers: Vec::new(),
            vehicles: Vec::new(),
            foxholes: Vec::new(),
            heard: Vec::new(),
            timer: Countdown::repeating(period).with_phase(phase).expired(),
        }
    }

    pub fn sees(&self, entity: Entity) -> bool {
        self.soldiers.contains(&entity)
    }

    pub fn clear(&mut self) {
        self.soldiers.clear();
        self.vehicles.clear();
        self.foxholes.clear();
        self.heard.clear();
    }
}

/// Static obstacles near the soldier, refreshed on a duty cycle for steering.
#[derive(Component, Debug, Clone)]
pub struct ObstacleCache {
    pub entries: Vec<StaticEntry>,
    pub timer: Countdown,
}

impl ObstacleCache {
    pub fn new(period: f32) -> Self {
        Self {
            entries: Vec::new(),
            timer: Countdown::repeating(period).expired(),
        }
    }
}

// ============================================================================
// VEHICLE COMPONENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seat {
    Driver,
    Passenger,
}

/// A mountable armoured vehicle.
#[derive(Component, Debug, Clone)]
pub struct Armor {
    pub driver: Option<Entity>,
    pub passengers: Vec<Entity>,
    pub capacity: usize,
    /// Weapons handed to whoever mounts.
    pub weapons: Vec<WeaponTypeId>,
    pub fov: f32,
}

impl Armor {
    pub fn occupants(&self) -> impl Iterator<Item = Entity> + '_ {
        self.driver.into_iter().chain(self.passengers.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.driver.is_none() && self.passengers.is_empty()
    }

    pub fn has_free_seat(&self) -> bool {
        self.driver.is_none() || self.passengers.len() < self.capacity
    }
}

/// Present on a soldier while inside a vehicle; holds what is restored on dismount.
#[derive(Component, Debug, Clone)]
pub struct Mounted {
    pub vehicle: Entity,
    pub seat: Seat,
    pub stowed: Loadout,
    pub stowed_fov: f32,
}

// ============================================================================
// TERRAIN COMPONENTS
// ============================================================================

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tree {
    pub radius: f32,
}

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Wall {
    pub a: Vec2,
    pub b: Vec2,
}

/// A dug position. Depth in [0, 1] shrinks the apparent hit radius of occupants.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Foxhole {
    pub depth: f32,
    pub radius: f32,
}

impl Foxhole {
    pub fn deepen(&mut self, amount: f32) {
        self.depth = (self.depth + amount).clamp(0.0, 1.0);
    }
}

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoadSegment {
    pub a: Vec2,
    pub b: Vec2,
    pub width: f32,
}

// ============================================================================
// PROJECTILES & TRIGGERS
// ============================================================================

/// A bullet in flight.
#[derive(Component, Debug, Clone)]
pub struct Bullet {
    pub shooter: Entity,
    pub side: Side,
    pub weapon: WeaponTypeId,
    pub muzzle_speed: f32,
    pub age: f32,
    pub time_to_live: f32,
    /// Trees crossing the whole flight path, computed once at spawn.
    pub trees: Vec<(Vec2, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerKind {
    /// One-shot: everyone inside hears `source`.
    Sound { source: Entity, side: Side },
    /// Persistent until taken.
    Pickup { weapon: WeaponTypeId },
}

/// A circular area that fires against the soldiers inside it.
#[derive(Component, Debug, Clone, Copy)]
pub struct TriggerZone {
    pub kind: TriggerKind,
    pub radius: f32,
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a complete soldier entity.
#[derive(Bundle)]
pub struct SoldierBundle {
    pub marker: Soldier,
    pub id: SoldierId,
    pub name: SoldierName,
    pub side: Side,
    pub rank: Rank,
    pub position: Position,
    pub velocity: Velocity,
    pub thrust: Thrust,
    pub heading: Heading,
    pub physique: Physique,
    pub health: Health,
    pub vitals: Vitals,
    pub loadout: Loadout,
    pub node: CommandNode,
    pub orders: Orders,
    pub perception: Perception,
    pub obstacles: ObstacleCache,
    pub inbox: Inbox,
}

/// Bundle for spawning a vehicle.
#[derive(Bundle)]
pub struct ArmorBundle {
    pub armor: Armor,
    pub side: Side,
    pub position: Position,
    pub velocity: Velocity,
    pub thrust: Thrust,
    pub heading: Heading,
    pub physique: Physique,
    pub health: Health,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_radio_and_order() {
        assert!(!Rank::Private.has_radio());
        assert!(Rank::Sergeant.has_radio());
        assert!(Rank::Captain > Rank::Lieutenant);
        assert_eq!(Rank::Sergeant.superior(), Rank::Lieutenant);
    }

    #[test]
    fn test_attack_order_geometry() {
        let order = AttackOrder::facing(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        // Line runs north-south, front points east.
        assert!(order.line.x.abs() < 1e-5);
        assert!((order.front() - Vec2::X).length() < 1e-5);
        let slot = order.slot(5.0);
        assert!((slot.x - 10.0).abs() < 1e-5 && (slot.y.abs() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_foxhole_depth_clamped() {
        let mut hole = Foxhole { depth: 0.9, radius: 1.0 };
        hole.deepen(0.5);
        assert_eq!(hole.depth, 1.0);
    }

    #[test]
    fn test_inbox_delivers_next_flip() {
        let mut inbox = Inbox::default();
        let sender = Entity::from_raw(3);
        inbox.arriving.push(Message {
            sender,
            kind: MessageKind::Acknowledgement,
        });
        assert!(inbox.drain().is_empty());
        inbox.flip();
        assert_eq!(inbox.drain().len(), 1);
        inbox.flip();
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn test_goal_follows_rank() {
        assert_eq!(Goal::for_rank(Rank::Private), Goal::Soldier(SoldierGoal::KeepStation));
        assert_eq!(Goal::for_rank(Rank::Captain), Goal::Command(CommandGoal::Hold));
    }

    #[test]
    fn test_perception_fires_on_first_tick() {
        let mut perception = Perception::new(0.5, 0.3);
        assert!(perception.timer.tick(0.01));
    }
}
