//! Command AI: per-rank goals, the order/report protocol and leader succession.
//!
//! Every AI soldier runs the same loop each tick, in `SoldierId` order:
//!
//! 1. tick its duty-cycle timers,
//! 2. on the leader-check timer, take over from a fallen leader ([`promote`]),
//! 3. read last tick's messages (orders, acknowledgements, reports),
//! 4. if it leads anyone: judge the reports it has gathered and, on the order timer,
//!    prune its dead commandees and re-issue orders,
//! 5. decide what to do this tick ([`think`]) and queue the resulting actions.
//!
//! All talking goes through `Communicate` actions, so range limits apply uniformly and
//! a message is read one tick after it was sent.
//!
//! Goals are a tagged variant dispatched on rank: privates run [`SoldierGoal`], sergeants
//! and above run [`CommandGoal`].

use crate::armory::Armory;
use crate::components::*;
use crate::config::{SimConfig, SimRng};
use crate::error::{SimError, SimResult};
use crate::geometry::local_to_world;
use crate::logging::InfoChannel;
use crate::spawn::leads_transitively;
use crate::systems::actions::{foxhole_at, is_alive, PendingActions, SoldierAction};
use crate::systems::bullets::describe;
use crate::systems::comms;
use crate::systems::movement::DeltaTime;
use crate::systems::steering::{compose, Agent, FormationLink, SteeringRequest, SteeringTarget, SteeringWeights};
use crate::systems::vitals::{MEAL_DURATION, SLEEP_DURATION};
use crate::terrain::{deployment_zone, world_bounds};
use bevy_ecs::prelude::*;
use glam::Vec2;
use rand::Rng;
use tracing::{debug, info, warn};

/// Below this health fraction a soldier breaks contact.
const EVADE_HEALTH: f32 = 0.3;
/// Distance from an attack slot that counts as "taken".
const SLOT_TOLERANCE: f32 = 10.0;
/// Seconds after which an attack that has not succeeded is reported as failed.
const ATTACK_TIMEOUT: f32 = 90.0;
/// How far a root leader pushes the front after a successful attack.
const ADVANCE_STEP: f32 = 100.0;
/// Contact-free seconds before a defender starts digging.
const DIG_QUIET_TIME: f32 = 5.0;
/// Contact-free seconds before an idle private eats or sleeps.
const REST_QUIET_TIME: f32 = 10.0;
const HUNGER_LIMIT: f32 = 0.7;
const FATIGUE_LIMIT: f32 = 0.8;
/// Same-side soldiers closer than this feed separation and cohesion.
const NEIGHBOUR_RADIUS: f32 = 6.0;
const ARRIVED: f32 = 2.0;

// ============================================================================
// FORMATION GEOMETRY
// ============================================================================

/// Spacing between commandees of the given rank, in formation and along a front.
pub fn slot_spacing(rank: Rank) -> f32 {
    match rank {
        Rank::Private => 4.0,
        Rank::Sergeant => 30.0,
        Rank::Lieutenant | Rank::Captain => 90.0,
    }
}

/// 0, 1, -1, 2, -2, ...
fn alternating(index: usize) -> f32 {
    let k = index.div_ceil(2) as f32;
    if index % 2 == 1 {
        k
    } else {
        -k
    }
}

/// Formation slot of the `index`-th commandee in the leader's frame. Privates form a
/// wedge behind the sergeant; sub-unit leaders form a line abreast.
pub fn formation_offset(rank: Rank, index: usize) -> Vec2 {
    let spacing = slot_spacing(rank);
    match rank {
        Rank::Private => {
            let row = (index / 2 + 1) as f32;
            let side = if index % 2 == 0 { 1.0 } else { -1.0 };
            Vec2::new(-row * spacing, side * row * spacing)
        }
        _ => Vec2::new(-spacing * 0.5, alternating(index) * spacing),
    }
}

/// Lateral position of the `index`-th of `count` commandees along a front.
pub fn attack_lateral(index: usize, count: usize, rank: Rank) -> f32 {
    (index as f32 - (count.saturating_sub(1)) as f32 * 0.5) * slot_spacing(rank)
}

// ============================================================================
// SYSTEM
// ============================================================================

/// Exclusive system running every AI soldier.
///
/// ## Data Access
/// - Reads: DeltaTime, SimConfig, Armory, SpatialGrid, perception and positions
/// - Writes: Brain, Orders, CommandNode, Rank, Vitals, Perception (heard), PendingActions, SimRng
pub fn command_ai_system(world: &mut World) {
    let dt = world.resource::<DeltaTime>().0;
    let mut agents: Vec<(SoldierId, Entity)> = world
        .query_filtered::<(Entity, &SoldierId), (With<AiControlled>, With<Brain>, Without<Dead>)>()
        .iter(world)
        .map(|(entity, id)| (*id, entity))
        .collect();
    agents.sort_unstable();

    world.resource_scope(|world, mut rng: Mut<SimRng>| {
        for (_, agent) in agents {
            if let Err(err) = run_agent(world, agent, dt, &mut rng.0) {
                warn!(?agent, %err, "skipping agent this tick");
            }
        }
    });
}

fn run_agent(world: &mut World, me: Entity, dt: f32, rng: &mut impl Rng) -> SimResult<()> {
    if !is_alive(world, me) {
        return Ok(());
    }
    let (leader_due, order_due) = {
        let mut brain = world.get_mut::<Brain>(me).ok_or(SimError::NotASoldier(me))?;
        brain.attack_clock += dt;
        (brain.leader_timer.tick(dt), brain.order_timer.tick(dt))
    };
    if leader_due {
        promote(world, me)?;
    }

    let messages = world.get_mut::<Inbox>(me).map(|mut inbox| inbox.drain()).unwrap_or_default();
    for message in messages {
        handle_message(world, me, message)?;
    }

    if part::<Rank>(world, me)?.is_leader() {
        evaluate_reports(world, me)?;
        if order_due {
            issue_orders(world, me)?;
        }
    }

    let decision = think(world, me, rng)?;
    apply_decision(world, me, decision, dt)
}

fn part<T: Component>(world: &World, entity: Entity) -> SimResult<&T> {
    world.get::<T>(entity).ok_or(if world.entities().contains(entity) {
        SimError::NotASoldier(entity)
    } else {
        SimError::InvalidReference(entity)
    })
}

fn send(world: &mut World, from: Entity, to: Entity, kind: MessageKind) {
    world
        .resource_mut::<PendingActions>()
        .push(from, SoldierAction::Communicate { target: to, kind });
}

fn announce(world: &mut World, text: String) {
    if let Some(mut channel) = world.get_resource_mut::<InfoChannel>() {
        channel.post(text);
    }
}

// ============================================================================
// SUCCESSION
// ============================================================================

/// Take over from a dead leader.
///
/// The caller inherits the leader's rank, orders and remaining commandees and moves
/// into the leader's place under the grand-leader (or becomes a root). Returns `false`
/// and changes nothing when the leader is alive or there is none, so calling it again
/// after a promotion is harmless.
///
/// Panics if the new links would form a cycle.
pub fn promote(world: &mut World, me: Entity) -> SimResult<bool> {
    let Some(leader) = part::<CommandNode>(world, me)?.leader else {
        return Ok(false);
    };
    if is_alive(world, leader) || !is_alive(world, me) {
        return Ok(false);
    }
    let Some(leader_node) = world.get::<CommandNode>(leader) else {
        warn!(?me, ?leader, "leader vanished, continuing without one");
        if let Some(mut node) = world.get_mut::<CommandNode>(me) {
            node.leader = None;
        }
        return Ok(false);
    };

    let grand = leader_node.leader;
    let lineup: Vec<Entity> = leader_node
        .commandees
        .iter()
        .copied()
        .filter(|&c| c == me || world.entities().contains(c))
        .collect();
    let my_rank = *part::<Rank>(world, me)?;
    let new_rank = world.get::<Rank>(leader).map_or(my_rank.superior(), |r| (*r).max(my_rank));
    let inherited = world.get::<Orders>(leader).copied().unwrap_or_default();

    // My own unit goes to its best soldier, who takes my place in the lineup.
    let deputy = hand_over(world, me, my_rank)?;
    let mut commandees: Vec<Entity> = lineup
        .into_iter()
        .filter_map(|c| if c == me { deputy } else { Some(c) })
        .collect();
    if let Some(deputy) = deputy.filter(|d| !commandees.contains(d)) {
        commandees.push(deputy);
    }

    // The fallen node gives up its subtree and its place.
    if let Some(mut node) = world.get_mut::<CommandNode>(leader) {
        node.commandees.clear();
        node.leader = None;
    }
    for &commandee in &commandees {
        if let Some(mut node) = world.get_mut::<CommandNode>(commandee) {
            node.leader = Some(me);
        }
    }
    if let Some(mut node) = world.get_mut::<CommandNode>(me) {
        node.commandees = commandees;
        node.leader = grand;
    }
    if let Some(grand) = grand {
        if let Some(mut node) = world.get_mut::<CommandNode>(grand) {
            if let Some(slot) = node.commandees.iter_mut().find(|c| **c == leader) {
                *slot = me;
            } else if !node.commandees.contains(&me) {
                node.commandees.push(me);
            }
        }
        assert!(
            !leads_transitively(world, me, grand),
            "promotion of {me:?} closed a command cycle"
        );
    }

    if let Some(mut rank) = world.get_mut::<Rank>(me) {
        *rank = new_rank;
    }
    if let Some(mut orders) = world.get_mut::<Orders>(me) {
        *orders = inherited;
    }
    if let Some(mut brain) = world.get_mut::<Brain>(me) {
        brain.goal = Goal::for_rank(new_rank);
        brain.reset_reports();
        brain.order_timer = brain.order_timer.expired();
    }

    let label = describe(world, me);
    info!(soldier = %label, ?leader, "promoted after leader fell");
    announce(world, format!("{label} takes command"));
    Ok(true)
}

/// Give `me`'s living commandees to the senior one among them (lowest id on a tie),
/// who steps up to `rank` and leads the rest. Returns the new deputy, if any.
fn hand_over(world: &mut World, me: Entity, rank: Rank) -> SimResult<Option<Entity>> {
    let mut unit: Vec<(Rank, SoldierId, Entity)> = Vec::new();
    for &c in &part::<CommandNode>(world, me)?.commandees {
        if is_alive(world, c) {
            unit.push((*part::<Rank>(world, c)?, *part::<SoldierId>(world, c)?, c));
        }
    }
    unit.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let Some(&(deputy_rank, _, deputy)) = unit.first() else {
        return Ok(None);
    };
    let rest: Vec<Entity> = unit[1..].iter().map(|&(_, _, c)| c).collect();

    // A deputy who already leads passes that unit down in turn, so every list holds
    // one tier.
    let sub = hand_over(world, deputy, deputy_rank)?;
    for &c in &rest {
        if let Some(mut node) = world.get_mut::<CommandNode>(c) {
            node.leader = Some(deputy);
        }
    }
    if let Some(mut node) = world.get_mut::<CommandNode>(deputy) {
        node.commandees = sub.into_iter().chain(rest).collect();
    }
    let stepped_up = deputy_rank.max(rank);
    if let Some(mut r) = world.get_mut::<Rank>(deputy) {
        *r = stepped_up;
    }
    let my_orders = world.get::<Orders>(me).copied().unwrap_or_default();
    if let Some(mut orders) = world.get_mut::<Orders>(deputy) {
        *orders = my_orders;
    }
    if let Some(mut brain) = world.get_mut::<Brain>(deputy) {
        brain.goal = Goal::for_rank(stepped_up);
        brain.reset_reports();
        brain.order_timer = brain.order_timer.expired();
    }
    debug!(?me, ?deputy, "unit handed over");
    Ok(Some(deputy))
}

// ============================================================================
// MESSAGES
// ============================================================================

fn handle_message(world: &mut World, me: Entity, message: Message) -> SimResult<()> {
    let node = part::<CommandNode>(world, me)?;
    let leader = node.leader;
    let from_commandee = node.commandees.contains(&message.sender);

    match message.kind {
        MessageKind::Order(directive) => {
            if leader != Some(message.sender) {
                debug!(?me, sender = ?message.sender, "ignoring order from outside the chain");
                return Ok(());
            }
            let attack_changed = {
                let mut orders = world.get_mut::<Orders>(me).ok_or(SimError::NotASoldier(me))?;
                let before = orders.attack;
                match directive {
                    Directive::Formation { offset } => {
                        orders.station = Station::Offset(offset);
                        orders.defending = false;
                        orders.attack = None;
                    }
                    Directive::Defend { position } => {
                        orders.station = Station::Defend(position);
                        orders.defending = true;
                        orders.attack = None;
                    }
                    Directive::Goto { position } => {
                        orders.station = Station::Defend(position);
                        orders.defending = false;
                        orders.attack = None;
                    }
                    Directive::Attack(order) => {
                        orders.attack = Some(order);
                        orders.defending = false;
                    }
                }
                before != orders.attack
            };
            if attack_changed {
                if let Some(mut brain) = world.get_mut::<Brain>(me) {
                    brain.reset_reports();
                }
            }
            send(world, me, message.sender, MessageKind::Acknowledgement);
        }
        MessageKind::Acknowledgement => {
            debug!(?me, sender = ?message.sender, "order acknowledged");
        }
        MessageKind::ReportSuccess | MessageKind::ReportFail => {
            if !from_commandee {
                return Ok(());
            }
            if let Some(mut brain) = world.get_mut::<Brain>(me) {
                let list = if message.kind == MessageKind::ReportSuccess {
                    &mut brain.successes
                } else {
                    &mut brain.failures
                };
                if !list.contains(&message.sender) {
                    list.push(message.sender);
                }
            }
        }
    }
    Ok(())
}

/// Turn gathered reports into a verdict on the current attack. A unanimous success
/// goes one level up (or, at the root, pushes the front forward); a majority of
/// failures makes the unit dig in where it stands.
fn evaluate_reports(world: &mut World, me: Entity) -> SimResult<()> {
    let Some(order) = part::<Orders>(world, me)?.attack else {
        return Ok(());
    };
    let living: Vec<Entity> = part::<CommandNode>(world, me)?
        .commandees
        .iter()
        .copied()
        .filter(|&c| is_alive(world, c))
        .collect();
    let brain = part::<Brain>(world, me)?;
    if living.is_empty() || brain.reported {
        return Ok(());
    }
    let successes = living.iter().filter(|c| brain.successes.contains(c)).count();
    let failures = living.iter().filter(|c| brain.failures.contains(c)).count();
    let leader = part::<CommandNode>(world, me)?.leader.filter(|&l| is_alive(world, l));
    let label = describe(world, me);

    if successes == living.len() {
        match leader {
            Some(leader) => {
                if comms::reachable(world, me, leader)? {
                    send(world, me, leader, MessageKind::ReportSuccess);
                    if let Some(mut brain) = world.get_mut::<Brain>(me) {
                        brain.reported = true;
                    }
                }
            }
            None => {
                let bounds = world_bounds(world.resource::<SimConfig>());
                let next = AttackOrder {
                    center: (order.center + order.front() * ADVANCE_STEP).clamp(bounds.min, bounds.max),
                    line: order.line,
                };
                if let Some(mut orders) = world.get_mut::<Orders>(me) {
                    orders.attack = Some(next);
                }
                if let Some(mut brain) = world.get_mut::<Brain>(me) {
                    brain.reset_reports();
                    brain.order_timer = brain.order_timer.expired();
                }
                info!(leader = %label, x = next.center.x, y = next.center.y, "objective taken, advancing");
                announce(world, format!("{label}: objective taken, advancing"));
            }
        }
    } else if failures * 2 > living.len() {
        let pos = part::<Position>(world, me)?.0;
        if let Some(mut orders) = world.get_mut::<Orders>(me) {
            orders.attack = None;
            orders.defending = true;
            orders.station = Station::Defend(pos);
        }
        if let Some(mut brain) = world.get_mut::<Brain>(me) {
            brain.reset_reports();
            brain.order_timer = brain.order_timer.expired();
        }
        if let Some(leader) = leader {
            send(world, me, leader, MessageKind::ReportFail);
        }
        info!(leader = %label, "attack failed, digging in");
        announce(world, format!("{label}: attack failed, digging in"));
    }
    Ok(())
}

/// Prune dead commandees and send each survivor its current directive.
fn issue_orders(world: &mut World, me: Entity) -> SimResult<()> {
    let living: Vec<Entity> = {
        let mut node = world.get_mut::<CommandNode>(me).ok_or(SimError::NotASoldier(me))?;
        let all = std::mem::take(&mut node.commandees);
        drop(node);
        all.into_iter().filter(|&c| is_alive(world, c)).collect()
    };
    if let Some(mut node) = world.get_mut::<CommandNode>(me) {
        node.commandees = living.clone();
    }
    if let Some(mut brain) = world.get_mut::<Brain>(me) {
        brain.successes.retain(|c| living.contains(c));
        brain.failures.retain(|c| living.contains(c));
    }
    if living.is_empty() {
        return Ok(());
    }

    let pos = part::<Position>(world, me)?.0;
    let heading = part::<Heading>(world, me)?.0;
    let side = *part::<Side>(world, me)?;
    let is_root = part::<CommandNode>(world, me)?.leader.is_none();
    let mut orders = *part::<Orders>(world, me)?;

    // A root leader with nothing to do goes for the enemy's deployment area.
    if orders.attack.is_none() && !orders.defending && is_root {
        let objective = deployment_zone(side.opponent(), world.resource::<SimConfig>()).center();
        let order = AttackOrder::facing(pos, objective);
        orders.attack = Some(order);
        if let Some(mut current) = world.get_mut::<Orders>(me) {
            current.attack = Some(order);
        }
        if let Some(mut brain) = world.get_mut::<Brain>(me) {
            brain.reset_reports();
        }
        let label = describe(world, me);
        info!(leader = %label, x = objective.x, y = objective.y, "attack ordered");
        announce(world, format!("{label} orders an attack"));
    }

    let count = living.len();
    for (index, commandee) in living.into_iter().enumerate() {
        let rank = *part::<Rank>(world, commandee)?;
        let directive = match orders.attack {
            Some(order) => Directive::Attack(order.shifted(attack_lateral(index, count, rank))),
            None if orders.defending => Directive::Defend {
                position: pos + local_to_world(formation_offset(rank, index), heading),
            },
            None => Directive::Formation {
                offset: formation_offset(rank, index),
            },
        };
        send(world, me, commandee, MessageKind::Order(directive));
    }
    Ok(())
}

// ============================================================================
// DECISIONS
// ============================================================================

/// What one agent wants to do this tick.
#[derive(Debug, Clone)]
pub struct Decision {
    pub goal: Goal,
    pub actions: Vec<SoldierAction>,
    pub rest: Option<Activity>,
    pub wake: bool,
    /// A success or failure report for the current attack is among `actions`.
    pub reported: bool,
    pub wander_target: Vec2,
    /// An enemy was seen or heard.
    pub contact: bool,
}

fn engage_goal(rank: Rank, foe: Entity) -> Goal {
    if rank.is_leader() {
        Goal::Command(CommandGoal::Engage(foe))
    } else {
        Goal::Soldier(SoldierGoal::Engage(foe))
    }
}

fn evade_goal(rank: Rank, foe: Entity) -> Goal {
    if rank.is_leader() {
        Goal::Command(CommandGoal::Evade(foe))
    } else {
        Goal::Soldier(SoldierGoal::Evade(foe))
    }
}

/// Pick a goal and the actions that pursue it. Reads the world only; the random
/// source drives wander and nothing else.
pub fn think(world: &World, me: Entity, rng: &mut impl Rng) -> SimResult<Decision> {
    let pos = part::<Position>(world, me)?.0;
    let vel = part::<Velocity>(world, me)?.0;
    let heading = part::<Heading>(world, me)?.0;
    let physique = *part::<Physique>(world, me)?;
    let side = *part::<Side>(world, me)?;
    let rank = *part::<Rank>(world, me)?;
    let health = part::<Health>(world, me)?.fraction();
    let vitals = *part::<Vitals>(world, me)?;
    let orders = *part::<Orders>(world, me)?;
    let node = part::<CommandNode>(world, me)?;
    let perception = part::<Perception>(world, me)?;
    let brain = part::<Brain>(world, me)?;
    let mounted = world.get::<Mounted>(me).is_some();
    let obstacles = world.get::<ObstacleCache>(me).map_or(&[][..], |c| c.entries.as_slice());
    let armory = world.resource::<Armory>();

    let mut decision = Decision {
        goal: brain.goal,
        actions: Vec::new(),
        rest: None,
        wake: false,
        reported: false,
        wander_target: brain.wander_target,
        contact: false,
    };

    let hostile = |e: Entity| world.get::<Side>(e).map_or(false, |s| *s != side);
    let enemy = perception
        .soldiers
        .iter()
        .chain(&perception.vehicles)
        .copied()
        .filter(|&e| hostile(e) && is_alive(world, e))
        .filter_map(|e| {
            let at = world.get::<Position>(e)?.0;
            let moving = world.get::<Velocity>(e).map_or(Vec2::ZERO, |v| v.0);
            Some((e, at, moving))
        })
        .min_by(|a, b| a.1.distance_squared(pos).total_cmp(&b.1.distance_squared(pos)));
    let heard = perception
        .heard
        .iter()
        .rev()
        .find(|(source, _)| hostile(*source))
        .map(|(_, at)| *at);
    decision.contact = enemy.is_some() || heard.is_some();

    if vitals.is_resting() {
        if enemy.is_none() {
            return Ok(decision);
        }
        decision.wake = true;
    }

    let (range, loaded) = world
        .get::<Loadout>(me)
        .and_then(|l| l.current())
        .map_or((0.0, false), |w| (armory.get(w.kind).range, w.is_loaded()));
    let leader = node.leader.filter(|&l| is_alive(world, l));
    let leads_anyone = node.commandees.iter().any(|&c| is_alive(world, c));

    let mut target = SteeringTarget::Idle;
    let mut formation = None;
    let mut facing = None;

    if let Some((foe, foe_pos, foe_vel)) = enemy {
        let to_foe = foe_pos - pos;
        let in_range = to_foe.length() <= range;
        facing = Some(to_foe);
        if in_range && loaded {
            decision.actions.push(SoldierAction::Shoot(to_foe));
        }
        if health < EVADE_HEALTH {
            decision.goal = evade_goal(rank, foe);
            target = SteeringTarget::Evade {
                pos: foe_pos,
                vel: foe_vel,
            };
        } else {
            decision.goal = engage_goal(rank, foe);
            if !in_range && !orders.defending && range > 0.0 {
                target = SteeringTarget::Pursue {
                    pos: foe_pos,
                    vel: foe_vel,
                };
            }
        }
    } else if let Some(at) = heard {
        facing = Some(at - pos);
        decision.goal = if rank.is_leader() {
            Goal::Command(CommandGoal::Hold)
        } else {
            Goal::Soldier(SoldierGoal::Investigate)
        };
    }

    let mut digging = false;
    if enemy.is_none() {
        if let Some(order) = orders.attack {
            target = SteeringTarget::Arrive(order.center);
            if heard.is_none() {
                decision.goal = if rank.is_leader() {
                    Goal::Command(CommandGoal::Lead)
                } else {
                    Goal::Soldier(SoldierGoal::Assault)
                };
            }
            // Anyone without living commandees reports for itself.
            if let (Some(leader), false, false) = (leader, leads_anyone, brain.reported) {
                let verdict = if brain.attack_clock > ATTACK_TIMEOUT || health < EVADE_HEALTH {
                    Some(MessageKind::ReportFail)
                } else if pos.distance(order.center) <= SLOT_TOLERANCE && !decision.contact {
                    Some(MessageKind::ReportSuccess)
                } else {
                    None
                };
                if let Some(kind) = verdict {
                    if comms::reachable(world, me, leader)? {
                        decision.actions.push(SoldierAction::Communicate { target: leader, kind });
                        decision.reported = true;
                    }
                }
            }
        } else {
            match orders.station {
                Station::Offset(offset) => match leader {
                    Some(leader) => {
                        let leader_pos = part::<Position>(world, leader)?.0;
                        if perception.sees(leader) && offset != Vec2::ZERO {
                            let neighbours = perception
                                .soldiers
                                .iter()
                                .filter(|&&e| e != me && !hostile(e))
                                .filter_map(|&e| world.get::<Position>(e).map(|p| p.0))
                                .filter(|p| p.distance(pos) <= NEIGHBOUR_RADIUS)
                                .collect();
                            formation = Some(FormationLink {
                                leader_pos,
                                leader_vel: world.get::<Velocity>(leader).map_or(Vec2::ZERO, |v| v.0),
                                leader_heading: world.get::<Heading>(leader).map_or(0.0, |h| h.0),
                                offset,
                                neighbours,
                            });
                        } else {
                            target = SteeringTarget::Arrive(leader_pos);
                        }
                    }
                    None => target = SteeringTarget::Wander,
                },
                Station::Defend(position) => {
                    if pos.distance(position) > ARRIVED {
                        target = SteeringTarget::Arrive(position);
                    } else if orders.defending && !rank.is_leader() && !decision.contact && brain.quiet_time >= DIG_QUIET_TIME {
                        let dug = foxhole_at(world, pos)
                            .and_then(|hole| world.get::<Foxhole>(hole))
                            .map_or(0.0, |hole| hole.depth);
                        if dug < 1.0 && !mounted {
                            decision.actions.push(SoldierAction::Dig);
                            decision.goal = Goal::Soldier(SoldierGoal::DigIn);
                            digging = true;
                        }
                    }
                }
                Station::Free => target = SteeringTarget::Wander,
            }
        }
    }

    // Idle privates look after themselves.
    let holding = target == SteeringTarget::Idle && formation.is_none() && !digging;
    if holding && rank == Rank::Private && !decision.contact && brain.quiet_time >= REST_QUIET_TIME && !mounted {
        if vitals.hunger > HUNGER_LIMIT {
            decision.rest = Some(Activity::Eating);
        } else if vitals.fatigue > FATIGUE_LIMIT {
            decision.rest = Some(Activity::Sleeping);
        }
        if decision.rest.is_some() {
            decision.goal = Goal::Soldier(SoldierGoal::Rest);
            decision.actions.clear();
            return Ok(decision);
        }
    }

    if !mounted {
        let agent = Agent {
            pos,
            vel,
            heading,
            radius: physique.radius,
            max_speed: physique.max_speed,
            max_accel: physique.max_acceleration,
        };
        let request = SteeringRequest {
            target,
            formation,
            obstacles,
        };
        let mut wander = decision.wander_target;
        let force = compose(&agent, &request, &SteeringWeights::default(), &mut wander, rng);
        decision.wander_target = wander;
        if force.length_squared() > 1e-6 {
            decision.actions.push(SoldierAction::Move(force));
        }
    }

    let face = facing.or_else(|| (vel.length() > 0.5).then_some(vel));
    if let Some(dir) = face.filter(|d| *d != Vec2::ZERO) {
        decision.actions.insert(0, SoldierAction::Turn(dir));
    }
    Ok(decision)
}

fn apply_decision(world: &mut World, me: Entity, decision: Decision, dt: f32) -> SimResult<()> {
    {
        let mut brain = world.get_mut::<Brain>(me).ok_or(SimError::NotASoldier(me))?;
        brain.goal = decision.goal;
        brain.wander_target = decision.wander_target;
        if decision.reported {
            brain.reported = true;
        }
        brain.quiet_time = if decision.contact { 0.0 } else { brain.quiet_time + dt };
    }
    if let Some(mut vitals) = world.get_mut::<Vitals>(me) {
        if decision.wake {
            vitals.wake();
        }
        match decision.rest {
            Some(Activity::Sleeping) => vitals.begin(Activity::Sleeping, SLEEP_DURATION),
            Some(Activity::Eating) => vitals.begin(Activity::Eating, MEAL_DURATION),
            _ => {}
        }
    }
    if let Some(mut perception) = world.get_mut::<Perception>(me) {
        perception.heard.clear();
    }
    let mut pending = world.resource_mut::<PendingActions>();
    for action in decision.actions {
        pending.push(me, action);
    }
    Ok(())
}
