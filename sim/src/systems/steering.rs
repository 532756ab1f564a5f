//! Steering behaviours and the priority accumulator that combines them.
//!
//! Each behaviour returns a force that is truncated to its own cap. Forces are then
//! added to an [`Accumulator`] in priority order; once the global budget is spent,
//! weaker behaviours get nothing. The result is the `Move` request for the tick.

use crate::geometry::{closest_point_on_segment, heading_vec, local_to_world, truncate};
use crate::quadtree::{Shape, StaticEntry};
use glam::Vec2;
use rand::Rng;

/// Kinematic state of the body being steered.
#[derive(Debug, Clone, Copy)]
pub struct Agent {
    pub pos: Vec2,
    pub vel: Vec2,
    pub heading: f32,
    pub radius: f32,
    pub max_speed: f32,
    pub max_accel: f32,
}

/// Running sum with a magnitude budget.
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    total: Vec2,
    budget: f32,
}

impl Accumulator {
    pub fn new(budget: f32) -> Self {
        Self {
            total: Vec2::ZERO,
            budget: budget.max(0.0),
        }
    }

    /// Add as much of `force` as the budget allows. Returns `true` once saturated.
    pub fn add(&mut self, force: Vec2) -> bool {
        let used = self.total.length();
        let left = self.budget - used;
        if left <= 1e-6 {
            return true;
        }
        let magnitude = force.length();
        if magnitude <= left {
            self.total += force;
            false
        } else {
            self.total += force / magnitude * left;
            true
        }
    }

    pub fn total(&self) -> Vec2 {
        self.total
    }

    pub fn is_saturated(&self) -> bool {
        self.total.length() >= self.budget - 1e-6
    }
}

/// Per-behaviour caps as fractions of the agent's maximum acceleration.
#[derive(Debug, Clone, Copy)]
pub struct SteeringWeights {
    pub wall_avoidance: f32,
    pub obstacle_avoidance: f32,
    pub pursuit: f32,
    pub evade: f32,
    pub arrive: f32,
    pub wander: f32,
    pub separation: f32,
    pub cohesion: f32,
    pub offset_pursuit: f32,
    /// Multiplier applied to avoidance forces before capping.
    pub avoidance_gain: f32,
}

impl Default for SteeringWeights {
    fn default() -> Self {
        Self {
            wall_avoidance: 1.0,
            obstacle_avoidance: 1.0,
            pursuit: 1.0,
            evade: 1.0,
            arrive: 1.0,
            wander: 0.4,
            separation: 0.6,
            cohesion: 0.3,
            offset_pursuit: 1.0,
            avoidance_gain: 3.0,
        }
    }
}

// ============================================================================
// INDIVIDUAL BEHAVIOURS
// ============================================================================

pub fn seek(agent: &Agent, target: Vec2) -> Vec2 {
    (target - agent.pos).normalize_or_zero() * agent.max_speed - agent.vel
}

pub fn flee(agent: &Agent, threat: Vec2) -> Vec2 {
    (agent.pos - threat).normalize_or_zero() * agent.max_speed - agent.vel
}

/// Seek that slows down over the last `slowing_distance` units.
pub fn arrive(agent: &Agent, target: Vec2, slowing_distance: f32) -> Vec2 {
    let to_target = target - agent.pos;
    let distance = to_target.length();
    if distance < 1e-3 {
        return -agent.vel;
    }
    let speed = if distance < slowing_distance {
        agent.max_speed * distance / slowing_distance.max(1e-3)
    } else {
        agent.max_speed
    };
    to_target / distance * speed - agent.vel
}

/// Seek the point a moving target will reach.
pub fn pursuit(agent: &Agent, target_pos: Vec2, target_vel: Vec2) -> Vec2 {
    let lookahead = agent.pos.distance(target_pos) / (agent.max_speed + target_vel.length()).max(1e-3);
    seek(agent, target_pos + target_vel * lookahead)
}

pub fn evade(agent: &Agent, threat_pos: Vec2, threat_vel: Vec2) -> Vec2 {
    let lookahead = agent.pos.distance(threat_pos) / (agent.max_speed + threat_vel.length()).max(1e-3);
    flee(agent, threat_pos + threat_vel * lookahead)
}

/// Jittered target on a circle projected ahead of the agent. `state` persists between
/// calls and stays on the unit circle.
pub fn wander(agent: &Agent, state: &mut Vec2, rng: &mut impl Rng) -> Vec2 {
    const JITTER: f32 = 0.3;
    const DISTANCE: f32 = 2.0;
    const RADIUS: f32 = 1.5;
    let jitter = Vec2::new(rng.gen_range(-JITTER..=JITTER), rng.gen_range(-JITTER..=JITTER));
    *state = (*state + jitter).normalize_or(Vec2::X);
    let local = Vec2::new(DISTANCE, 0.0) + *state * RADIUS;
    let world = agent.pos + local_to_world(local, agent.heading);
    seek(agent, world)
}

/// Push away from neighbours, weighted by inverse distance.
pub fn separation(agent: &Agent, neighbours: &[Vec2]) -> Vec2 {
    neighbours
        .iter()
        .map(|&n| agent.pos - n)
        .filter(|d| d.length_squared() > 1e-6)
        .map(|d| d / d.length_squared())
        .sum::<Vec2>()
        * agent.max_speed
}

/// Seek the centre of mass of neighbours.
pub fn cohesion(agent: &Agent, neighbours: &[Vec2]) -> Vec2 {
    if neighbours.is_empty() {
        return Vec2::ZERO;
    }
    let center = neighbours.iter().copied().sum::<Vec2>() / neighbours.len() as f32;
    seek(agent, center)
}

/// Arrive at `offset` (leader frame: x forward, y left), led by the leader's velocity.
pub fn offset_pursuit(agent: &Agent, leader_pos: Vec2, leader_vel: Vec2, leader_heading: f32, offset: Vec2) -> Vec2 {
    let slot = leader_pos + local_to_world(offset, leader_heading);
    let lookahead = agent.pos.distance(slot) / (agent.max_speed + leader_vel.length()).max(1e-3);
    arrive(agent, slot + leader_vel * lookahead, 4.0)
}

/// Lateral push away from circular obstacles inside a box projected along the
/// direction of travel.
pub fn obstacle_avoidance(agent: &Agent, obstacles: &[StaticEntry]) -> Vec2 {
    let speed = agent.vel.length();
    let forward = if speed > 1e-3 {
        agent.vel / speed
    } else {
        heading_vec(agent.heading)
    };
    let side = forward.perp();
    let box_length = agent.radius * 2.0 + speed * 1.5;

    let mut closest: Option<(f32, Vec2, f32)> = None;
    for entry in obstacles {
        let Shape::Circle { center, radius } = entry.shape else {
            continue;
        };
        let local = center - agent.pos;
        let ahead = local.dot(forward);
        let lateral = local.dot(side);
        let reach = radius + agent.radius;
        if ahead < 0.0 || ahead > box_length + radius || lateral.abs() >= reach {
            continue;
        }
        if closest.map_or(true, |(d, _, _)| ahead < d) {
            closest = Some((ahead, Vec2::new(ahead, lateral), reach));
        }
    }

    match closest {
        Some((ahead, local, reach)) => {
            let urgency = 1.0 + (box_length - ahead).max(0.0) / box_length.max(1e-3);
            let push_side = if local.y >= 0.0 { -1.0 } else { 1.0 };
            let lateral_force = (reach - local.y.abs()) * push_side * urgency;
            let braking = -(reach - ahead).max(0.0) * 0.2;
            forward * braking + side * lateral_force * agent.max_speed
        }
        None => Vec2::ZERO,
    }
}

/// Feelers ahead of the agent; pushes out along the wall normal by the penetration depth.
pub fn wall_avoidance(agent: &Agent, obstacles: &[StaticEntry]) -> Vec2 {
    let forward = heading_vec(agent.heading);
    let length = agent.radius + 2.0 + agent.vel.length();
    let feelers = [
        forward * length,
        local_to_world(Vec2::new(length * 0.5, length * 0.5), agent.heading),
        local_to_world(Vec2::new(length * 0.5, -length * 0.5), agent.heading),
    ];

    let mut strongest = Vec2::ZERO;
    for entry in obstacles {
        let Shape::Segment { a, b, half_width } = entry.shape else {
            continue;
        };
        for feeler in feelers {
            let tip = agent.pos + feeler;
            let nearest = closest_point_on_segment(a, b, tip);
            let clearance = half_width + agent.radius;
            let away = tip - nearest;
            let gap = away.length();
            // The tip is past or touching the wall when its closest point is on our side.
            let crossed = crate::geometry::segments_intersect(agent.pos, tip, a, b);
            if !crossed && gap >= clearance {
                continue;
            }
            let normal = {
                let n = (b - a).perp().normalize_or_zero();
                if (agent.pos - a).dot(n) >= 0.0 {
                    n
                } else {
                    -n
                }
            };
            let depth = if crossed { clearance + gap } else { clearance - gap };
            let force = normal * depth * agent.max_speed;
            if force.length_squared() > strongest.length_squared() {
                strongest = force;
            }
        }
    }
    strongest
}

// ============================================================================
// COMPOSITION
// ============================================================================

/// What the agent is trying to do this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SteeringTarget {
    Idle,
    Wander,
    Arrive(Vec2),
    Pursue { pos: Vec2, vel: Vec2 },
    Evade { pos: Vec2, vel: Vec2 },
}

/// Formation terms, only present while the agent is led with a nonzero offset and the
/// leader is in sight.
#[derive(Debug, Clone)]
pub struct FormationLink {
    pub leader_pos: Vec2,
    pub leader_vel: Vec2,
    pub leader_heading: f32,
    pub offset: Vec2,
    pub neighbours: Vec<Vec2>,
}

#[derive(Debug, Clone)]
pub struct SteeringRequest<'a> {
    pub target: SteeringTarget,
    pub formation: Option<FormationLink>,
    pub obstacles: &'a [StaticEntry],
}

/// Combine behaviours in priority order into one acceleration request.
///
/// Avoidance goes in first regardless of the budget; then the target behaviour; then,
/// only with a formation link, separation, cohesion (skipped if separation saturated
/// the budget) and offset pursuit.
pub fn compose(
    agent: &Agent,
    request: &SteeringRequest<'_>,
    weights: &SteeringWeights,
    wander_state: &mut Vec2,
    rng: &mut impl Rng,
) -> Vec2 {
    let cap = |fraction: f32| agent.max_accel * fraction;
    let mut acc = Accumulator::new(agent.max_accel);

    acc.add(truncate(
        wall_avoidance(agent, request.obstacles) * weights.avoidance_gain,
        cap(weights.wall_avoidance),
    ));
    acc.add(truncate(
        obstacle_avoidance(agent, request.obstacles) * weights.avoidance_gain,
        cap(weights.obstacle_avoidance),
    ));

    match request.target {
        SteeringTarget::Idle => {}
        SteeringTarget::Wander => {
            acc.add(truncate(wander(agent, wander_state, rng), cap(weights.wander)));
        }
        SteeringTarget::Arrive(target) => {
            acc.add(truncate(arrive(agent, target, 6.0), cap(weights.arrive)));
        }
        SteeringTarget::Pursue { pos, vel } => {
            acc.add(truncate(pursuit(agent, pos, vel), cap(weights.pursuit)));
        }
        SteeringTarget::Evade { pos, vel } => {
            acc.add(truncate(evade(agent, pos, vel), cap(weights.evade)));
        }
    }

    if let Some(link) = &request.formation {
        add_formation(agent, link, weights, &mut acc);
    }

    acc.total()
}

/// Which formation terms `add_formation` let through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FormationTerms {
    separation_saturated: bool,
    cohesion: bool,
}

/// Separation, then cohesion unless separation used up the budget, then offset pursuit.
fn add_formation(agent: &Agent, link: &FormationLink, weights: &SteeringWeights, acc: &mut Accumulator) -> FormationTerms {
    let mut terms = FormationTerms::default();
    if link.offset == Vec2::ZERO {
        return terms;
    }
    let cap = |fraction: f32| agent.max_accel * fraction;
    terms.separation_saturated = acc.add(truncate(separation(agent, &link.neighbours), cap(weights.separation)));
    if !terms.separation_saturated {
        acc.add(truncate(cohesion(agent, &link.neighbours), cap(weights.cohesion)));
        terms.cohesion = true;
    }
    acc.add(truncate(
        offset_pursuit(agent, link.leader_pos, link.leader_vel, link.leader_heading, link.offset),
        cap(weights.offset_pursuit),
    ));
    terms
}
