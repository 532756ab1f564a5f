//! ECS systems for the skirmish simulation.
//!
//! Systems contain the logic that operates on components. `SimWorld` runs them in one
//! chained schedule; see [`crate::api`] for the tick order.
//!
//! Several systems are exclusive (`fn(&mut World)`): the command AI, action execution,
//! hit application and the lifecycle sweeps all follow entity links (leaders,
//! vehicles, shooters) that a plain query cannot express.

pub mod actions;
pub mod bullets;
pub mod combat;
pub mod command;
pub mod comms;
pub mod lifecycle;
pub mod movement;
pub mod sensory;
pub mod steering;
pub mod triggers;
pub mod vitals;

pub use actions::{action_system, ActionOutcome, PendingActions, Refusal, SoldierAction};
pub use bullets::{apply_hits_system, bullet_flight_system, PendingHits};
pub use combat::weapon_reload_system;
pub use command::command_ai_system;
pub use comms::inbox_flip_system;
pub use lifecycle::{reap_system, reinforcement_system, win_check_system, LifecycleClocks, Outcome};
pub use movement::{mounted_follow_system, movement_system, DeltaTime, SimTick};
pub use sensory::{obstacle_cache_system, sensing_system};
pub use triggers::{footstep_system, trigger_system, FootstepClock};
pub use vitals::vitals_system;
