//! Public API for the simulation.
//!
//! `SimWorld` owns the ECS world and the per-tick schedule and is the only thing a
//! client needs: it builds the battlefield, advances time, accepts actions from
//! player-driven soldiers and hands out read-only views.
//!
//! ## Fixed Timestep
//!
//! The simulation runs at a fixed timestep (default 30 Hz). `step(dt)` scales the
//! wall-clock delta by the configured time coefficient, accumulates it and runs as
//! many fixed ticks as fit, so results do not depend on frame rate.
//!
//! ## Tick Order
//!
//! 1. Inboxes flip, vitals and reloads advance
//! 2. Perception and obstacle caches refresh on their duty cycles
//! 3. Command AI thinks; all queued actions execute
//! 4. Bodies move, passengers follow their vehicles, the soldier index refreshes
//! 5. Bullets fly and hits are applied
//! 6. Sounds and pickups fire against the refreshed index
//! 7. Win check, reinforcements, reaping

use crate::armory::Armory;
use crate::components::*;
use crate::config::{SimConfig, SimRng};
use crate::error::{SimError, SimResult};
use crate::logging::InfoChannel;
use crate::query::{ArmorQuery, SoldierQuery};
use crate::spatial::{spatial_grid_update_system, SpatialGrid};
use crate::spawn::{self, SoldierRoster};
use crate::systems::actions::{self, action_system, ActionOutcome, PendingActions, SoldierAction};
use crate::systems::bullets::{apply_hits_system, bullet_flight_system, PendingHits};
use crate::systems::combat::weapon_reload_system;
use crate::systems::command::command_ai_system;
use crate::systems::comms::inbox_flip_system;
use crate::systems::lifecycle::{reap_system, reinforcement_system, win_check_system, LifecycleClocks, Outcome};
use crate::systems::movement::{mounted_follow_system, movement_system, DeltaTime, SimTick};
use crate::systems::sensory::{obstacle_cache_system, sensing_system};
use crate::systems::triggers::{footstep_system, trigger_system, FootstepClock};
use crate::systems::vitals::vitals_system;
use crate::terrain::{deployment_zone, generate_terrain, TerrainSnapshot, TerrainStats};
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use glam::Vec2;
use tracing::info;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Building the battlefield
/// - Stepping the simulation forward
/// - Driving player soldiers
/// - Extracting state snapshots
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated scaled time not yet consumed by fixed ticks.
    time_accumulator: f32,
    terrain: TerrainStats,
}

impl SimWorld {
    /// Build a battlefield from `config`: terrain, roads, starting units and dictators.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        let mut world = World::new();
        let mut rng = SimRng::from_config(&config);

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick(0));
        world.insert_resource(SpatialGrid::new(config.cell_size));
        world.insert_resource(Armory::standard());
        world.insert_resource(InfoChannel::default());
        world.insert_resource(PendingActions::default());
        world.insert_resource(PendingHits::default());
        world.insert_resource(Outcome::default());
        world.insert_resource(LifecycleClocks::from_config(&config));
        world.insert_resource(SoldierRoster::default());
        world.insert_resource(FootstepClock::default());
        world.insert_resource(config.clone());

        let terrain = generate_terrain(&mut world, &config, &mut rng.0)?;
        world.insert_resource(rng);

        for side in Side::BOTH {
            if let Some(size) = config.starting_unit {
                let center = deployment_zone(side, &config).center();
                spawn::spawn_unit(&mut world, side, size, center, spawn::side_heading(side))?;
            }
            if config.spawn_dictators {
                spawn::spawn_dictator(&mut world, side)?;
            }
        }

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                (inbox_flip_system, vitals_system, weapon_reload_system).chain(),
                (sensing_system, obstacle_cache_system).chain(),
                (command_ai_system, action_system).chain(),
                (movement_system, mounted_follow_system, spatial_grid_update_system).chain(),
                (bullet_flight_system, apply_hits_system).chain(),
                (footstep_system, trigger_system).chain(),
                (win_check_system, reinforcement_system, reap_system).chain(),
            )
                .chain(),
        );

        info!(
            width = config.world_width,
            height = config.world_height,
            soldiers = world.resource::<SoldierRoster>().issued(),
            "battlefield ready"
        );

        Ok(Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
            terrain,
        })
    }

    /// Step the simulation forward by `dt` wall-clock seconds.
    ///
    /// Returns the number of fixed ticks run.
    pub fn step(&mut self, dt: f32) -> usize {
        let (fixed_dt, coefficient) = {
            let config = self.world.resource::<SimConfig>();
            (config.fixed_timestep, config.time_coefficient)
        };
        if fixed_dt <= 0.0 {
            return 0;
        }
        self.time_accumulator += dt.max(0.0) * coefficient.max(0.0);

        let mut ticks = 0;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
            ticks += 1;
        }
        ticks
    }

    /// Run exactly one fixed tick.
    pub fn tick(&mut self) {
        let fixed_dt = self.world.resource::<SimConfig>().fixed_timestep;
        self.fixed_update(fixed_dt);
    }

    fn fixed_update(&mut self, dt: f32) {
        self.world.resource_mut::<DeltaTime>().0 = dt;
        self.world.resource_mut::<SimTick>().increment();
        self.schedule.run(&mut self.world);
        self.tick += 1;
        self.time += dt;
    }

    // ------------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------------

    /// Spawn a single soldier; `ai` attaches the command AI.
    pub fn spawn_soldier(&mut self, side: Side, rank: Rank, pos: Vec2, heading: f32, weapons: &[&str], ai: bool) -> SimResult<Entity> {
        spawn::spawn_soldier(&mut self.world, side, rank, pos, heading, weapons, ai)
    }

    pub fn spawn_unit(&mut self, side: Side, size: crate::config::UnitSize, center: Vec2, heading: f32) -> SimResult<Entity> {
        spawn::spawn_unit(&mut self.world, side, size, center, heading)
    }

    pub fn spawn_dictator(&mut self, side: Side) -> SimResult<Entity> {
        spawn::spawn_dictator(&mut self.world, side)
    }

    pub fn spawn_vehicle(&mut self, side: Side, pos: Vec2, heading: f32) -> SimResult<Entity> {
        spawn::spawn_vehicle(&mut self.world, side, pos, heading)
    }

    /// Put `commandee` under `leader`.
    pub fn attach(&mut self, leader: Entity, commandee: Entity) -> SimResult<()> {
        spawn::attach(&mut self.world, leader, commandee)
    }

    // ------------------------------------------------------------------------
    // Player control
    // ------------------------------------------------------------------------

    /// Hand `soldier` to a player: the command AI stops driving it.
    ///
    /// Panics if the soldier is already player-controlled.
    pub fn attach_player(&mut self, soldier: Entity) -> SimResult<()> {
        self.soldier(soldier)?;
        assert!(
            self.world.get::<PlayerControlled>(soldier).is_none(),
            "{soldier:?} is already player-controlled"
        );
        let mut entity = self.world.entity_mut(soldier);
        entity.remove::<AiBundle>();
        entity.insert(PlayerControlled);
        info!(?soldier, "player attached");
        Ok(())
    }

    /// Give `soldier` back to the command AI.
    pub fn detach_player(&mut self, soldier: Entity) -> SimResult<()> {
        let view = self.soldier(soldier)?;
        let config = self.world.resource::<SimConfig>().clone();
        let mut entity = self.world.entity_mut(soldier);
        if entity.take::<PlayerControlled>().is_some() {
            entity.insert(AiBundle {
                marker: AiControlled,
                brain: Brain::new(view.rank, config.leader_check_period, config.order_period, 0.0),
            });
            info!(?soldier, "player detached");
        }
        Ok(())
    }

    /// Execute one action for `actor` right now, outside the tick.
    pub fn perform(&mut self, actor: Entity, action: SoldierAction) -> SimResult<ActionOutcome> {
        self.world
            .resource_scope(|world, mut rng: Mut<SimRng>| actions::perform(world, actor, action, &mut rng.0))
    }

    /// Queue actions for `actor` to run during the next tick.
    pub fn submit_actions(&mut self, actor: Entity, list: impl IntoIterator<Item = SoldierAction>) -> SimResult<()> {
        if !self.world.entities().contains(actor) {
            return Err(SimError::InvalidReference(actor));
        }
        let mut pending = self.world.resource_mut::<PendingActions>();
        for action in list {
            pending.push(actor, action);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn soldier(&self, entity: Entity) -> SimResult<SoldierQuery> {
        SoldierQuery::fetch(&self.world, entity)
    }

    pub fn armor(&self, entity: Entity) -> SimResult<ArmorQuery> {
        ArmorQuery::fetch(&self.world, entity)
    }

    /// All soldiers, dead ones included, in id order.
    pub fn soldiers(&mut self) -> Vec<Entity> {
        let mut all: Vec<(SoldierId, Entity)> = self
            .world
            .query_filtered::<(&SoldierId, Entity), With<Soldier>>()
            .iter(&self.world)
            .map(|(id, entity)| (*id, entity))
            .collect();
        all.sort_unstable();
        all.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Living soldiers of `side`, dictators excluded.
    pub fn living(&mut self, side: Side) -> usize {
        self.world
            .query_filtered::<&Side, (With<Soldier>, Without<Dead>, Without<Dictator>)>()
            .iter(&self.world)
            .filter(|s| **s == side)
            .count()
    }

    pub fn outcome(&self) -> &Outcome {
        self.world.resource::<Outcome>()
    }

    pub fn team_won(&self, side: Side) -> bool {
        self.outcome().team_won(side)
    }

    /// Human-readable event messages since the last call.
    pub fn drain_info(&mut self) -> Vec<String> {
        self.world.resource_mut::<InfoChannel>().drain()
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> SimResult<String> {
        Ok(self.snapshot().to_json()?)
    }

    pub fn terrain_snapshot(&mut self) -> TerrainSnapshot {
        TerrainSnapshot::from_world(&mut self.world)
    }

    /// Counts from terrain generation.
    pub fn terrain_stats(&self) -> TerrainStats {
        self.terrain
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Elapsed simulation time in seconds.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}
