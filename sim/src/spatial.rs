//! Spatial partitioning for efficient neighbor queries.
//!
//! Provides O(1) cell lookup and O(k) neighbor queries where k is the number
//! of bodies in nearby cells, rather than O(n) for brute force.
//!
//! The grid is updated incrementally: a body that stays in its cell is patched in
//! place, so repeated updates within one tick never leave duplicate entries. Dead
//! bodies stay indexed (flagged) until the reap sweep removes them.

use crate::components::*;
use crate::error::SpatialError;
use bevy_ecs::prelude::*;
use glam::Vec2;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Soldier,
    Vehicle,
}

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub pos: Vec2,
    pub side: Side,
    pub radius: f32,
    pub kind: BodyKind,
    pub alive: bool,
}

/// Grid-based spatial partitioning of soldiers and vehicles.
///
/// Divides the world into cells and tracks which bodies are in each cell.
/// Enables fast neighbor queries by only checking nearby cells.
#[derive(Resource, Debug)]
pub struct SpatialGrid {
    /// Cell size in world units.
    pub cell_size: f32,
    /// Map from cell coordinates to the bodies in that cell.
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    /// Reverse lookup: entity to cell.
    entity_cells: HashMap<Entity, (i32, i32)>,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(40.0)
    }
}

impl SpatialGrid {
    /// Create a new spatial grid with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
            entity_cells: HashMap::new(),
        }
    }

    /// Convert world coordinates to cell coordinates.
    #[inline]
    pub fn world_to_cell(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    /// Insert a body, or move it if already present. Non-finite positions are refused
    /// and leave any existing entry untouched.
    pub fn insert(&mut self, entry: SpatialEntry) -> Result<(), SpatialError> {
        if !entry.pos.is_finite() {
            return Err(SpatialError::OutOfBounds {
                x: entry.pos.x,
                y: entry.pos.y,
            });
        }
        let cell = self.world_to_cell(entry.pos);

        if let Some(&old_cell) = self.entity_cells.get(&entry.entity) {
            if old_cell == cell {
                if let Some(slot) = self
                    .cells
                    .get_mut(&cell)
                    .and_then(|entries| entries.iter_mut().find(|e| e.entity == entry.entity))
                {
                    *slot = entry;
                    return Ok(());
                }
            } else {
                self.detach(entry.entity, old_cell);
            }
        }

        self.cells.entry(cell).or_default().push(entry);
        self.entity_cells.insert(entry.entity, cell);
        Ok(())
    }

    /// Move an indexed body to `pos`.
    pub fn update(&mut self, entity: Entity, pos: Vec2) -> Result<(), SpatialError> {
        match self.get(entity) {
            Some(mut entry) => {
                entry.pos = pos;
                self.insert(entry)
            }
            None => Ok(()),
        }
    }

    fn detach(&mut self, entity: Entity, cell: (i32, i32)) {
        if let Some(entries) = self.cells.get_mut(&cell) {
            entries.retain(|e| e.entity != entity);
            if entries.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Remove a body from the grid.
    pub fn remove(&mut self, entity: Entity) -> bool {
        match self.entity_cells.remove(&entity) {
            Some(cell) => {
                self.detach(entity, cell);
                true
            }
            None => false,
        }
    }

    /// Flag a body as dead without unindexing it.
    pub fn mark_dead(&mut self, entity: Entity) {
        if let Some(cell) = self.entity_cells.get(&entity) {
            if let Some(entry) = self
                .cells
                .get_mut(cell)
                .and_then(|entries| entries.iter_mut().find(|e| e.entity == entity))
            {
                entry.alive = false;
            }
        }
    }

    pub fn get(&self, entity: Entity) -> Option<SpatialEntry> {
        let cell = self.entity_cells.get(&entity)?;
        self.cells.get(cell)?.iter().find(|e| e.entity == entity).copied()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entity_cells.contains_key(&entity)
    }

    /// Query all bodies, dead or alive, within `radius` of `center`.
    /// Returns entries sorted by distance (closest first).
    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<SpatialEntry> {
        let radius_sq = radius * radius;
        let cells_to_check = (radius / self.cell_size).ceil() as i32 + 1;
        let center_cell = self.world_to_cell(center);

        let mut results = Vec::new();

        for dx in -cells_to_check..=cells_to_check {
            for dy in -cells_to_check..=cells_to_check {
                let cell = (center_cell.0 + dx, center_cell.1 + dy);
                if let Some(entries) = self.cells.get(&cell) {
                    results.extend(
                        entries
                            .iter()
                            .filter(|e| e.pos.distance_squared(center) <= radius_sq)
                            .copied(),
                    );
                }
            }
        }

        results.sort_by(|a, b| {
            a.pos
                .distance_squared(center)
                .total_cmp(&b.pos.distance_squared(center))
        });
        results
    }

    /// Living bodies within radius.
    pub fn query_living(&self, center: Vec2, radius: f32) -> Vec<SpatialEntry> {
        let mut results = self.query_radius(center, radius);
        results.retain(|e| e.alive);
        results
    }

    /// Living bodies of the other side within radius.
    pub fn query_enemies(&self, center: Vec2, radius: f32, my_side: Side) -> Vec<SpatialEntry> {
        let mut results = self.query_living(center, radius);
        results.retain(|e| e.side != my_side);
        results
    }

    /// Living bodies of the same side within radius.
    pub fn query_friendlies(&self, center: Vec2, radius: f32, my_side: Side) -> Vec<SpatialEntry> {
        let mut results = self.query_living(center, radius);
        results.retain(|e| e.side == my_side);
        results
    }

    /// Get the nearest living enemy to a position.
    pub fn nearest_enemy(&self, center: Vec2, max_radius: f32, my_side: Side) -> Option<SpatialEntry> {
        self.query_enemies(center, max_radius, my_side).into_iter().next()
    }

    /// Get count of bodies in a cell.
    pub fn cell_count(&self, cell: (i32, i32)) -> usize {
        self.cells.get(&cell).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total body count.
    pub fn total_count(&self) -> usize {
        self.entity_cells.len()
    }
}

/// System that re-indexes moved bodies.
///
/// Mounted soldiers are unindexed; the vehicle carrying them stands in for them.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    soldiers: Query<(Entity, &Position, &Side, &Physique, Has<Dead>, Has<Mounted>), With<Soldier>>,
    vehicles: Query<(Entity, &Position, &Side, &Physique, Has<Dead>), With<Armor>>,
) {
    let bodies = soldiers
        .iter()
        .map(|(e, pos, side, physique, dead, mounted)| (e, pos, side, physique, dead, mounted, BodyKind::Soldier))
        .chain(
            vehicles
                .iter()
                .map(|(e, pos, side, physique, dead)| (e, pos, side, physique, dead, false, BodyKind::Vehicle)),
        );

    for (entity, pos, side, physique, dead, mounted, kind) in bodies {
        if mounted {
            grid.remove(entity);
            continue;
        }
        let entry = SpatialEntry {
            entity,
            pos: pos.0,
            side: *side,
            radius: physique.radius,
            kind,
            alive: !dead,
        };
        if let Err(err) = grid.insert(entry) {
            warn!(?entity, %err, "dropping body from spatial grid");
            grid.remove(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(id: u32, x: f32, y: f32, side: Side) -> SpatialEntry {
        SpatialEntry {
            entity: Entity::from_raw(id),
            pos: Vec2::new(x, y),
            side,
            radius: 0.5,
            kind: BodyKind::Soldier,
            alive: true,
        }
    }

    #[test]
    fn test_spatial_grid_insert_query() {
        let mut grid = SpatialGrid::new(10.0);

        grid.insert(body(1, 5.0, 5.0, Side::Blue)).unwrap();
        grid.insert(body(2, 15.0, 5.0, Side::Blue)).unwrap();
        grid.insert(body(3, 100.0, 100.0, Side::Red)).unwrap();

        assert_eq!(grid.query_radius(Vec2::new(5.0, 5.0), 15.0).len(), 2);
        assert_eq!(grid.query_radius(Vec2::new(5.0, 5.0), 5.0).len(), 1);
        assert_eq!(grid.query_radius(Vec2::new(100.0, 100.0), 10.0).len(), 1);
    }

    #[test]
    fn test_repeated_updates_never_duplicate() {
        let mut grid = SpatialGrid::new(10.0);
        let e = Entity::from_raw(7);
        grid.insert(body(7, 1.0, 1.0, Side::Blue)).unwrap();
        for step in 0..30 {
            // Mix of same-cell and cross-cell moves
            grid.update(e, Vec2::new(1.0 + step as f32 * 0.7, 1.0)).unwrap();
            grid.update(e, Vec2::new(1.0 + step as f32 * 0.7, 1.0)).unwrap();
        }
        assert_eq!(grid.total_count(), 1);
        let hits: Vec<_> = grid
            .query_radius(Vec2::new(10.0, 1.0), 100.0)
            .into_iter()
            .filter(|h| h.entity == e)
            .collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_non_finite_position_is_refused() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(body(1, 5.0, 5.0, Side::Blue)).unwrap();
        let err = grid.update(Entity::from_raw(1), Vec2::new(f32::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, SpatialError::OutOfBounds { .. }));
        // Old entry survives.
        assert_eq!(grid.get(Entity::from_raw(1)).unwrap().pos, Vec2::new(5.0, 5.0));
    }

    #[test]
    fn test_dead_bodies_stay_indexed_but_are_not_enemies() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(body(1, 0.0, 0.0, Side::Blue)).unwrap();
        grid.insert(body(2, 5.0, 0.0, Side::Red)).unwrap();
        grid.mark_dead(Entity::from_raw(2));

        assert_eq!(grid.query_radius(Vec2::ZERO, 20.0).len(), 2);
        assert!(grid.query_enemies(Vec2::ZERO, 20.0, Side::Blue).is_empty());
        assert!(grid.remove(Entity::from_raw(2)));
        assert_eq!(grid.total_count(), 1);
    }

    #[test]
    fn test_nearest_enemy() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(body(1, 0.0, 0.0, Side::Blue)).unwrap();
        grid.insert(body(2, 30.0, 0.0, Side::Red)).unwrap();
        grid.insert(body(3, 20.0, 0.0, Side::Red)).unwrap();

        let nearest = grid.nearest_enemy(Vec2::ZERO, 50.0, Side::Blue).unwrap();
        assert_eq!(nearest.entity, Entity::from_raw(3));
        assert_eq!(grid.query_friendlies(Vec2::ZERO, 50.0, Side::Blue).len(), 1);
    }

    #[test]
    fn test_update_system_unindexes_mounted() {
        let mut world = World::new();
        world.insert_resource(SpatialGrid::new(10.0));
        let physique = Physique {
            radius: 0.5,
            max_speed: 5.0,
            max_acceleration: 10.0,
            fov: 2.0,
        };
        let walker = world
            .spawn((Soldier, Position::new(1.0, 1.0), Side::Blue, physique))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(spatial_grid_update_system);
        schedule.run(&mut world);
        assert!(world.resource::<SpatialGrid>().contains(walker));

        world.entity_mut(walker).insert(Mounted {
            vehicle: Entity::from_raw(99),
            seat: Seat::Driver,
            stowed: Loadout::default(),
            stowed_fov: 2.0,
        });
        schedule.run(&mut world);
        assert!(!world.resource::<SpatialGrid>().contains(walker));
    }
}
