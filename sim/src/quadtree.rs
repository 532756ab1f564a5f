//! Static quad-tree over immovable battlefield features.
//!
//! Trees, walls, foxholes and road segments are inserted once at generation time (foxholes
//! also when dug). Items whose bounds straddle a split line stay at the parent node, so an
//! item lives in exactly one node and removal never has to search more than one path.

use crate::error::SpatialError;
use crate::geometry::{point_segment_distance, segment_circle_intersects, segments_intersect, Rect};
use bevy_ecs::prelude::*;
use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticKind {
    Tree,
    Wall,
    Foxhole,
    Road,
}

/// Exact geometry of an indexed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { center: Vec2, radius: f32 },
    Segment { a: Vec2, b: Vec2, half_width: f32 },
}

impl Shape {
    pub fn bounds(&self) -> Rect {
        match *self {
            Shape::Circle { center, radius } => Rect::from_center(center, radius),
            Shape::Segment { a, b, half_width } => Rect::around_segment(a, b, half_width),
        }
    }

    /// Whether the segment `a`-`b`, thickened by `pad`, touches this shape.
    pub fn touches_segment(&self, a: Vec2, b: Vec2, pad: f32) -> bool {
        match *self {
            Shape::Circle { center, radius } => segment_circle_intersects(a, b, center, radius + pad),
            Shape::Segment { a: sa, b: sb, half_width } => {
                let reach = pad + half_width;
                segments_intersect(a, b, sa, sb)
                    || (reach > 0.0
                        && (point_segment_distance(sa, sb, a) <= reach
                            || point_segment_distance(sa, sb, b) <= reach
                            || point_segment_distance(a, b, sa) <= reach
                            || point_segment_distance(a, b, sb) <= reach))
            }
        }
    }
}

/// One indexed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticEntry {
    pub entity: Entity,
    pub kind: StaticKind,
    pub shape: Shape,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Rect,
    depth: usize,
    items: Vec<StaticEntry>,
    children: Option<Box<[Node; 4]>>,
}

impl Node {
    fn new(bounds: Rect, depth: usize) -> Self {
        Self {
            bounds,
            depth,
            items: Vec::new(),
            children: None,
        }
    }

    fn child_for(&mut self, rect: &Rect) -> Option<&mut Node> {
        self.children
            .as_mut()
            .and_then(|children| children.iter_mut().find(|c| c.bounds.contains_rect(rect)))
    }
}

/// Region quad-tree keyed by item bounds.
#[derive(Debug, Clone)]
pub struct QuadTree {
    root: Node,
    max_depth: usize,
    leaf_capacity: usize,
    /// Items a max-depth leaf may hold before insertion is refused.
    hard_limit: usize,
    len: usize,
}

impl QuadTree {
    pub fn new(bounds: Rect, max_depth: usize, leaf_capacity: usize) -> Result<Self, SpatialError> {
        if !bounds.is_finite() || bounds.size().min_element() <= 0.0 {
            return Err(SpatialError::Degenerate);
        }
        let leaf_capacity = leaf_capacity.max(1);
        Ok(Self {
            root: Node::new(bounds, 0),
            max_depth,
            leaf_capacity,
            hard_limit: leaf_capacity * 64,
            len: 0,
        })
    }

    pub fn bounds(&self) -> Rect {
        self.root.bounds
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an item. Fails instead of dropping it when its bounds are not finite, it lies
    /// outside the tree, or its leaf is saturated at maximum depth.
    pub fn insert(&mut self, entry: StaticEntry) -> Result<(), SpatialError> {
        let rect = entry.shape.bounds();
        if !rect.is_finite() {
            return Err(SpatialError::Degenerate);
        }
        if !self.root.bounds.contains_rect(&rect) {
            let c = rect.center();
            return Err(SpatialError::OutOfBounds { x: c.x, y: c.y });
        }
        Self::insert_into(&mut self.root, entry, rect, self.max_depth, self.leaf_capacity, self.hard_limit)?;
        self.len += 1;
        Ok(())
    }

    fn insert_into(
        node: &mut Node,
        entry: StaticEntry,
        rect: Rect,
        max_depth: usize,
        capacity: usize,
        hard_limit: usize,
    ) -> Result<(), SpatialError> {
        if let Some(child) = node.child_for(&rect) {
            return Self::insert_into(child, entry, rect, max_depth, capacity, hard_limit);
        }

        if node.children.is_none() && node.items.len() >= capacity && node.depth < max_depth {
            // Split and push down whatever fits entirely in a quadrant.
            let depth = node.depth + 1;
            let [a, b, c, d] = node.bounds.quadrants();
            node.children = Some(Box::new([
                Node::new(a, depth),
                Node::new(b, depth),
                Node::new(c, depth),
                Node::new(d, depth),
            ]));
            let items = std::mem::take(&mut node.items);
            for item in items {
                let item_rect = item.shape.bounds();
                match node.child_for(&item_rect) {
                    Some(child) => child.items.push(item),
                    None => node.items.push(item),
                }
            }
            if let Some(child) = node.child_for(&rect) {
                return Self::insert_into(child, entry, rect, max_depth, capacity, hard_limit);
            }
        }

        if node.depth >= max_depth && node.items.len() >= hard_limit {
            return Err(SpatialError::CellFull {
                depth: node.depth,
                items: node.items.len(),
            });
        }
        node.items.push(entry);
        Ok(())
    }

    /// Remove the item for `entity`. Returns whether it was present.
    pub fn remove(&mut self, entity: Entity, shape: &Shape) -> bool {
        let rect = shape.bounds();
        let mut node = &mut self.root;
        loop {
            if let Some(pos) = node.items.iter().position(|e| e.entity == entity) {
                node.items.swap_remove(pos);
                self.len -= 1;
                return true;
            }
            match node.child_for(&rect) {
                Some(child) => node = child,
                None => return false,
            }
        }
    }

    /// Replace the stored shape of `entity` (e.g. a foxhole that grew).
    pub fn update(&mut self, entry: StaticEntry, old_shape: &Shape) -> Result<(), SpatialError> {
        self.remove(entry.entity, old_shape);
        self.insert(entry)
    }

    /// All items whose bounds overlap `area`.
    pub fn query(&self, area: &Rect) -> Vec<StaticEntry> {
        let mut out = Vec::new();
        Self::query_node(&self.root, area, &mut out);
        out
    }

    fn query_node(node: &Node, area: &Rect, out: &mut Vec<StaticEntry>) {
        if !node.bounds.intersects(area) {
            return;
        }
        out.extend(node.items.iter().filter(|e| e.shape.bounds().intersects(area)).copied());
        if let Some(children) = &node.children {
            for child in children.iter() {
                Self::query_node(child, area, out);
            }
        }
    }

    /// Items of `kind` whose bounds overlap the square around `center`.
    pub fn query_at(&self, center: Vec2, radius: f32, kind: Option<StaticKind>) -> Vec<StaticEntry> {
        let mut found = self.query(&Rect::from_center(center, radius));
        if let Some(kind) = kind {
            found.retain(|e| e.kind == kind);
        }
        found
    }

    /// Items of `kind` actually touched by segment `a`-`b` widened by `pad`.
    pub fn along_segment(&self, a: Vec2, b: Vec2, pad: f32, kind: Option<StaticKind>) -> Vec<StaticEntry> {
        let mut found = self.query(&Rect::around_segment(a, b, pad));
        found.retain(|e| kind.map_or(true, |k| e.kind == k) && e.shape.touches_segment(a, b, pad));
        found
    }

    /// Whether any tree or wall crosses the sight line `a`-`b`.
    pub fn blocks_sight(&self, a: Vec2, b: Vec2) -> bool {
        self.query(&Rect::around_segment(a, b, 0.0))
            .iter()
            .filter(|e| matches!(e.kind, StaticKind::Tree | StaticKind::Wall))
            .any(|e| e.shape.touches_segment(a, b, 0.0))
    }
}

/// Resource wrapper for the static obstacle index.
#[derive(Resource, Debug, Clone)]
pub struct ObstacleIndex(pub QuadTree);
