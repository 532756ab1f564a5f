//! Procedural road network.
//!
//! Generation runs once per world:
//! 1. scatter graph nodes per terrain cell,
//! 2. link every node to its nearest neighbours,
//! 3. pick a sparse subset of significant nodes and pair each with its nearest
//!    significant neighbours,
//! 4. run A* for every pair, with edges already on the road network much cheaper
//!    than raw edges so later paths reuse earlier ones.
//!
//! Given the same nodes and significant set the result is identical: every container
//! that feeds iteration order is a `Vec` or `BTreeSet`.

use crate::config::RoadConfig;
use crate::error::RoadError;
use crate::geometry::Rect;
use glam::Vec2;
use rand::seq::index::sample;
use rand::Rng;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};
use tracing::debug;

/// Undirected edge, stored with the lower index first.
pub type Edge = (usize, usize);

#[inline]
fn edge(a: usize, b: usize) -> Edge {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Node graph the roads are searched on.
#[derive(Debug, Clone)]
pub struct RoadGraph {
    pub nodes: Vec<Vec2>,
    pub adjacency: Vec<BTreeSet<usize>>,
}

impl RoadGraph {
    /// Link each node to its nearest neighbours without letting any node exceed
    /// `degree` links. Nodes are filled in index order, so a node whose neighbours are
    /// already full may end up with fewer.
    pub fn k_nearest(nodes: Vec<Vec2>, degree: usize) -> Self {
        let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
        for (i, &p) in nodes.iter().enumerate() {
            let wanted = degree.saturating_sub(adjacency[i].len());
            if wanted == 0 {
                continue;
            }
            let open = (0..nodes.len()).filter(|&j| j != i && !adjacency[i].contains(&j) && adjacency[j].len() < degree);
            for j in nearest(&nodes, p, open, wanted) {
                adjacency[i].insert(j);
                adjacency[j].insert(i);
            }
        }
        Self { nodes, adjacency }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|n| n.len()).sum::<usize>() / 2
    }
}

/// The `k` candidates closest to `p`, ties broken by index.
fn nearest(nodes: &[Vec2], p: Vec2, candidates: impl Iterator<Item = usize>, k: usize) -> Vec<usize> {
    let mut ranked: Vec<(f32, usize)> = candidates.map(|j| (nodes[j].distance_squared(p), j)).collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked.into_iter().take(k).map(|(_, j)| j).collect()
}

/// Generated roads.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    pub nodes: Vec<Vec2>,
    pub significant: Vec<usize>,
    pub edges: BTreeSet<Edge>,
    /// Significant pairs no path was found for.
    pub unreachable_pairs: usize,
}

impl RoadNetwork {
    pub fn segments(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        self.edges.iter().map(|&(a, b)| (self.nodes[a], self.nodes[b]))
    }

    pub fn total_length(&self) -> f32 {
        self.segments().map(|(a, b)| a.distance(b)).sum()
    }
}

/// Scatter `nodes_per_cell` nodes uniformly in every cell of `bounds`.
pub fn scatter_nodes(bounds: Rect, config: &RoadConfig, rng: &mut impl Rng) -> Result<Vec<Vec2>, RoadError> {
    let size = bounds.size();
    let cell = config.node_cell_size.max(1.0);
    if size.x < cell || size.y < cell {
        return Err(RoadError::AreaTooSmall {
            width: size.x,
            height: size.y,
        });
    }
    let cols = (size.x / cell).floor() as usize;
    let rows = (size.y / cell).floor() as usize;

    let mut nodes = Vec::with_capacity(cols * rows * config.nodes_per_cell);
    for row in 0..rows {
        for col in 0..cols {
            let origin = bounds.min + Vec2::new(col as f32 * cell, row as f32 * cell);
            for _ in 0..config.nodes_per_cell {
                nodes.push(origin + Vec2::new(rng.gen_range(0.0..cell), rng.gen_range(0.0..cell)));
            }
        }
    }
    Ok(nodes)
}

/// Pick the significant subset, returned in ascending index order.
pub fn pick_significant(node_count: usize, fraction: f32, rng: &mut impl Rng) -> Result<Vec<usize>, RoadError> {
    let wanted = ((node_count as f32 * fraction).ceil() as usize).min(node_count);
    if wanted < 2 {
        return Err(RoadError::TooFewSignificantNodes(wanted));
    }
    let mut picked = sample(rng, node_count, wanted).into_vec();
    picked.sort_unstable();
    Ok(picked)
}

/// Pair every significant node with its `degree` nearest significant neighbours.
pub fn significant_pairs(nodes: &[Vec2], significant: &[usize], degree: usize) -> BTreeSet<Edge> {
    let mut pairs = BTreeSet::new();
    for &s in significant {
        let others = significant.iter().copied().filter(|&o| o != s);
        for o in nearest(nodes, nodes[s], others, degree) {
            pairs.insert(edge(s, o));
        }
    }
    pairs
}

/// Total-ordered path cost for the open set.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cost(f32);

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Cost of walking edge `a`-`b` given the roads built so far.
pub fn edge_cost(graph: &RoadGraph, roads: &BTreeSet<Edge>, a: usize, b: usize, config: &RoadConfig) -> f32 {
    if roads.contains(&edge(a, b)) {
        config.road_edge_cost
    } else {
        config.raw_edge_base_cost + graph.nodes[a].distance(graph.nodes[b]).sqrt()
    }
}

/// A* from `start` to `goal`. Returns the node sequence, both ends included.
///
/// The heuristic is the cheapest possible single edge for any node but the goal, which
/// keeps it admissible under the road discount. Always terminates: each node is
/// settled at most once.
pub fn find_path(
    graph: &RoadGraph,
    roads: &BTreeSet<Edge>,
    start: usize,
    goal: usize,
    config: &RoadConfig,
) -> Option<Vec<usize>> {
    if start >= graph.len() || goal >= graph.len() {
        return None;
    }
    let floor = config.road_edge_cost.min(config.raw_edge_base_cost).max(0.0);
    let heuristic = |n: usize| if n == goal { 0.0 } else { floor };

    let mut best = vec![f32::INFINITY; graph.len()];
    let mut prev: Vec<Option<usize>> = vec![None; graph.len()];
    let mut settled = vec![false; graph.len()];
    best[start] = 0.0;

    let mut heap: BinaryHeap<Reverse<(Cost, usize)>> = BinaryHeap::new();
    heap.push(Reverse((Cost(heuristic(start)), start)));

    while let Some(Reverse((_, index))) = heap.pop() {
        if settled[index] {
            continue;
        }
        settled[index] = true;

        if index == goal {
            let mut path = vec![goal];
            let mut cursor = goal;
            while let Some(p) = prev[cursor] {
                path.push(p);
                cursor = p;
            }
            path.reverse();
            return Some(path);
        }

        for &neighbor in &graph.adjacency[index] {
            if settled[neighbor] {
                continue;
            }
            let new_cost = best[index] + edge_cost(graph, roads, index, neighbor, config);
            if new_cost < best[neighbor] {
                best[neighbor] = new_cost;
                prev[neighbor] = Some(index);
                heap.push(Reverse((Cost(new_cost + heuristic(neighbor)), neighbor)));
            }
        }
    }
    None
}

/// Build roads over an already placed node set.
pub fn connect(graph: &RoadGraph, significant: &[usize], config: &RoadConfig) -> Result<RoadNetwork, RoadError> {
    if significant.len() < 2 {
        return Err(RoadError::TooFewSignificantNodes(significant.len()));
    }
    let mut edges = BTreeSet::new();
    let mut unreachable_pairs = 0;

    for (from, to) in significant_pairs(&graph.nodes, significant, config.significant_degree) {
        match find_path(graph, &edges, from, to, config) {
            Some(path) => {
                for step in path.windows(2) {
                    edges.insert(edge(step[0], step[1]));
                }
            }
            None => {
                debug!(from, to, "no road between significant nodes");
                unreachable_pairs += 1;
            }
        }
    }

    Ok(RoadNetwork {
        nodes: graph.nodes.clone(),
        significant: significant.to_vec(),
        edges,
        unreachable_pairs,
    })
}

/// Full generation over `bounds`.
pub fn generate(bounds: Rect, config: &RoadConfig, rng: &mut impl Rng) -> Result<RoadNetwork, RoadError> {
    let nodes = scatter_nodes(bounds, config, rng)?;
    let significant = pick_significant(nodes.len(), config.significant_fraction, rng)?;
    let graph = RoadGraph::k_nearest(nodes, config.node_degree);
    connect(&graph, &significant, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn line_graph() -> RoadGraph {
        // 0 - 1 - 2 - 3 along x, plus a long detour 0 - 4 - 3
        let nodes = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(30.0, 0.0),
            Vec2::new(15.0, 40.0),
        ];
        let mut adjacency = vec![BTreeSet::new(); nodes.len()];
        for (a, b) in [(0, 1), (1, 2), (2, 3), (0, 4), (4, 3)] {
            adjacency[a].insert(b);
            adjacency[b].insert(a);
        }
        RoadGraph { nodes, adjacency }
    }

    #[test]
    fn test_astar_prefers_existing_roads() {
        let graph = line_graph();
        let config = RoadConfig::default();
        let path = find_path(&graph, &BTreeSet::new(), 0, 3, &config).unwrap();
        // Two raw edges (~10+6.4 each) beat three raw edges (~10+3.2 each).
        assert_eq!(path, vec![0, 4, 3]);

        let mut roads = BTreeSet::new();
        roads.insert(edge(0, 1));
        roads.insert(edge(1, 2));
        roads.insert(edge(2, 3));
        let path = find_path(&graph, &roads, 0, 3, &config).unwrap();
        assert_eq!(path, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_astar_terminates_on_disconnected_graph() {
        let mut graph = line_graph();
        graph.nodes.push(Vec2::new(500.0, 500.0));
        graph.adjacency.push(BTreeSet::new());
        assert!(find_path(&graph, &BTreeSet::new(), 0, 5, &RoadConfig::default()).is_none());

        let network = connect(&graph, &[0, 5], &RoadConfig::default()).unwrap();
        assert!(network.edges.is_empty());
        assert_eq!(network.unreachable_pairs, 1);
    }

    #[test]
    fn test_node_degree_is_capped() {
        // A tight cluster plus one outlier: everyone wants the cluster.
        let mut nodes: Vec<Vec2> = (0..6).map(|i| Vec2::new(i as f32, (i % 2) as f32)).collect();
        nodes.push(Vec2::new(100.0, 0.0));
        let graph = RoadGraph::k_nearest(nodes, 3);
        assert!(graph.adjacency.iter().all(|links| links.len() <= 3));
        for (i, links) in graph.adjacency.iter().enumerate() {
            for &j in links {
                assert!(graph.adjacency[j].contains(&i));
            }
        }
        assert!(graph.edge_count() > 0);
    }

    #[test]
    fn test_too_few_significant_nodes() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            pick_significant(3, 0.1, &mut rng).unwrap_err(),
            RoadError::TooFewSignificantNodes(1)
        );
        let graph = line_graph();
        assert!(connect(&graph, &[2], &RoadConfig::default()).is_err());
    }

    #[test]
    fn test_area_too_small() {
        let mut rng = StdRng::seed_from_u64(1);
        let bounds = Rect::new(Vec2::ZERO, Vec2::new(50.0, 50.0));
        let err = scatter_nodes(bounds, &RoadConfig::default(), &mut rng).unwrap_err();
        assert!(matches!(err, RoadError::AreaTooSmall { .. }));
    }

    #[test]
    fn test_generation_is_reproducible() {
        let bounds = Rect::new(Vec2::ZERO, Vec2::new(600.0, 480.0));
        let config = RoadConfig::default();
        let a = generate(bounds, &config, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = generate(bounds, &config, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a.edges, b.edges);
        assert!(!a.edges.is_empty());
        for (p, q) in a.segments() {
            assert!(bounds.contains_point(p) && bounds.contains_point(q));
        }
    }
}
