//! Shared fixtures for the distgcn integration tests.
#![allow(dead_code)]

use distgcn::*;
use ndarray::{s, Array2};
use rand::prelude::*;
use std::collections::BTreeSet;

/// Weighted edges of the 6-vertex reference graph.
pub fn reference_edges() -> Vec<Edge> {
    vec![
        Edge::weighted(0, 1, 1.0),
        Edge::weighted(0, 4, 0.5),
        Edge::weighted(1, 2, 2.0),
        Edge::weighted(2, 0, 1.5),
        Edge::weighted(2, 5, 1.0),
        Edge::weighted(3, 3, 1.0),
        Edge::weighted(3, 1, -1.0),
        Edge::weighted(4, 5, 0.25),
        Edge::weighted(5, 0, 3.0),
        Edge::weighted(5, 2, 1.0),
        Edge::weighted(1, 4, 0.75),
    ]
}

/// Feature matrix paired with [`reference_edges`].
pub fn reference_features() -> Array2<f32> {
    Array2::from_shape_fn((6, 3), |(i, k)| (i as f32 + 1.0) * 0.5 - k as f32 * 0.25)
}

/// Edges of the fixed 10-vertex graph used for normalization checks. Every
/// vertex has at least one outgoing edge.
pub fn normalization_edges() -> Vec<Edge> {
    let pairs = [
        (0, 1), (0, 2), (0, 5),
        (1, 0), (1, 3),
        (2, 0), (2, 4), (2, 7), (2, 9),
        (3, 1),
        (4, 2), (4, 8),
        (5, 0), (5, 6),
        (6, 5), (6, 7),
        (7, 2), (7, 6), (7, 8),
        (8, 4), (8, 7),
        (9, 2),
    ];
    pairs.iter().map(|&(u, v)| Edge::new(u, v)).collect()
}

/// Dense `N × N` matrix of an edge list, summing duplicates.
pub fn dense_adjacency(edges: &[Edge], n: usize) -> Array2<f32> {
    let mut a = Array2::zeros((n, n));
    for e in edges {
        a[[e.src as usize, e.dst as usize]] += e.weight;
    }
    a
}

/// `m` distinct random edges over `n` vertices.
pub fn random_unique_edges(n: usize, m: usize, seed: u64) -> Vec<Edge> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = BTreeSet::new();
    let limit = m.min(n * n);
    while seen.len() < limit {
        seen.insert((rng.gen_range(0..n as u64), rng.gen_range(0..n as u64)));
    }
    seen.into_iter().map(|(u, v)| Edge::new(u, v)).collect()
}

/// Rows of `matrix` owned by `rank`.
pub fn shard_rows(matrix: &Array2<f32>, partition: &VertexPartition, rank: usize) -> Array2<f32> {
    matrix.slice(s![partition.block_range(rank), ..]).to_owned()
}

/// A random graph with random features and labels.
pub fn random_graph(n: usize, m: usize, features: usize, classes: usize, seed: u64) -> GraphData {
    let mut rng = StdRng::seed_from_u64(seed);
    let edges = random_unique_edges(n, m, seed);
    let x = Array2::from_shape_simple_fn((n, features), || rng.gen::<f32>());
    let labels = (0..n).map(|_| rng.gen_range(0..classes as i64)).collect();
    GraphData::new(n, classes, edges, x, labels, vec![true; n]).unwrap()
}

/// Configuration for an in-process run.
pub fn local_config(world_size: usize, epochs: usize, hidden: usize) -> ConfigBuilder {
    ConfigBuilder::new()
        .world_size(world_size)
        .epochs(epochs)
        .graph_name("fixture")
        .enable_timing(false)
        .hidden_layer_width(hidden)
}
