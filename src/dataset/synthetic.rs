//! Built-in graphs for smoke tests and scaling runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{random_features, random_labels, random_train_mask, DatasetConfig, GraphData};
use crate::core::error::{GcnError, Result};
use crate::core::types::{ClassLabel, VertexId};
use crate::partition::Edge;

/// Undirected cycle over `config.num_vertices` vertices, stored as both
/// directions of every edge. Vertex `v` has label `v % num_classes`.
pub fn cycle(config: &DatasetConfig, seed: u64) -> Result<GraphData> {
    let n = config.num_vertices;
    if n < 2 {
        return Err(GcnError::dataset(format!("a cycle needs at least 2 vertices, got {}", n)));
    }

    let mut edges = Vec::with_capacity(2 * n);
    for v in 0..n {
        let next = (v + 1) % n;
        edges.push(Edge::new(v as VertexId, next as VertexId));
        edges.push(Edge::new(next as VertexId, v as VertexId));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let features = random_features(&mut rng, n, config.num_features);
    let labels = (0..n)
        .map(|v| (v % config.num_classes) as ClassLabel)
        .collect();
    let train_mask = random_train_mask(&mut rng, n, config.train_fraction);

    GraphData::new(n, config.num_classes, edges, features, labels, train_mask)
}

/// `config.num_edges` directed edges with endpoints drawn uniformly, plus
/// uniform features and labels.
pub fn random(config: &DatasetConfig, seed: u64) -> Result<GraphData> {
    let n = config.num_vertices;
    let mut rng = StdRng::seed_from_u64(seed);

    let edges = (0..config.num_edges)
        .map(|_| {
            let src = rng.gen_range(0..n) as VertexId;
            let dst = rng.gen_range(0..n) as VertexId;
            Edge::new(src, dst)
        })
        .collect();
    let features = random_features(&mut rng, n, config.num_features);
    let labels = random_labels(&mut rng, n, config.num_classes);
    let train_mask = random_train_mask(&mut rng, n, config.train_fraction);

    GraphData::new(n, config.num_classes, edges, features, labels, train_mask)
}
