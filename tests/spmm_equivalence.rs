//! The distributed multiply against dense references.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use distgcn::*;
use distgcn::train::assemble_rows;
use ndarray::Array2;

fn distributed_multiply(
    edges: &[Edge],
    h: &Array2<f32>,
    p: usize,
    normalize: bool,
) -> Array2<f32> {
    let n = h.nrows();
    let shards = LocalGroup::run(p, |group| {
        let rank = group.rank();
        let adjacency = partition(edges, n, p, rank, normalize)?;
        let engine = SpmmEngine::new(adjacency, ReductionStrategy::AllReduce);
        let mut shard = shard_rows(h, engine.partition(), rank);
        let before = shard.clone();
        let z = engine.multiply(group, &mut Metrics::disabled(rank), &mut shard)?;
        assert_eq!(shard, before, "rank {} shard was modified", rank);
        Ok(z)
    })
    .unwrap();
    assemble_rows(&shards).unwrap()
}

#[test]
fn test_reference_graph_matches_dense_for_every_worker_count() {
    let edges = reference_edges();
    let h = reference_features();
    let expected = dense_adjacency(&edges, 6).t().dot(&h);

    for p in [1, 2, 3, 6] {
        let z = distributed_multiply(&edges, &h, p, false);
        assert_eq!(z.dim(), (6, 3));
        assert_abs_diff_eq!(z, expected, epsilon = 1e-5);
    }
}

#[test]
fn test_normalized_multiply_matches_dense() {
    let n = 10;
    let edges = normalization_edges();
    let mut degree = vec![0f32; n];
    for e in &edges {
        degree[e.src as usize] += 1.0;
    }
    let mut a = dense_adjacency(&edges, n);
    for ((u, v), w) in a.indexed_iter_mut() {
        *w /= degree[u].sqrt() * degree[v].sqrt();
    }
    let h = Array2::from_shape_fn((n, 4), |(i, k)| ((i * 7 + k * 3) % 11) as f32 / 11.0);
    let expected = a.t().dot(&h);

    for p in [1, 2, 3, 4] {
        let z = distributed_multiply(&edges, &h, p, true);
        assert_abs_diff_eq!(z, expected, epsilon = 1e-5);
    }
}

#[test]
fn test_random_graph_with_remainder_block() {
    let n = 23;
    let edges = random_unique_edges(n, 80, 7);
    let h = Array2::from_shape_fn((n, 5), |(i, k)| (i as f32 - k as f32) * 0.1);
    let expected = dense_adjacency(&edges, n).t().dot(&h);

    // P = 6 gives blocks of 4 with a last block of 3.
    for p in [1, 4, 5, 6] {
        let z = distributed_multiply(&edges, &h, p, false);
        assert_abs_diff_eq!(z, expected, epsilon = 1e-4);
    }

    // 6 * ceil(23 / 7) = 24 would leave rank 6 without rows.
    let err = partition(&edges, n, 7, 0, false).unwrap_err();
    assert_eq!(err.category(), "partition");
}

#[test]
fn test_empty_sub_blocks_contribute_nothing() {
    // Only vertex 0 has edges, so most sub-blocks are empty.
    let edges = vec![Edge::new(0, 0), Edge::new(0, 5)];
    let h = Array2::from_shape_fn((6, 2), |(i, k)| (i + k) as f32);
    let expected = dense_adjacency(&edges, 6).t().dot(&h);

    let z = distributed_multiply(&edges, &h, 3, false);
    assert_abs_diff_eq!(z, expected, epsilon = 1e-6);
}

fn gradient_products(
    edges: &[Edge],
    g: &Array2<f32>,
    p: usize,
    strategy: ReductionStrategy,
) -> Vec<Array2<f32>> {
    let n = g.nrows();
    LocalGroup::run(p, |group| {
        let rank = group.rank();
        let engine = SpmmEngine::new(partition(edges, n, p, rank, true)?, strategy);
        let shard = shard_rows(g, engine.partition(), rank);
        engine.gradient_product(group, &mut Metrics::disabled(rank), &shard)
    })
    .unwrap()
}

#[test]
fn test_gradient_product_matches_dense() {
    let edges = reference_edges();
    let g = reference_features();
    let n = 6;
    let mut degree = vec![0f32; n];
    for e in &edges {
        degree[e.src as usize] += 1.0;
    }
    let mut a = dense_adjacency(&edges, n);
    for ((u, v), w) in a.indexed_iter_mut() {
        *w /= degree[u].max(1.0).sqrt() * degree[v].max(1.0).sqrt();
    }
    let expected = a.dot(&g);

    for p in [1, 2, 3, 6] {
        let rows = gradient_products(&edges, &g, p, ReductionStrategy::AllReduce);
        assert_abs_diff_eq!(assemble_rows(&rows).unwrap(), expected, epsilon = 1e-5);
    }
}

#[test]
fn test_reduce_scatter_is_bit_identical_to_all_reduce() {
    let n = 23;
    let edges = random_unique_edges(n, 90, 11);
    let g = Array2::from_shape_fn((n, 4), |(i, k)| ((i * 13 + k) % 17) as f32 * 0.37 - 2.0);

    for p in [2, 3, 4] {
        let all = gradient_products(&edges, &g, p, ReductionStrategy::AllReduce);
        let scattered = gradient_products(&edges, &g, p, ReductionStrategy::ReduceScatter);
        assert_eq!(all, scattered, "P={}", p);
    }
}
