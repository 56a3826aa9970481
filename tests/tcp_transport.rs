//! Collectives and training over loopback TCP agree with the in-process group.

mod common;

use common::*;
use distgcn::*;
use ndarray::Array2;
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

/// Bind `size` loopback listeners, build the mesh on one thread per rank and
/// run `worker` on each endpoint.
fn run_tcp<T, F>(size: usize, worker: F) -> Vec<T>
where
    T: Send,
    F: Fn(&TcpGroup) -> Result<T> + Sync,
{
    let listeners: Vec<TcpListener> = (0..size)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let peers: Vec<SocketAddr> = listeners.iter().map(|l| l.local_addr().unwrap()).collect();
    let peers = &peers;
    let worker = &worker;

    thread::scope(|scope| {
        let handles: Vec<_> = listeners
            .into_iter()
            .enumerate()
            .map(|(rank, listener)| {
                scope.spawn(move || {
                    let group =
                        TcpGroup::establish(rank, listener, peers, Duration::from_secs(10))?;
                    assert_eq!(group.rank(), rank);
                    assert_eq!(group.size(), size);
                    worker(&group)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    })
}

fn exercise_collectives<G: CommunicationGroup + ?Sized>(group: &G) -> Result<Vec<Array2<f32>>> {
    let rank = group.rank() as f32;
    let mut outputs = Vec::new();

    let mut shared = Array2::from_elem((2, 3), rank);
    group.broadcast(&mut shared, group.size() - 1)?;
    outputs.push(shared);

    let mut summed = Array2::from_shape_fn((3, 2), |(i, j)| rank * 0.1 + (i * 2 + j) as f32);
    group.all_reduce(&mut summed, ReduceOp::Sum)?;
    outputs.push(summed);

    let mut largest = Array2::from_shape_fn((1, 4), |(_, j)| (rank - j as f32).abs());
    group.all_reduce(&mut largest, ReduceOp::Max)?;
    outputs.push(largest);

    let partial = Array2::from_shape_fn((7, 2), |(i, j)| rank * 1.5 - (i + j) as f32 * 0.3);
    let boundaries: Vec<usize> = match group.size() {
        1 => vec![0, 7],
        2 => vec![0, 4, 7],
        _ => vec![0, 3, 6, 7],
    };
    outputs.push(group.reduce_scatter(&partial, &boundaries)?);

    group.barrier()?;
    Ok(outputs)
}

#[test]
fn test_collectives_match_local_group() {
    let over_tcp = run_tcp(3, |group| exercise_collectives(group));
    let in_process = LocalGroup::run(3, |group| exercise_collectives(group)).unwrap();
    assert_eq!(over_tcp, in_process);

    for outputs in &over_tcp {
        assert!(outputs[0].iter().all(|&v| v == 2.0));
        assert_eq!(outputs[3].ncols(), 2);
    }
}

#[test]
fn test_distributed_multiply_over_tcp() {
    let edges = reference_edges();
    let h = reference_features();
    let expected = dense_adjacency(&edges, 6).t().dot(&h);

    let shards = run_tcp(2, |group| {
        let rank = group.rank();
        let engine = SpmmEngine::new(partition(&edges, 6, 2, rank, false)?, ReductionStrategy::ReduceScatter);
        let mut shard = shard_rows(&h, engine.partition(), rank);
        engine.multiply(group, &mut Metrics::disabled(rank), &mut shard)
    });
    let z = train::assemble_rows(&shards).unwrap();
    approx::assert_abs_diff_eq!(z, expected, epsilon = 1e-5);
}

#[test]
fn test_training_over_tcp_matches_local_run() {
    let data = random_graph(14, 50, 3, 3, 8);
    let config = local_config(3, 2, 4)
        .enable_degree_normalization(true)
        .equation1_reduction(ReductionStrategy::ReduceScatter)
        .build()
        .unwrap();

    let over_tcp = run_tcp(3, |group| run_worker(group, &data, &config));
    let in_process =
        LocalGroup::run(3, |group| run_worker(group, &data, &config)).unwrap();

    for (a, b) in over_tcp.iter().zip(&in_process) {
        assert_eq!(a.rank, b.rank);
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.losses, b.losses);
        assert_eq!(a.output, b.output);
    }
}

#[test]
fn test_connect_times_out_without_peers() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let own = listener.local_addr().unwrap();
    // Rank 0 waits for rank 1 to dial in, which never happens.
    let unused = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

    let err = TcpGroup::establish(0, listener, &[own, unused], Duration::from_millis(200))
        .unwrap_err();
    assert_eq!(err.category(), "communication");
}
