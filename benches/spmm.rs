use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use distgcn::{
    partition, CommunicationGroup, CooMatrix, Edge, LocalGroup, Metrics, ReductionStrategy,
    SpmmEngine,
};
use ndarray::{s, Array2};
use rand::prelude::*;

fn random_edges(n: usize, m: usize, seed: u64) -> Vec<Edge> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..m)
        .map(|_| Edge::new(rng.gen_range(0..n as u64), rng.gen_range(0..n as u64)))
        .collect()
}

fn bench_local_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("coo_kernel");
    let n = 4096;
    let width = 64;

    let mut block = CooMatrix::new(n, n);
    for e in random_edges(n, 8 * n, 1) {
        block.push(e.src as usize, e.dst as usize, e.weight).unwrap();
    }
    block.coalesce();
    let rhs = Array2::<f32>::ones((n, width));

    group.bench_function("transpose_multiply", |b| {
        b.iter(|| {
            let mut out = Array2::<f32>::zeros((n, width));
            block.spmm_t_acc(black_box(rhs.view()), out.view_mut()).unwrap();
            black_box(out)
        })
    });
    group.bench_function("multiply", |b| {
        b.iter(|| {
            let mut out = Array2::<f32>::zeros((n, width));
            block.spmm_acc(black_box(rhs.view()), out.view_mut()).unwrap();
            black_box(out)
        })
    });

    group.finish();
}

fn bench_broadcast_multiply(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_spmm");
    group.sample_size(20);
    let n = 2048;
    let width = 32;
    let edges = random_edges(n, 8 * n, 2);
    let h = Array2::<f32>::from_elem((n, width), 0.5);

    for p in [1usize, 2, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(p), &p, |b, &p| {
            b.iter(|| {
                LocalGroup::run(p, |comm| {
                    let rank = comm.rank();
                    let engine = SpmmEngine::new(
                        partition(&edges, n, p, rank, true)?,
                        ReductionStrategy::AllReduce,
                    );
                    let range = engine.partition().block_range(rank);
                    let mut shard = h.slice(s![range, ..]).to_owned();
                    engine.multiply(comm, &mut Metrics::disabled(rank), &mut shard)
                })
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_local_kernel, bench_broadcast_multiply);
criterion_main!(benches);
