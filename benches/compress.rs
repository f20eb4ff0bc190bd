use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use hss::{bisection_cluster, compress, matvec, solve, Config};

fn random_matrix(m: usize, n: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((m, n), |_| rng.gen_range(-1.0..1.0))
}

fn diagonally_dominant(n: usize, seed: u64) -> Array2<f64> {
    let mut a = random_matrix(n, n, seed);
    for i in 0..n {
        let row_sum: f64 = (0..n).filter(|&j| j != i).map(|j| a[[i, j]].abs()).sum();
        a[[i, i]] = row_sum + 10.0;
    }
    a
}

fn compress_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compress");
    group.significance_level(0.05).sample_size(10);

    for &n in &[256usize, 512, 1024] {
        let a = diagonally_dominant(n, 0);
        let row_tree = bisection_cluster(0, n - 1, 32).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 32).unwrap();
        let config = Config::default().with_tol(1e-8).with_reltol(true);

        group.bench_function(format!("n={n}"), |b| {
            b.iter(|| compress(&a, &row_tree, &col_tree, &config).unwrap())
        });
    }

    group.finish();
}

fn matvec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("MatVec");
    group.significance_level(0.05).sample_size(20);

    for &n in &[256usize, 512, 1024] {
        let a = diagonally_dominant(n, 1);
        let row_tree = bisection_cluster(0, n - 1, 32).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 32).unwrap();
        let config = Config::default().with_tol(1e-8).with_reltol(true);
        let tree = compress(&a, &row_tree, &col_tree, &config).unwrap();
        let x = random_matrix(n, 4, 2);

        group.bench_function(format!("n={n}"), |b| b.iter(|| matvec(&tree, &x).unwrap()));
    }

    group.finish();
}

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Solve");
    group.significance_level(0.05).sample_size(10);

    for &n in &[256usize, 512, 1024] {
        let a = diagonally_dominant(n, 2);
        let row_tree = bisection_cluster(0, n - 1, 32).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 32).unwrap();
        let config = Config::default().with_tol(1e-10).with_reltol(true);
        let tree = compress(&a, &row_tree, &col_tree, &config).unwrap();
        let b = random_matrix(n, 4, 3);

        group.bench_function(format!("n={n}"), |b_iter| b_iter.iter(|| solve(&tree, &b).unwrap()));
    }

    group.finish();
}

criterion_group!(benches, compress_benchmark, matvec_benchmark, solve_benchmark);
criterion_main!(benches);
