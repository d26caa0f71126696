use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rake_compress::{Batch, ContractionForest, ExecutionMode, ForestConfig, GhostToken};

fn bamboo(n: u32) -> Vec<u32> {
    (0..n).map(|i| i.saturating_sub(1)).collect()
}

fn binary_tree(n: u32) -> Vec<u32> {
    (0..n).map(|i| if i == 0 { 0 } else { (i - 1) / 2 }).collect()
}

fn config(mode: ExecutionMode) -> ForestConfig {
    ForestConfig { execution: mode, ..ForestConfig::default() }
}

const MODES: [(ExecutionMode, &str); 2] = [(ExecutionMode::Sequential, "sequential"), (ExecutionMode::Parallel, "parallel")];

fn bench_initialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("initialize");
    group.sample_size(20);

    for n in [1u32 << 12, 1 << 16] {
        for (shape, parents) in [("bamboo", bamboo(n)), ("binary", binary_tree(n))] {
            for (mode, name) in MODES {
                group.bench_with_input(BenchmarkId::new(format!("{shape}/{name}"), n), &parents, |b, parents| {
                    b.iter(|| {
                        GhostToken::new(|mut token| {
                            let forest = ContractionForest::initialize(&mut token, black_box(parents), config(mode)).unwrap();
                            black_box(forest.last_report().rounds)
                        })
                    });
                });
            }
        }
    }
    group.finish();
}

/// Cuts `k` evenly spaced edges and puts them back, so every iteration
/// starts from the same forest.
fn cut_and_restore(parents: &[u32], k: usize) -> (Batch, Batch) {
    let n = parents.len();
    let step = (n / k.max(1)).max(1);
    let mut cut = Batch::new();
    let mut restore = Batch::new();
    for c in (1..n).step_by(step) {
        cut = cut.delete(parents[c], c as u32);
        restore = restore.insert(parents[c], c as u32);
    }
    (cut, restore)
}

fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_batch");
    group.sample_size(20);
    let n = 1u32 << 16;

    for (shape, parents) in [("bamboo", bamboo(n)), ("binary", binary_tree(n))] {
        for k in [1usize, 64, 4096] {
            let (cut, restore) = cut_and_restore(&parents, k);
            for (mode, name) in MODES {
                GhostToken::new(|mut token| {
                    let mut forest = ContractionForest::initialize(&mut token, &parents, config(mode)).unwrap();
                    group.bench_function(BenchmarkId::new(format!("{shape}/{name}"), k), |b| {
                        b.iter(|| {
                            let down = forest.apply_batch(&mut token, black_box(&cut)).unwrap();
                            let up = forest.apply_batch(&mut token, black_box(&restore)).unwrap();
                            black_box(down + up)
                        });
                    });
                });
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_initialize, bench_apply_batch);
criterion_main!(benches);
