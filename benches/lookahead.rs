use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::ThreadPoolBuilder;
use std::hint::black_box;
use threes::engine::{Board, Tile};
use threes::search::{BestTracker, Evaluator, Lookahead, Weights};

const DEPTH: usize = 5;

fn setup() -> (Vec<Tile>, Board) {
    let mut rng = StdRng::seed_from_u64(7777);
    let seq: Vec<Tile> = (0..200).map(|_| rng.gen_range(1..=3)).collect();
    let board = Board::new([1, 2, 0, 3, 0, 3, 1, 0, 2, 0, 0, 1, 0, 3, 0, 2]).unwrap();
    (seq, board)
}

fn bench_lookahead(c: &mut Criterion) {
    let (seq, board) = setup();
    let ev = Evaluator::new(Weights::DEFAULT, Weights::CLOSE, DEPTH, seq.len());
    // Pin a small pool for stability
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();

    c.bench_function("lookahead/sequential", |bch| {
        bch.iter(|| {
            let tracker = BestTracker::new();
            let exp = Lookahead::new(&seq, &ev, DEPTH, &tracker).explore(&board, 8);
            black_box(exp.nodes)
        })
    });

    c.bench_function("lookahead/parallel", |bch| {
        bch.iter(|| {
            let tracker = BestTracker::new();
            let exp = Lookahead::new(&seq, &ev, DEPTH, &tracker).explore_parallel(&board, 8, &pool);
            black_box(exp.nodes)
        })
    });
}

criterion_group!(lookahead, bench_lookahead);
criterion_main!(lookahead);
