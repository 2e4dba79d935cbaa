use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;
use threes::engine::{Board, Move, Tile};

fn sequence(rng: &mut StdRng, len: usize) -> Vec<Tile> {
    (0..len).map(|_| rng.gen_range(1..=3)).collect()
}

// Boards reached by random legal moves from a sparse start.
fn corpus() -> (Vec<Tile>, Vec<Board>) {
    let mut rng = StdRng::seed_from_u64(1337);
    let seq = sequence(&mut rng, 400);
    let mut b = Board::new([1, 0, 0, 2, 0, 3, 0, 0, 0, 0, 2, 0, 3, 0, 0, 1]).unwrap();
    let mut boards = vec![b.clone()];
    while boards.len() < 64 && !b.is_terminal() {
        let dir = Move::ALL[rng.gen_range(0..4)];
        if b.can_move(dir) && b.make_move(dir, &seq) {
            boards.push(b.clone());
        }
    }
    (seq, boards)
}

fn bench_moves(c: &mut Criterion) {
    let (seq, boards) = corpus();
    c.bench_function("engine/make_move", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for bd in &boards {
                for dir in Move::ALL {
                    let mut child = bd.clone();
                    acc += child.make_move(dir, &seq) as usize;
                }
            }
            black_box(acc)
        })
    });
}

fn bench_metrics(c: &mut Criterion) {
    let (_, boards) = corpus();
    c.bench_function("engine/metrics", |bch| {
        bch.iter(|| {
            let mut acc = 0i64;
            for bd in &boards {
                acc += bd.dof() as i64 + bd.zeros() as i64 + bd.combinable() as i64;
                acc += (bd.checkerboarding() + bd.smoothness()) as i64;
                acc ^= bd.score() as i64;
            }
            black_box(acc)
        })
    });
}

criterion_group!(engine_ops, bench_moves, bench_metrics);
criterion_main!(engine_ops);
