//! Hook for weight-tuning harnesses.

use crate::engine::{Board, Score, Tile};

use super::{Solver, SolverConfig, Weights};

/// Solve a copy of `board` with fixed `weights` and `close` weights and return
/// the final score. Alternate rotation is disabled so the result reflects the
/// given tuple only; every other knob comes from `base`.
///
/// ```
/// use threes::engine::Board;
/// use threes::search::{tuning, SolverConfig, Threads, Weights};
///
/// let board = Board::new([1, 2, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
/// let cfg = SolverConfig { threads: Threads::Single, ..Default::default() };
/// let score = tuning::score_with_weights(&board, &[3, 1, 2], Weights::DEFAULT, Weights::CLOSE, &cfg);
/// assert!(score >= board.score());
/// ```
pub fn score_with_weights(board: &Board, sequence: &[Tile], weights: Weights, close: Weights, base: &SolverConfig) -> Score {
    let cfg = SolverConfig { weights, close_weights: close, alternates: Vec::new(), ..base.clone() };
    Solver::with_config(sequence, cfg).solve(board).score()
}
