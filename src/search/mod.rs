//! Bounded-frontier lookahead search for a fully known tile sequence.
//!
//! The pieces, leaf first:
//! - [`Evaluator`]: weighted heuristic and ranking key for unfinished boards.
//! - [`BoundedFrontier`]: capacity-limited ordered set of ranked boards.
//! - [`Lookahead`]: exhaustive depth-limited expansion, sequential or split
//!   across a rayon pool by first move.
//! - [`Solver`]: the controller loop that pops, expands and reinserts until
//!   the best finished board stops improving.
//!
//! Quick start
//! ```
//! use threes::engine::Board;
//! use threes::search::{Solver, SolverConfig, Threads};
//!
//! let sequence = [1, 2, 3, 2, 1, 3];
//! let board = Board::new([1, 2, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
//! let cfg = SolverConfig { threads: Threads::Single, ..Default::default() };
//! let mut solver = Solver::with_config(&sequence, cfg);
//! let done = solver.solve(&board);
//! assert!(done.cursor() <= sequence.len());
//! assert!(done.score() >= board.score());
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use crate::engine::Score;

mod controller;
mod frontier;
mod heuristic;
mod lookahead;
pub mod tuning;

pub use controller::{Phase, Solver};
pub use frontier::BoundedFrontier;
pub use heuristic::{heuristic, Evaluator, Weights, WeightsParseError, MOVE_COST};
pub use lookahead::{BestTracker, Expansion, Lookahead};

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {
    /// `min(available_parallelism, 4)`: never more workers than first moves.
    #[default]
    Auto,
    /// Run every lookahead on the calling thread.
    Single,
}

impl Threads {
    /// Number of workers this setting resolves to on the current machine.
    pub fn resolve(self) -> usize {
        match self {
            Threads::Single => 1,
            Threads::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(1, 4),
        }
    }
}

/// Configurable knobs for [`Solver`]. Defaults are the tuned values.
///
/// - `depth`: lookahead depth per expansion.
/// - `width` / `wide_width`: size of the result set one expansion returns;
///   the wide value is used while the frontier is under `refill_percent` full.
/// - `capacity`: frontier capacity.
/// - `weights`, `alternates`: the starting heuristic weights and the tuples
///   rotated through when the search stalls. With no alternates the search
///   never stalls: the frontier is not thinned and the weights never change.
/// - `close_weights`: used for boards within `2 * depth` moves of the end of
///   the sequence.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub depth: usize,
    pub width: usize,
    pub wide_width: usize,
    pub capacity: usize,
    pub refill_percent: usize,
    pub threads: Threads,
    pub weights: Weights,
    pub close_weights: Weights,
    pub alternates: Vec<Weights>,
    /// Alternate indices above this are dropped again right after a recovery.
    pub volatile_after: usize,
    /// Time budget is this much per tile in the sequence.
    pub time_per_tile: Duration,
    /// Iterations the best board must stay unchanged before a budget stop.
    pub settle_iterations: usize,
    /// Same, once the best board has consumed the whole sequence.
    pub exhausted_settle_iterations: usize,
    /// Unconditional stop after this many iterations without improvement.
    pub quiescence_ceiling: usize,
    /// Halve the frontier every `stall_factor * capacity` stagnant iterations.
    pub stall_factor: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            depth: 8,
            width: 4,
            wide_width: 8,
            capacity: 150,
            refill_percent: 45,
            threads: Threads::Auto,
            weights: Weights::DEFAULT,
            close_weights: Weights::CLOSE,
            alternates: Weights::ALTERNATES.to_vec(),
            volatile_after: 3,
            time_per_tile: Duration::from_millis(200),
            settle_iterations: 5,
            exhausted_settle_iterations: 2,
            quiescence_ceiling: 11_000,
            stall_factor: 4,
        }
    }
}

/// Basic statistics for the last [`Solver::solve`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchStats {
    pub iterations: u64,
    pub nodes: u64,
    pub stalls: u64,
    pub recoveries: u64,
    /// Lookahead branches that panicked and were dropped.
    pub branch_failures: u64,
    pub peak_frontier: usize,
    pub best_score: Score,
    pub elapsed: Duration,
}

/// Live counters a caller can poll from another thread while a solve runs.
#[derive(Debug, Default)]
pub struct SearchProgress {
    iterations: AtomicU64,
    best_score: AtomicU64,
    best_moves: AtomicU64,
    frontier: AtomicU64,
    phase: AtomicU8,
}

/// Point-in-time copy of [`SearchProgress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub iterations: u64,
    pub best_score: u64,
    pub best_moves: u64,
    pub frontier: u64,
    pub phase: Phase,
}

impl SearchProgress {
    pub fn new() -> Self { Self::default() }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            best_score: self.best_score.load(Ordering::Relaxed),
            best_moves: self.best_moves.load(Ordering::Relaxed),
            frontier: self.frontier.load(Ordering::Relaxed),
            phase: Phase::from_u8(self.phase.load(Ordering::Relaxed)),
        }
    }

    fn reset(&self) {
        self.iterations.store(0, Ordering::Relaxed);
        self.best_score.store(0, Ordering::Relaxed);
        self.best_moves.store(0, Ordering::Relaxed);
        self.frontier.store(0, Ordering::Relaxed);
        self.phase.store(Phase::Running.as_u8(), Ordering::Relaxed);
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.as_u8(), Ordering::Relaxed);
    }

    fn record(&self, iterations: u64, frontier: usize, best: Option<(Score, usize)>) {
        self.iterations.store(iterations, Ordering::Relaxed);
        self.frontier.store(frontier as u64, Ordering::Relaxed);
        if let Some((score, moves)) = best {
            self.best_score.store(score, Ordering::Relaxed);
            self.best_moves.store(moves as u64, Ordering::Relaxed);
        }
    }
}
