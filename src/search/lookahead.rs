use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::engine::{Board, Move, Score, Tile};

use super::frontier::BoundedFrontier;
use super::heuristic::Evaluator;

#[derive(Default)]
struct Best {
    board: Option<(Score, Board)>,
    generation: u64,
}

/// Best finished board seen so far, shared by every lookahead worker.
///
/// Only a strictly higher score replaces the current board; each replacement
/// bumps the generation so the controller can tell when progress was made.
#[derive(Default)]
pub struct BestTracker {
    inner: Mutex<Best>,
}

impl BestTracker {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Best> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a finished board. Returns true if it became the new best.
    pub fn offer(&self, board: &Board) -> bool {
        let score = board.score();
        let mut best = self.lock();
        if matches!(best.board, Some((s, _)) if s >= score) {
            return false;
        }
        best.board = Some((score, board.clone()));
        best.generation += 1;
        true
    }

    /// Number of times the best board has been replaced.
    pub fn generation(&self) -> u64 { self.lock().generation }

    /// Score and move count of the best board, plus the generation it was set in.
    pub fn summary(&self) -> Option<(Score, usize, u64)> {
        let best = self.lock();
        best.board.as_ref().map(|(s, b)| (*s, b.moves(), best.generation))
    }

    pub fn best(&self) -> Option<Board> {
        self.lock().board.as_ref().map(|(_, b)| b.clone())
    }

    pub fn into_best(self) -> Option<Board> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner).board.map(|(_, b)| b)
    }
}

impl std::fmt::Debug for BestTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BestTracker").field("best", &self.summary()).finish()
    }
}

/// Output of one lookahead.
#[derive(Debug)]
pub struct Expansion {
    /// Best unfinished boards at the depth limit, at most `width` of them.
    pub results: BoundedFrontier,
    /// Boards generated, finished or not.
    pub nodes: u64,
    /// Parallel branches that panicked and were dropped.
    pub failures: u64,
}

/// Exhaustive depth-limited expansion from one board.
///
/// Every direction is tried at every level. Finished boards go to the
/// tracker; unfinished boards at the depth limit are ranked into a result
/// frontier.
pub struct Lookahead<'a> {
    sequence: &'a [Tile],
    evaluator: &'a Evaluator,
    depth: usize,
    tracker: &'a BestTracker,
}

impl<'a> Lookahead<'a> {
    /// A depth of 0 is treated as 1.
    pub fn new(sequence: &'a [Tile], evaluator: &'a Evaluator, depth: usize, tracker: &'a BestTracker) -> Self {
        Self { sequence, evaluator, depth: depth.max(1), tracker }
    }

    #[inline]
    pub fn depth(&self) -> usize { self.depth }

    /// Run the whole expansion on the calling thread.
    pub fn explore(&self, root: &Board, width: usize) -> Expansion {
        let mut results = BoundedFrontier::new(width);
        let mut nodes = 0;
        self.descend(root.clone(), 0, &mut results, &mut nodes);
        Expansion { results, nodes, failures: 0 }
    }

    /// Split the expansion by first move across `pool`.
    ///
    /// Produces the same result set as [`Lookahead::explore`]. A branch that
    /// panics is logged, counted in `failures`, and contributes nothing.
    pub fn explore_parallel(&self, root: &Board, width: usize, pool: &ThreadPool) -> Expansion {
        let mut nodes = 0;
        let mut branches = Vec::with_capacity(Move::ALL.len());
        for dir in Move::ALL {
            let mut child = root.clone();
            if !child.make_move(dir, self.sequence) {
                continue;
            }
            nodes += 1;
            if child.is_terminal() {
                self.tracker.offer(&child);
            } else {
                branches.push(child);
            }
        }

        let outcomes: Vec<std::thread::Result<(BoundedFrontier, u64)>> = pool.install(|| {
            branches
                .into_par_iter()
                .map(|child| {
                    catch_unwind(AssertUnwindSafe(|| {
                        let mut local = BoundedFrontier::new(width);
                        let mut n = 0;
                        self.descend(child, 1, &mut local, &mut n);
                        (local, n)
                    }))
                })
                .collect()
        });

        let (results, branch_nodes, failures) = merge_outcomes(width, outcomes);
        Expansion { results, nodes: nodes + branch_nodes, failures: failures as u64 }
    }

    fn descend(&self, board: Board, level: usize, out: &mut BoundedFrontier, nodes: &mut u64) {
        if level >= self.depth {
            let rank = self.evaluator.rank(&board);
            out.insert(board, rank);
            return;
        }
        for dir in Move::ALL {
            let mut child = board.clone();
            if !child.make_move(dir, self.sequence) {
                continue;
            }
            *nodes += 1;
            if child.is_terminal() {
                self.tracker.offer(&child);
            } else {
                self.descend(child, level + 1, out, nodes);
            }
        }
    }
}

/// Fold per-branch outcomes into one result frontier.
/// Returns the merged frontier, total nodes and the number of failed branches.
pub(crate) fn merge_outcomes(
    width: usize,
    outcomes: Vec<std::thread::Result<(BoundedFrontier, u64)>>,
) -> (BoundedFrontier, u64, usize) {
    let mut merged = BoundedFrontier::new(width);
    let mut nodes = 0;
    let mut failures = 0;
    for outcome in outcomes {
        match outcome {
            Ok((local, n)) => {
                merged.merge(local);
                nodes += n;
            }
            Err(payload) => {
                failures += 1;
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(%msg, "lookahead branch failed; dropping it");
            }
        }
    }
    (merged, nodes, failures)
}
