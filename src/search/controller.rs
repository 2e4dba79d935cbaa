use std::sync::Arc;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::engine::{Board, Tile};

use super::frontier::BoundedFrontier;
use super::heuristic::{Evaluator, Weights};
use super::lookahead::{BestTracker, Lookahead};
use super::{SearchProgress, SearchStats, SolverConfig};

/// Where the controller loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Running,
    /// No improvement for a while; the frontier is about to be thinned.
    Stalled,
    /// Running on an alternate weight tuple, waiting for the best board to improve.
    Recovering,
    Done,
}

impl Phase {
    pub(super) fn as_u8(self) -> u8 {
        match self {
            Phase::Running => 0,
            Phase::Stalled => 1,
            Phase::Recovering => 2,
            Phase::Done => 3,
        }
    }

    pub(super) fn from_u8(v: u8) -> Phase {
        match v {
            1 => Phase::Stalled,
            2 => Phase::Recovering,
            3 => Phase::Done,
            _ => Phase::Running,
        }
    }
}

/// Why a solve stopped before the frontier ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// Best board used the whole sequence or the time budget ran out, and it held.
    Settled,
    /// No improvement for `quiescence_ceiling` iterations.
    Quiescent,
    /// Best board used the whole sequence and held briefly.
    Exhausted,
}

/// Stop test run at the top of each iteration.
///
/// `best_exhausted` is `None` while no finished board exists, otherwise
/// whether the best board consumed every tile.
pub(crate) fn stop_reason(
    cfg: &SolverConfig,
    best_exhausted: Option<bool>,
    over_budget: bool,
    stable: usize,
) -> Option<StopReason> {
    let exhausted = best_exhausted?;
    if (exhausted || over_budget) && stable >= cfg.settle_iterations {
        Some(StopReason::Settled)
    } else if stable >= cfg.quiescence_ceiling {
        Some(StopReason::Quiescent)
    } else if exhausted && stable >= cfg.exhausted_settle_iterations {
        Some(StopReason::Exhausted)
    } else {
        None
    }
}

/// What changed between two iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Idle,
    Improved,
    /// Improved while on alternate weights. `reset` when a volatile tuple was left.
    Recovered { reset: bool },
    /// Time to thin the frontier; the next weight tuple is already active.
    Stalled,
}

/// Stagnation counter, phase and weight rotation for one solve.
///
/// Nothing is counted until a finished board exists. An empty `alternates`
/// list disables stall handling.
#[derive(Debug)]
struct Recovery {
    candidates: Vec<Weights>,
    index: usize,
    volatile_after: usize,
    stall_every: usize,
    generation: u64,
    stable: usize,
    phase: Phase,
}

impl Recovery {
    fn new(cfg: &SolverConfig, capacity: usize) -> Self {
        Self {
            candidates: std::iter::once(cfg.weights).chain(cfg.alternates.iter().copied()).collect(),
            index: 0,
            volatile_after: cfg.volatile_after,
            stall_every: cfg.stall_factor.saturating_mul(capacity).max(1),
            generation: 0,
            stable: 0,
            phase: Phase::Running,
        }
    }

    #[inline]
    fn weights(&self) -> Weights { self.candidates[self.index] }

    /// Advance one iteration. `generation` is the tracker generation, `None`
    /// while no finished board exists.
    fn step(&mut self, generation: Option<u64>) -> Step {
        let Some(generation) = generation else { return Step::Idle };
        if generation != self.generation {
            self.generation = generation;
            self.stable = 0;
            if self.phase != Phase::Recovering {
                return Step::Improved;
            }
            self.phase = Phase::Running;
            let reset = self.index > self.volatile_after;
            if reset {
                self.index = 0;
            }
            return Step::Recovered { reset };
        }
        self.stable += 1;
        if self.candidates.len() > 1 && self.stable % self.stall_every == 0 {
            self.index = (self.index + 1) % self.candidates.len();
            self.phase = Phase::Stalled;
            return Step::Stalled;
        }
        Step::Idle
    }

    /// The frontier was thinned; wait on the new weights for an improvement.
    fn resume(&mut self) {
        self.phase = Phase::Recovering;
    }
}

/// Bounded-frontier solver for one tile sequence.
///
/// Owns the sequence, the configuration and a rayon pool reused across
/// [`Solver::solve`] calls.
pub struct Solver {
    sequence: Vec<Tile>,
    cfg: SolverConfig,
    pool: Option<ThreadPool>,
    phase: Phase,
    stats: SearchStats,
    progress: Option<Arc<SearchProgress>>,
}

impl Solver {
    pub fn new(sequence: &[Tile]) -> Self { Self::with_config(sequence, SolverConfig::default()) }

    pub fn with_config(sequence: &[Tile], cfg: SolverConfig) -> Self {
        let threads = cfg.threads.resolve();
        let pool = if threads > 1 {
            match ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("threes-lookahead-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(err) => {
                    warn!(%err, threads, "could not build lookahead pool; running sequentially");
                    None
                }
            }
        } else {
            None
        };
        Self { sequence: sequence.to_vec(), cfg, pool, phase: Phase::Running, stats: SearchStats::default(), progress: None }
    }

    /// Publish live counters to `progress` during every solve.
    pub fn with_progress(mut self, progress: Arc<SearchProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[inline]
    pub fn sequence(&self) -> &[Tile] { &self.sequence }

    #[inline]
    pub fn config(&self) -> &SolverConfig { &self.cfg }

    /// Statistics of the most recent solve.
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Phase of the most recent solve; `Done` once [`Solver::solve`] returns.
    /// Watch a running solve through [`SearchProgress`].
    #[inline]
    pub fn phase(&self) -> Phase { self.phase }

    /// Search for the highest-scoring finished board reachable from `board`.
    ///
    /// Returns a clone of `board` when no finished board was found, which
    /// includes boards that are already terminal and an empty sequence.
    pub fn solve(&mut self, board: &Board) -> Board {
        let start = Instant::now();
        let cfg = &self.cfg;
        let sequence = &self.sequence[..];
        let len = sequence.len();
        let mut stats = SearchStats::default();
        if let Some(p) = &self.progress {
            p.reset();
        }

        if board.is_terminal() || board.cursor() >= len {
            self.phase = Phase::Done;
            if let Some(p) = &self.progress {
                p.set_phase(Phase::Done);
            }
            self.stats = SearchStats { best_score: board.score(), elapsed: start.elapsed(), ..stats };
            return board.clone();
        }

        let mut evaluator = Evaluator::new(cfg.weights, cfg.close_weights, cfg.depth, len);
        let tracker = BestTracker::new();
        let mut frontier = BoundedFrontier::new(cfg.capacity);
        frontier.insert(board.clone(), evaluator.rank(board));

        let budget = cfg.time_per_tile.saturating_mul(u32::try_from(len).unwrap_or(u32::MAX));
        let mut recovery = Recovery::new(cfg, frontier.capacity());
        self.phase = Phase::Running;

        info!(
            tiles = len,
            start = board.cursor(),
            depth = cfg.depth,
            capacity = frontier.capacity(),
            parallel = self.pool.is_some(),
            "solve started"
        );

        loop {
            let best = tracker.summary();
            let over_budget = start.elapsed() > budget;
            if let Some(reason) = stop_reason(cfg, best.map(|(_, moves, _)| moves >= len), over_budget, recovery.stable) {
                debug!(?reason, stable = recovery.stable, "stopping");
                break;
            }

            match recovery.step(best.map(|(_, _, generation)| generation)) {
                Step::Recovered { reset } => {
                    stats.recoveries += 1;
                    evaluator = evaluator.with_weights(recovery.weights());
                    info!(weights = %recovery.weights(), reset, "recovered after stall");
                }
                Step::Stalled => {
                    self.phase = Phase::Stalled;
                    if let Some(p) = &self.progress {
                        p.set_phase(Phase::Stalled);
                    }
                    let dropped = frontier.drop_lower_half();
                    evaluator = evaluator.with_weights(recovery.weights());
                    stats.stalls += 1;
                    info!(stable = recovery.stable, dropped, weights = %recovery.weights(), "search stalled");
                    recovery.resume();
                }
                Step::Improved | Step::Idle => {}
            }
            if self.phase != recovery.phase {
                self.phase = recovery.phase;
                if let Some(p) = &self.progress {
                    p.set_phase(recovery.phase);
                }
            }

            let Some(node) = frontier.pop_best() else {
                debug!("frontier exhausted");
                break;
            };

            let width = if frontier.len() * 100 < frontier.capacity() * cfg.refill_percent {
                cfg.wide_width
            } else {
                cfg.width
            };
            let look = Lookahead::new(sequence, &evaluator, cfg.depth, &tracker);
            let exp = match &self.pool {
                Some(pool) => look.explore_parallel(&node, width, pool),
                None => look.explore(&node, width),
            };
            stats.nodes += exp.nodes;
            stats.branch_failures += exp.failures;
            frontier.merge(exp.results);

            stats.iterations += 1;
            stats.peak_frontier = stats.peak_frontier.max(frontier.len());
            let best = tracker.summary();
            if let Some(p) = &self.progress {
                p.record(stats.iterations, frontier.len(), best.map(|(s, m, _)| (s, m)));
            }
            debug!(
                iteration = stats.iterations,
                popped_moves = node.moves(),
                frontier = frontier.len(),
                nodes = exp.nodes,
                best = ?best.map(|(s, _, _)| s),
                phase = ?self.phase,
                "iteration"
            );
        }

        let result = tracker.into_best().unwrap_or_else(|| board.clone());
        stats.best_score = result.score();
        stats.elapsed = start.elapsed();
        info!(
            score = stats.best_score,
            moves = result.moves(),
            iterations = stats.iterations,
            nodes = stats.nodes,
            stalls = stats.stalls,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "solve finished"
        );
        self.phase = Phase::Done;
        if let Some(p) = &self.progress {
            p.set_phase(Phase::Done);
        }
        self.stats = stats;
        result
    }
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("tiles", &self.sequence.len())
            .field("cfg", &self.cfg)
            .field("parallel", &self.pool.is_some())
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::{Move, Score};
    use crate::search::Threads;

    fn single(cfg: SolverConfig) -> SolverConfig {
        SolverConfig { threads: Threads::Single, time_per_tile: Duration::from_secs(60), ..cfg }
    }

    fn brute_force(board: &Board, seq: &[Tile]) -> Score {
        if board.is_terminal() {
            return board.score();
        }
        Move::ALL
            .iter()
            .filter_map(|&dir| {
                let mut child = board.clone();
                child.make_move(dir, seq).then(|| brute_force(&child, seq))
            })
            .max()
            .unwrap_or_else(|| board.score())
    }

    #[test]
    fn it_stops_on_settled_exhausted_and_quiescent() {
        let cfg = SolverConfig::default();
        assert_eq!(stop_reason(&cfg, None, true, 50_000), None);
        assert_eq!(stop_reason(&cfg, Some(false), false, 4), None);
        assert_eq!(stop_reason(&cfg, Some(false), true, 5), Some(StopReason::Settled));
        assert_eq!(stop_reason(&cfg, Some(true), false, 5), Some(StopReason::Settled));
        assert_eq!(stop_reason(&cfg, Some(true), false, 2), Some(StopReason::Exhausted));
        assert_eq!(stop_reason(&cfg, Some(true), false, 1), None);
        assert_eq!(stop_reason(&cfg, Some(false), false, 11_000), Some(StopReason::Quiescent));
    }

    fn stall_every_two() -> Recovery {
        let cfg = SolverConfig { stall_factor: 1, ..Default::default() };
        Recovery::new(&cfg, 2)
    }

    #[test]
    fn it_ignores_stagnation_without_a_finished_board() {
        let mut r = stall_every_two();
        for _ in 0..100 {
            assert_eq!(r.step(None), Step::Idle);
        }
        assert_eq!(r.stable, 0);
        assert_eq!(r.phase, Phase::Running);
        assert_eq!(r.weights(), Weights::DEFAULT);
    }

    #[test]
    fn it_stalls_and_recovers() {
        let mut r = stall_every_two();
        assert_eq!(r.step(Some(1)), Step::Improved);
        assert_eq!(r.step(Some(1)), Step::Idle);
        assert_eq!(r.step(Some(1)), Step::Stalled);
        assert_eq!(r.phase, Phase::Stalled);
        assert_eq!(r.weights(), Weights::ALTERNATES[0]);
        r.resume();
        assert_eq!(r.phase, Phase::Recovering);

        // Stable tuples survive a recovery.
        assert_eq!(r.step(Some(2)), Step::Recovered { reset: false });
        assert_eq!(r.phase, Phase::Running);
        assert_eq!(r.stable, 0);
        assert_eq!(r.weights(), Weights::ALTERNATES[0]);
        assert_eq!(r.step(Some(3)), Step::Improved);
    }

    #[test]
    fn it_leaves_volatile_weights_after_recovery() {
        let mut r = stall_every_two();
        assert_eq!(r.step(Some(1)), Step::Improved);
        for expected in &Weights::ALTERNATES[..4] {
            assert_eq!(r.step(Some(1)), Step::Idle);
            assert_eq!(r.step(Some(1)), Step::Stalled);
            assert_eq!(r.weights(), *expected);
            r.resume();
        }
        assert_eq!(r.step(Some(2)), Step::Recovered { reset: true });
        assert_eq!(r.weights(), Weights::DEFAULT);

        // Rotation wraps back to the starting tuple.
        let mut r = stall_every_two();
        r.step(Some(1));
        for _ in 0..Weights::ALTERNATES.len() + 1 {
            r.step(Some(1));
            assert_eq!(r.step(Some(1)), Step::Stalled);
            r.resume();
        }
        assert_eq!(r.weights(), Weights::DEFAULT);
    }

    #[test]
    fn it_never_stalls_without_alternates() {
        let cfg = SolverConfig { stall_factor: 1, alternates: Vec::new(), ..Default::default() };
        let mut r = Recovery::new(&cfg, 1);
        r.step(Some(1));
        for _ in 0..50 {
            assert_eq!(r.step(Some(1)), Step::Idle);
        }
        assert_eq!(r.stable, 50);
    }

    #[test]
    fn it_solves_short_sequence() {
        let seq = [1, 2, 3, 2, 1, 3, 3, 1, 2, 2];
        let board = Board::new([1, 2, 0, 0, 0, 3, 0, 0, 0, 0, 1, 0, 0, 0, 0, 2]).unwrap();
        let mut solver = Solver::with_config(&seq, single(SolverConfig { depth: 3, ..Default::default() }));
        let done = solver.solve(&board);
        assert!(done.cursor() <= seq.len());
        assert!(done.score() >= board.score());
        assert!(done.is_terminal());
        assert_eq!(solver.phase(), Phase::Done);
        let stats = solver.last_stats();
        assert!(stats.iterations > 0);
        assert!(stats.nodes > 0);
        assert_eq!(stats.best_score, done.score());

        // The path replays to the same board.
        let mut replay = board.clone();
        assert_eq!(replay.apply_moves(&seq, &done.path().to_vec()), done.moves());
        assert_eq!(replay, done);
    }

    #[test]
    fn it_matches_brute_force_on_tiny_sequences() {
        let cases: [(&[Tile], [Tile; 16]); 3] = [
            (&[1, 2, 3, 3, 1], [1, 2, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            (&[3, 3, 2, 1], [3, 6, 3, 0, 0, 1, 2, 0, 6, 0, 0, 3, 0, 0, 0, 0]),
            (&[2, 1, 2], [12, 12, 0, 1, 2, 0, 0, 0, 0, 0, 3, 3, 0, 0, 0, 0]),
        ];
        for (seq, cells) in cases {
            let board = Board::new(cells).unwrap();
            let expected = brute_force(&board, seq);
            let mut solver = Solver::with_config(seq, single(SolverConfig::default()));
            assert_eq!(solver.solve(&board).score(), expected);

            let cfg = SolverConfig { threads: Threads::Auto, time_per_tile: Duration::from_secs(60), ..Default::default() };
            let mut par = Solver::with_config(seq, cfg);
            assert_eq!(par.solve(&board).score(), expected);
        }
    }

    #[test]
    fn it_returns_input_when_nothing_to_do() {
        let locked = Board::new([3, 6, 3, 6, 6, 3, 6, 3, 3, 6, 3, 6, 6, 3, 6, 3]).unwrap();
        let mut solver = Solver::with_config(&[1, 2, 3], single(SolverConfig::default()));
        let out = solver.solve(&locked);
        assert_eq!(out, locked);
        assert_eq!(solver.last_stats().iterations, 0);

        let open = Board::new([1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let mut empty = Solver::with_config(&[], single(SolverConfig::default()));
        let out = empty.solve(&open);
        assert_eq!(out, open);
        assert_eq!(out.moves(), 0);
    }

    #[test]
    fn it_solves_with_a_tiny_frontier() {
        let seq: Vec<Tile> = (0..40).map(|i| [1, 2, 3, 3, 2, 1, 2][i % 7]).collect();
        let board = Board::new([1, 0, 0, 2, 0, 3, 0, 0, 0, 0, 2, 0, 3, 0, 0, 1]).unwrap();
        let cfg = single(SolverConfig { depth: 1, width: 2, wide_width: 3, capacity: 4, stall_factor: 1, ..Default::default() });
        let mut solver = Solver::with_config(&seq, cfg);
        let done = solver.solve(&board);
        let stats = solver.last_stats();
        assert!(stats.recoveries <= stats.stalls);
        assert!(stats.peak_frontier <= 4);
        assert!(done.score() >= board.score());
        assert!(done.cursor() <= seq.len());
    }

    #[test]
    fn it_waits_for_a_finished_board_before_stalling() {
        // A board with an empty cell can always move, so nothing finishes
        // before nine more tiles are placed. The zero budget then stops the
        // search as soon as a finished board exists.
        let seq: Vec<Tile> = (0..40).map(|i| [1, 2, 3, 3, 2, 1, 2][i % 7]).collect();
        let board = Board::new([1, 0, 0, 2, 0, 3, 0, 0, 0, 0, 2, 0, 3, 0, 0, 1]).unwrap();
        let cfg = SolverConfig {
            threads: Threads::Single,
            depth: 1,
            capacity: 4,
            stall_factor: 1,
            settle_iterations: 0,
            time_per_tile: Duration::ZERO,
            ..Default::default()
        };
        let progress = Arc::new(SearchProgress::new());
        let mut solver = Solver::with_config(&seq, cfg).with_progress(progress.clone());
        solver.solve(&board);
        let stats = solver.last_stats();
        assert!(stats.iterations >= 8);
        assert_eq!(stats.stalls, 0);
        assert_eq!(progress.snapshot().phase, Phase::Done);
    }

    #[test]
    fn it_resets_state_between_solves() {
        let seq = [2, 1, 3, 3, 1, 2, 3, 1];
        let board = Board::new([0, 1, 0, 2, 0, 0, 3, 0, 0, 0, 0, 0, 1, 0, 0, 0]).unwrap();
        let progress = Arc::new(SearchProgress::new());
        let mut solver =
            Solver::with_config(&seq, single(SolverConfig { depth: 2, ..Default::default() })).with_progress(progress.clone());
        let a = solver.solve(&board);
        let first = solver.last_stats();
        assert_eq!(progress.snapshot().iterations, first.iterations);
        assert_eq!(progress.snapshot().best_score, a.score());

        let b = solver.solve(&board);
        let second = solver.last_stats();
        assert_eq!(a, b);
        assert_eq!(first.iterations, second.iterations);
        assert_eq!(first.nodes, second.nodes);
    }
}
