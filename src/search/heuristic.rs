use std::fmt;
use std::str::FromStr;

use crate::engine::Board;

/// Cost per move made, added to the heuristic to form the ranking key.
/// Lower values let shallow boards crowd out deep ones.
pub const MOVE_COST: i64 = 6;

/// Coefficients for the four board metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Weights {
    pub zeros: i64,
    pub checkerboarding: i64,
    pub smoothness: i64,
    pub combinable: i64,
}

impl Weights {
    /// Best all-rounder.
    pub const DEFAULT: Weights = Weights::new(18, 2, 2, 9);
    /// Near the end of the sequence: favour combining over keeping cells free.
    pub const CLOSE: Weights = Weights::new(18, 5, 10, 9);
    /// Tried in order when the search stalls. The last two only suit boards
    /// flooded with ones and twos.
    pub const ALTERNATES: [Weights; 5] = [
        Weights::new(18, 1, 2, 13),
        Weights::new(18, 3, 2, 13),
        Weights::new(18, 2, 1, 6),
        Weights::new(18, 0, 0, 9),
        Weights::new(18, 1, 0, 1),
    ];

    pub const fn new(zeros: i64, checkerboarding: i64, smoothness: i64, combinable: i64) -> Self {
        Weights { zeros, checkerboarding, smoothness, combinable }
    }
}

impl fmt::Display for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.zeros, self.checkerboarding, self.smoothness, self.combinable)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WeightsParseError {
    #[error("expected 4 comma-separated weights, got {0}")]
    Count(usize),
    #[error("invalid weight '{0}'")]
    Value(String),
}

impl FromStr for Weights {
    type Err = WeightsParseError;

    /// Parses `"a,b,c,d"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(WeightsParseError::Count(parts.len()));
        }
        let mut v = [0i64; 4];
        for (slot, part) in v.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| WeightsParseError::Value(part.to_string()))?;
        }
        Ok(Weights::new(v[0], v[1], v[2], v[3]))
    }
}

/// `4^dof + w·(zeros, checkerboarding, smoothness, combinable)`.
pub fn heuristic(board: &Board, w: Weights) -> i64 {
    4i64.pow(board.dof())
        + w.zeros * board.zeros() as i64
        + w.checkerboarding * board.checkerboarding() as i64
        + w.smoothness * board.smoothness() as i64
        + w.combinable * board.combinable() as i64
}

/// Ranks unfinished boards for one solve.
///
/// Holds the active weights plus the close-to-the-end weights; which one a
/// board gets depends on how many tiles it has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    weights: Weights,
    close: Weights,
    depth: usize,
    sequence_len: usize,
}

impl Evaluator {
    pub fn new(weights: Weights, close: Weights, depth: usize, sequence_len: usize) -> Self {
        Self { weights, close, depth, sequence_len }
    }

    /// Same evaluator with different active weights.
    pub fn with_weights(self, weights: Weights) -> Self {
        Self { weights, ..self }
    }

    #[inline]
    pub fn weights(&self) -> Weights { self.weights }

    /// Weights that apply to `board`.
    #[inline]
    pub fn weights_for(&self, board: &Board) -> Weights {
        if board.moves() + 2 * self.depth >= self.sequence_len {
            self.close
        } else {
            self.weights
        }
    }

    #[inline]
    pub fn heuristic(&self, board: &Board) -> i64 {
        heuristic(board, self.weights_for(board))
    }

    /// Frontier ranking key: `moves * MOVE_COST + heuristic`.
    #[inline]
    pub fn rank(&self, board: &Board) -> i64 {
        board.moves() as i64 * MOVE_COST + self.heuristic(board)
    }
}
