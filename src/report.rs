//! Human-readable summary of a finished solve.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::engine::{Board, Score};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveReport {
    pub score: Score,
    pub dof: u32,
    pub zeros: u32,
    pub checkerboarding: i32,
    pub smoothness: i32,
    pub combinable: u32,
    pub moves: usize,
    pub sequence_len: usize,
    pub elapsed_secs: f64,
    /// Moves as `L`/`U`/`R`/`D` characters.
    pub path: String,
}

impl SolveReport {
    pub fn from_board(board: &Board, sequence_len: usize, elapsed: Duration) -> Self {
        SolveReport {
            score: board.score(),
            dof: board.dof(),
            zeros: board.zeros(),
            checkerboarding: board.checkerboarding(),
            smoothness: board.smoothness(),
            combinable: board.combinable(),
            moves: board.moves(),
            sequence_len,
            elapsed_secs: elapsed.as_secs_f64(),
            path: board.path().to_string(),
        }
    }

    /// Moves per second over the whole solve.
    pub fn rate(&self) -> f64 {
        self.moves as f64 / self.elapsed_secs.max(1e-6)
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.to_string())
    }
}

impl fmt::Display for SolveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.score, self.dof, self.zeros, self.checkerboarding, self.smoothness, self.combinable
        )?;
        writeln!(
            f,
            "Used {}/{} available moves in {:.2} seconds. ({:.2} m/s)",
            self.moves,
            self.sequence_len,
            self.elapsed_secs,
            self.rate()
        )?;
        writeln!(f, "{}", self.path)
    }
}
