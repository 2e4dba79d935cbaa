//! Puzzle and move-list files.
//!
//! A puzzle file looks like:
//!
//! ```text
//! <header>
//! <header>
//!   1   2   0   0
//!   0   3   0   0
//!   0   0   0   0
//!   0   0   0   2
//! <separator>
//! 3 1 2 3 3 1 2
//! 2 1 ...
//! ```
//!
//! Board rows keep their first four numbers; every number after the
//! separator line belongs to the tile sequence.

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::engine::{is_valid_tile, Board, BoardError, Move, Tile, BOARD_SPACE, BOARD_WIDTH};

const HEADER_LINES: usize = 2;

#[derive(thiserror::Error, Debug)]
pub enum PuzzleError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: expected 4 board cells")]
    ShortRow { line: usize },
    #[error("file ends before the board is complete")]
    MissingBoard,
    #[error("line {line}: '{text}' is not a number")]
    Number { line: usize, text: String },
    #[error("line {line}: invalid tile value {value}")]
    InvalidTile { line: usize, value: u64 },
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Starting board plus the full tile sequence.
#[derive(Debug, Clone)]
pub struct Puzzle {
    pub board: Board,
    pub sequence: Vec<Tile>,
}

impl Puzzle {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PuzzleError> {
        fs::read_to_string(path)?.parse()
    }
}

impl FromStr for Puzzle {
    type Err = PuzzleError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut lines = text.lines().enumerate().skip(HEADER_LINES);

        let mut cells = [0; BOARD_SPACE];
        for row in cells.chunks_exact_mut(BOARD_WIDTH) {
            let (idx, line) = lines.next().ok_or(PuzzleError::MissingBoard)?;
            let values = tiles(line, idx + 1)?;
            if values.len() < BOARD_WIDTH {
                return Err(PuzzleError::ShortRow { line: idx + 1 });
            }
            row.copy_from_slice(&values[..BOARD_WIDTH]);
        }
        lines.next();

        let mut sequence = Vec::new();
        for (idx, line) in lines {
            sequence.extend(tiles(line, idx + 1)?);
        }

        Ok(Puzzle { board: Board::new(cells)?, sequence })
    }
}

/// Numbers on one line, split on anything that is not a digit.
fn tiles(line: &str, lineno: usize) -> Result<Vec<Tile>, PuzzleError> {
    line.split(|c: char| !c.is_ascii_digit())
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            let value: u64 = tok.parse().map_err(|_| PuzzleError::Number { line: lineno, text: tok.to_string() })?;
            match Tile::try_from(value) {
                Ok(t) if is_valid_tile(t) => Ok(t),
                _ => Err(PuzzleError::InvalidTile { line: lineno, value }),
            }
        })
        .collect()
}

/// Read a move list: two header lines, then `L`/`U`/`R`/`D` characters in any case.
pub fn read_moves<P: AsRef<Path>>(path: P) -> Result<Vec<Move>, PuzzleError> {
    Ok(parse_moves(&fs::read_to_string(path)?))
}

pub fn parse_moves(text: &str) -> Vec<Move> {
    text.lines()
        .skip(HEADER_LINES)
        .flat_map(Move::parse_sequence)
        .collect()
}
