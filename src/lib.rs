//! threes: a Threes! engine and a lookahead solver for fully known tile sequences
//!
//! This crate provides:
//! - A value-like `Board` with deterministic moves (`make_move`, `apply_moves`) and
//!   the board metrics the solver ranks by (`score`, `dof`, `zeros`, ...)
//! - A bounded-frontier search (`search` module) that runs sequentially or over a
//!   small rayon pool
//! - Puzzle file loading (`puzzle`), plain-text reports (`report`) and a
//!   checksummed binary run record (`serialization`)
//!
//! Quick start:
//! ```
//! use threes::engine::{Board, Move};
//!
//! let sequence = [3, 1, 2];
//! let mut board = Board::new([1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
//! assert!(board.make_move(Move::Left, &sequence));
//! assert_eq!(board.cursor(), 1);
//! assert_eq!(board.path().to_string(), "L");
//! assert!(board.score() > 2);
//! ```
//!
//! Note: the tile sequence is never stored on the board; pass the same slice to
//! every call. Boards compare equal on cells and cursor, not on the path taken.
//!
pub mod engine;
pub mod puzzle;
pub mod report;
pub mod search;
pub mod serialization;
