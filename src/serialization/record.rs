use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{Board, BoardError, Move, Score, Tile, BOARD_SPACE};

const CHECKSUM_LEN: usize = 4;

/// Everything needed to replay and check a solve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    /// Starting cells, row-major.
    pub board: [Tile; BOARD_SPACE],
    pub sequence: Vec<Tile>,
    pub moves: Vec<Move>,
    /// Score of the board after all moves.
    pub score: Score,
}

#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("record too short ({0} bytes)")]
    Truncated(usize),
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("replay stopped after {applied} of {expected} moves")]
    Replay { applied: usize, expected: usize },
    #[error("replayed score {actual} does not match recorded {recorded}")]
    Score { recorded: Score, actual: Score },
}

impl RunRecord {
    /// Record the solve that took `start` to `finished`.
    pub fn new(start: &Board, sequence: &[Tile], finished: &Board) -> Self {
        RunRecord {
            board: *start.cells(),
            sequence: sequence.to_vec(),
            moves: finished.path().to_vec(),
            score: finished.score(),
        }
    }

    /// Replay the moves from the starting board and check the stored score.
    /// Returns the replayed board.
    pub fn verify(&self) -> Result<Board, SerializationError> {
        let mut board = Board::new(self.board)?;
        let applied = board.apply_moves(&self.sequence, &self.moves);
        if applied != self.moves.len() {
            return Err(SerializationError::Replay { applied, expected: self.moves.len() });
        }
        let actual = board.score();
        if actual != self.score {
            return Err(SerializationError::Score { recorded: self.score, actual });
        }
        Ok(board)
    }
}

pub fn to_bytes(record: &RunRecord) -> Result<Vec<u8>, SerializationError> {
    let mut buf = postcard::to_allocvec(record)?;
    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

pub fn from_bytes(bytes: &[u8]) -> Result<RunRecord, SerializationError> {
    if bytes.len() <= CHECKSUM_LEN {
        return Err(SerializationError::Truncated(bytes.len()));
    }
    let (content, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32c::crc32c(content);
    if stored != computed {
        return Err(SerializationError::Checksum { stored, computed });
    }
    Ok(postcard::from_bytes(content)?)
}

pub fn write_to_path<P: AsRef<Path>>(path: P, record: &RunRecord) -> Result<(), SerializationError> {
    fs::write(path, to_bytes(record)?)?;
    Ok(())
}

pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<RunRecord, SerializationError> {
    from_bytes(&fs::read(path)?)
}
