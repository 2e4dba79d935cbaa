use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A direction to shift/merge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Left,
    Up,
    Right,
    Down,
}

pub type Tile = u32;
pub type Score = u64;

pub const BOARD_WIDTH: usize = 4;
pub const BOARD_SPACE: usize = BOARD_WIDTH * BOARD_WIDTH;

type Order = [u8; BOARD_SPACE];

// Read order per line, near edge first.
const LEFT_ORDER: Order = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
const UP_ORDER: Order = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];
const RIGHT_ORDER: Order = [15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0];
const DOWN_ORDER: Order = [15, 11, 7, 3, 14, 10, 6, 2, 13, 9, 5, 1, 12, 8, 4, 0];

impl Move {
    /// All directions in search order.
    pub const ALL: [Move; 4] = [Move::Left, Move::Up, Move::Right, Move::Down];

    #[inline]
    fn traversal(self) -> &'static Order {
        match self {
            Move::Left => &LEFT_ORDER,
            Move::Up => &UP_ORDER,
            Move::Right => &RIGHT_ORDER,
            Move::Down => &DOWN_ORDER,
        }
    }

    /// Order in which candidate insertion cells are compared. The first four
    /// entries are the far-edge cells, one per line (bit `j` of the shifted-line
    /// mask maps to entry `j`).
    #[inline]
    fn insertion_order(self) -> &'static Order {
        match self {
            Move::Left => &DOWN_ORDER,
            Move::Up => &RIGHT_ORDER,
            Move::Right => &UP_ORDER,
            Move::Down => &LEFT_ORDER,
        }
    }

    /// Up/Down resolve a full tie to the last remaining line, Left/Right to the first.
    #[inline]
    fn inserts_last(self) -> bool {
        matches!(self, Move::Up | Move::Down)
    }

    /// Single-letter form used in move strings.
    pub fn as_char(self) -> char {
        match self {
            Move::Left => 'L',
            Move::Up => 'U',
            Move::Right => 'R',
            Move::Down => 'D',
        }
    }

    /// Parse one direction letter, case-insensitive.
    pub fn from_char(c: char) -> Option<Move> {
        match c.to_ascii_lowercase() {
            'l' => Some(Move::Left),
            'u' => Some(Move::Up),
            'r' => Some(Move::Right),
            'd' => Some(Move::Down),
            _ => None,
        }
    }

    /// Parse a move string. Letters are case-insensitive; anything that is not
    /// `L`, `U`, `R` or `D` is skipped.
    ///
    /// ```
    /// use threes::engine::Move;
    /// assert_eq!(Move::parse_sequence("lU, x r\nD"), vec![Move::Left, Move::Up, Move::Right, Move::Down]);
    /// ```
    pub fn parse_sequence(s: &str) -> Vec<Move> {
        s.chars().filter_map(Move::from_char).collect()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Errors raised when constructing a board from raw cells.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("expected 16 cells, got {0}")]
    CellCount(usize),
    #[error("invalid tile value {value} at cell {index}")]
    InvalidTile { index: usize, value: Tile },
}

/// Largest tile a board may hold. Two of these never merge, so cell sums stay within `Tile`.
pub const MAX_TILE: Tile = 3 << 29;

/// True for 0 (empty), 1, 2 and 3·2^k up to [`MAX_TILE`].
#[inline]
pub fn is_valid_tile(t: Tile) -> bool {
    t <= 2 || (t <= MAX_TILE && t % 3 == 0 && (t / 3).is_power_of_two())
}

/// Whether `from` can move into the neighbouring cell holding `to`.
#[inline]
pub(crate) fn shift_valid(from: Tile, to: Tile) -> bool {
    (from != 0 && to == 0)
        || (from == 1 && to == 2)
        || (from == 2 && to == 1)
        || (from > 2 && from == to && from < MAX_TILE)
}

/// Whether either tile of a neighbouring pair can move into the other.
#[inline]
pub(crate) fn combines(a: Tile, b: Tile) -> bool {
    shift_valid(a, b) || shift_valid(b, a)
}

/// Points for a single tile: 1 and 2 score 1, `3·2^k` scores `3^(k+1)`.
#[inline]
pub fn tile_score(t: Tile) -> Score {
    match t {
        0 => 0,
        1 | 2 => 1,
        _ => (3 as Score).pow((t / 3).ilog2() + 1),
    }
}

/// Logarithmic bucket of a tile: `floor(log2(v / 3))`, 0 for anything below 6.
#[inline]
pub fn elevation(t: Tile) -> i32 {
    match t / 3 {
        0 => 0,
        q => q.ilog2() as i32,
    }
}

struct PathNode {
    dir: Move,
    prev: Option<Arc<PathNode>>,
}

/// Persistent list of moves taken so far.
///
/// Clones share their tail, so copying a board for a search branch is O(1)
/// regardless of how many moves it has made.
#[derive(Clone, Default)]
pub struct MovePath {
    head: Option<Arc<PathNode>>,
    len: usize,
}

impl MovePath {
    #[inline]
    pub fn len(&self) -> usize { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Most recent move, if any.
    pub fn last(&self) -> Option<Move> { self.head.as_ref().map(|n| n.dir) }

    fn push(&mut self, dir: Move) {
        let prev = self.head.take();
        self.head = Some(Arc::new(PathNode { dir, prev }));
        self.len += 1;
    }

    /// Moves in the order they were made.
    pub fn to_vec(&self) -> Vec<Move> {
        let mut out = Vec::with_capacity(self.len);
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            out.push(n.dir);
            node = n.prev.as_deref();
        }
        out.reverse();
        out
    }
}

impl Drop for MovePath {
    // Unlink iteratively; a long uniquely-owned chain would otherwise recurse once per move.
    fn drop(&mut self) {
        let mut head = self.head.take();
        while let Some(node) = head {
            match Arc::try_unwrap(node) {
                Ok(mut n) => head = n.prev.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Display for MovePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self.to_vec().into_iter().map(Move::as_char).collect();
        f.write_str(&s)
    }
}

impl fmt::Debug for MovePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MovePath({:?})", self.to_string())
    }
}

/// A 4x4 Threes board together with its position in the tile sequence.
///
/// The tile sequence itself lives outside the board and is passed to
/// [`Board::make_move`]; `cursor` counts how many of its tiles were consumed.
/// Equality and hashing consider only the cells and the cursor.
#[derive(Clone)]
pub struct Board {
    cells: [Tile; BOARD_SPACE],
    cursor: usize,
    path: MovePath,
    terminal: bool,
}

impl Board {
    /// Build a board from row-major cells. A board with no legal move is
    /// terminal from the start.
    ///
    /// ```
    /// use threes::engine::Board;
    /// let b = Board::new([1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    /// assert_eq!(b.score(), 2);
    /// assert!(Board::new([5; 16]).is_err());
    /// ```
    pub fn new(cells: [Tile; BOARD_SPACE]) -> Result<Self, BoardError> {
        if let Some((index, &value)) = cells.iter().enumerate().find(|(_, &v)| !is_valid_tile(v)) {
            return Err(BoardError::InvalidTile { index, value });
        }
        let mut board = Board { cells, cursor: 0, path: MovePath::default(), terminal: false };
        board.terminal = board.dof() == 0;
        Ok(board)
    }

    /// Like [`Board::new`] but from a slice, which must hold exactly 16 cells.
    pub fn from_slice(cells: &[Tile]) -> Result<Self, BoardError> {
        let cells: [Tile; BOARD_SPACE] = cells.try_into().map_err(|_| BoardError::CellCount(cells.len()))?;
        Board::new(cells)
    }

    #[inline]
    pub fn cells(&self) -> &[Tile; BOARD_SPACE] { &self.cells }

    /// Tile at row-major index `idx`.
    #[inline]
    pub fn tile(&self, idx: usize) -> Tile { self.cells[idx] }

    /// Number of sequence tiles consumed.
    #[inline]
    pub fn cursor(&self) -> usize { self.cursor }

    /// Number of moves made; always equal to the cursor.
    #[inline]
    pub fn moves(&self) -> usize {
        debug_assert_eq!(self.path.len(), self.cursor);
        self.path.len()
    }

    #[inline]
    pub fn path(&self) -> &MovePath { &self.path }

    #[inline]
    pub fn is_terminal(&self) -> bool { self.terminal }

    /// Whether shifting in `dir` would move at least one tile. Does not look at
    /// the tile sequence or the terminal flag.
    pub fn can_move(&self, dir: Move) -> bool {
        let trn = dir.traversal();
        (0..BOARD_WIDTH).any(|line| {
            (1..BOARD_WIDTH).any(|j| {
                let idx = trn[line * BOARD_WIDTH + j] as usize;
                let pidx = trn[line * BOARD_WIDTH + j - 1] as usize;
                shift_valid(self.cells[idx], self.cells[pidx])
            })
        })
    }

    /// Shift in `dir` and insert the next tile of `sequence`.
    ///
    /// Returns false when nothing shifted, the sequence is used up, or the
    /// board is already terminal. A failed move leaves cells, cursor and path
    /// untouched but marks the board terminal; terminal boards never move again.
    ///
    /// ```
    /// use threes::engine::{Board, Move};
    /// let seq = [3];
    /// let mut b = Board::new([1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    /// assert!(b.make_move(Move::Left, &seq));
    /// assert_eq!(&b.cells()[..4], &[3, 0, 0, 3]);
    /// assert_eq!(b.cursor(), 1);
    /// assert!(b.is_terminal());
    /// ```
    pub fn make_move(&mut self, dir: Move, sequence: &[Tile]) -> bool {
        if self.terminal || self.cursor >= sequence.len() {
            self.terminal = true;
            return false;
        }

        let trn = dir.traversal();
        let mut next = self.cells;
        let mut shifted: u8 = 0;
        for line in 0..BOARD_WIDTH {
            let mut sliding = false;
            for j in 1..BOARD_WIDTH {
                let idx = trn[line * BOARD_WIDTH + j] as usize;
                let pidx = trn[line * BOARD_WIDTH + j - 1] as usize;
                if sliding {
                    next[pidx] = next[idx];
                    next[idx] = 0;
                } else if shift_valid(next[idx], next[pidx]) {
                    shifted |= 1 << (BOARD_WIDTH - line - 1);
                    sliding = true;
                    next[pidx] += next[idx];
                    next[idx] = 0;
                }
            }
        }

        if shifted == 0 {
            self.terminal = true;
            return false;
        }

        let order = dir.insertion_order();
        let line = insertion_line(&next, shifted, order, dir.inserts_last());
        next[order[line] as usize] = sequence[self.cursor];

        self.cells = next;
        self.cursor += 1;
        self.path.push(dir);
        if self.cursor >= sequence.len() || self.dof() == 0 {
            self.terminal = true;
        }
        true
    }

    /// Apply `moves` in order, stopping at the first one that fails.
    /// Returns how many moves were applied.
    pub fn apply_moves(&mut self, sequence: &[Tile], moves: &[Move]) -> usize {
        moves.iter().take_while(|&&dir| self.make_move(dir, sequence)).count()
    }

    /// Final-game score: sum of [`tile_score`] over all cells.
    pub fn score(&self) -> Score {
        self.cells.iter().map(|&t| tile_score(t)).sum()
    }

    /// Degrees of freedom: how many of the four directions can shift (0-4).
    pub fn dof(&self) -> u32 {
        Move::ALL.iter().filter(|&&dir| self.can_move(dir)).count() as u32
    }

    /// Count the number of empty cells.
    pub fn zeros(&self) -> u32 {
        self.cells.iter().filter(|&&t| t == 0).count() as u32
    }

    /// Non-positive penalty for rows/columns whose elevation alternates up and down.
    pub fn checkerboarding(&self) -> i32 {
        let mut total = 0;
        for order in [&LEFT_ORDER, &UP_ORDER] {
            for line in 0..BOARD_WIDTH {
                let e = |j: usize| elevation(self.cells[order[line * BOARD_WIDTH + j] as usize]);
                let mut last = e(1) - e(0);
                for j in 0..BOARD_WIDTH - 1 {
                    let delta = e(j + 1) - e(j);
                    if delta != 0 {
                        if delta.signum() != last.signum() {
                            total += (delta - last).abs();
                        }
                        last = delta;
                    }
                }
            }
        }
        -total
    }

    /// Non-positive sum of elevation gaps between each occupied cell of the
    /// top-left 3x3 block and its right and lower neighbours.
    pub fn smoothness(&self) -> i32 {
        let mut smoothness = 0;
        for row in 0..BOARD_WIDTH - 1 {
            for col in 0..BOARD_WIDTH - 1 {
                let c = self.cells[row * BOARD_WIDTH + col];
                if c > 0 {
                    let r = self.cells[row * BOARD_WIDTH + col + 1];
                    let d = self.cells[(row + 1) * BOARD_WIDTH + col];
                    smoothness -= (elevation(c) - elevation(r)).abs();
                    smoothness -= (elevation(c) - elevation(d)).abs();
                }
            }
        }
        smoothness
    }

    /// Number of adjacent (row-wise or column-wise) pairs where one tile could
    /// move into the other, merging or sliding into an empty cell.
    pub fn combinable(&self) -> u32 {
        let mut n = 0;
        for row in 0..BOARD_WIDTH {
            for col in 0..BOARD_WIDTH {
                let c = self.cells[row * BOARD_WIDTH + col];
                if col + 1 < BOARD_WIDTH && combines(c, self.cells[row * BOARD_WIDTH + col + 1]) {
                    n += 1;
                }
                if row + 1 < BOARD_WIDTH && combines(c, self.cells[(row + 1) * BOARD_WIDTH + col]) {
                    n += 1;
                }
            }
        }
        n
    }

    /// Return the highest tile value on the board.
    pub fn highest_tile(&self) -> Tile {
        self.cells.iter().copied().max().unwrap_or(0)
    }
}

// Among the shifted lines, keep those whose cells (far edge first, then inward)
// hold the smallest values; a remaining tie goes to the first or last line.
fn insertion_line(cells: &[Tile; BOARD_SPACE], mut lines: u8, order: &Order, last: bool) -> usize {
    for pass in 0..BOARD_WIDTH {
        if lines.is_power_of_two() {
            break;
        }
        let mut min = Tile::MAX;
        for j in 0..BOARD_WIDTH {
            if lines & (1 << j) == 0 {
                continue;
            }
            let v = cells[order[pass * BOARD_WIDTH + j] as usize];
            if v < min {
                min = v;
                lines &= !((1u8 << j) - 1);
            } else if v > min {
                lines ^= 1 << j;
            }
        }
    }
    if last {
        (u8::BITS - 1 - lines.leading_zeros()) as usize
    } else {
        lines.trailing_zeros() as usize
    }
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.cursor == other.cursor && self.cells == other.cells
    }
}

impl Eq for Board {}

impl Hash for Board {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cells.hash(state);
        self.cursor.hash(state);
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("cells", &self.cells)
            .field("cursor", &self.cursor)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(BOARD_WIDTH) {
            for t in row {
                write!(f, "{:3} ", t)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl TryFrom<&[Tile]> for Board {
    type Error = BoardError;
    fn try_from(cells: &[Tile]) -> Result<Self, Self::Error> { Board::from_slice(cells) }
}
