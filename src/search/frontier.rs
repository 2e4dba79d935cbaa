use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use ahash::RandomState;

use crate::engine::{Board, Tile, BOARD_SPACE};

type BoardKey = ([Tile; BOARD_SPACE], usize);

#[inline]
fn key(board: &Board) -> BoardKey {
    (*board.cells(), board.cursor())
}

struct Entry {
    rank: i64,
    board: Board,
}

impl Ord for Entry {
    // Rank first; board contents only break ties so equal ranks never collapse.
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.board.cells().cmp(other.board.cells()))
            .then_with(|| self.board.cursor().cmp(&other.board.cursor()))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Entry {}

/// Capacity-limited set of boards ordered by rank.
///
/// Inserting past capacity evicts the lowest-ranked entries. A board equal to
/// one already present (same cells and cursor) is not inserted again.
///
/// ```
/// use threes::engine::Board;
/// use threes::search::BoundedFrontier;
///
/// let mut f = BoundedFrontier::new(2);
/// let a = Board::new([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
/// let b = Board::new([2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
/// let c = Board::new([3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
/// f.insert(a, 10);
/// f.insert(b, 30);
/// f.insert(c, 20);
/// assert_eq!(f.len(), 2);
/// assert_eq!(f.pop_best().unwrap().tile(0), 2);
/// assert_eq!(f.pop_best().unwrap().tile(0), 3);
/// ```
pub struct BoundedFrontier {
    entries: BTreeSet<Entry>,
    members: HashSet<BoardKey, RandomState>,
    capacity: usize,
}

impl BoundedFrontier {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: BTreeSet::new(),
            members: HashSet::with_capacity_and_hasher(capacity + 1, RandomState::new()),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize { self.capacity }

    #[inline]
    pub fn len(&self) -> usize { self.entries.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn contains(&self, board: &Board) -> bool {
        self.members.contains(&key(board))
    }

    /// Insert one board. Returns whether it is present afterwards; false for
    /// duplicates and for boards ranked too low to survive eviction.
    pub fn insert(&mut self, board: Board, rank: i64) -> bool {
        let k = key(&board);
        if !self.push(board, rank) {
            return false;
        }
        self.evict();
        self.members.contains(&k)
    }

    /// Insert many boards, evicting once at the end.
    pub fn extend<I>(&mut self, ranked: I)
    where
        I: IntoIterator<Item = (Board, i64)>,
    {
        for (board, rank) in ranked {
            self.push(board, rank);
        }
        self.evict();
    }

    /// Move every entry of `other` into this frontier, keeping its ranks.
    pub fn merge(&mut self, other: BoundedFrontier) {
        self.extend(other.into_sorted_vec());
    }

    /// Remove and return the highest-ranked board.
    pub fn pop_best(&mut self) -> Option<Board> {
        let entry = self.entries.pop_last()?;
        self.members.remove(&key(&entry.board));
        Some(entry.board)
    }

    /// Highest-ranked board and its rank.
    pub fn peek_best(&self) -> Option<(&Board, i64)> {
        self.entries.last().map(|e| (&e.board, e.rank))
    }

    /// Discard the lower-ranked half (`len / 2` entries). Returns how many were dropped.
    pub fn drop_lower_half(&mut self) -> usize {
        let drop = self.entries.len() / 2;
        for _ in 0..drop {
            if let Some(entry) = self.entries.pop_first() {
                self.members.remove(&key(&entry.board));
            }
        }
        drop
    }

    /// Entries from best to worst.
    pub fn iter(&self) -> impl Iterator<Item = (&Board, i64)> + '_ {
        self.entries.iter().rev().map(|e| (&e.board, e.rank))
    }

    /// Consume into `(board, rank)` pairs, best first.
    pub fn into_sorted_vec(self) -> Vec<(Board, i64)> {
        self.entries.into_iter().rev().map(|e| (e.board, e.rank)).collect()
    }

    fn push(&mut self, board: Board, rank: i64) -> bool {
        if !self.members.insert(key(&board)) {
            return false;
        }
        self.entries.insert(Entry { rank, board });
        true
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            match self.entries.pop_first() {
                Some(entry) => {
                    self.members.remove(&key(&entry.board));
                }
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for BoundedFrontier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedFrontier")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("best_rank", &self.peek_best().map(|(_, r)| r))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Move;

    fn board_with(first: Tile) -> Board {
        let mut cells = [0; 16];
        cells[0] = first;
        cells[5] = 3;
        Board::new(cells).unwrap()
    }

    fn distinct_boards(n: usize) -> Vec<Board> {
        let tiles = [1, 2, 3, 6, 12, 24, 48, 96, 192, 384, 768, 1536];
        let mut out = Vec::new();
        for &a in &tiles {
            for &b in &tiles {
                let mut cells = [0; 16];
                cells[0] = a;
                cells[15] = b;
                out.push(Board::new(cells).unwrap());
                if out.len() == n {
                    return out;
                }
            }
        }
        out
    }

    #[test]
    fn it_keeps_highest_ranks() {
        let mut f = BoundedFrontier::new(3);
        for (i, b) in distinct_boards(10).into_iter().enumerate() {
            f.insert(b, i as i64);
            assert!(f.len() <= 3);
        }
        let ranks: Vec<i64> = f.iter().map(|(_, r)| r).collect();
        assert_eq!(ranks, vec![9, 8, 7]);
        assert_eq!(f.peek_best().map(|(_, r)| r), Some(9));
    }

    #[test]
    fn it_reports_evicted_insert() {
        let mut f = BoundedFrontier::new(1);
        assert!(f.insert(board_with(1), 5));
        assert!(!f.insert(board_with(2), 1));
        assert!(f.insert(board_with(3), 9));
        assert_eq!(f.len(), 1);
        assert!(f.contains(&board_with(3)));
        assert!(!f.contains(&board_with(1)));
    }

    #[test]
    fn it_deduplicates_by_cells_and_cursor() {
        let mut f = BoundedFrontier::new(10);
        assert!(f.insert(board_with(1), 5));
        assert!(!f.insert(board_with(1), 50));
        assert_eq!(f.len(), 1);
        assert_eq!(f.peek_best().map(|(_, r)| r), Some(5));

        // Same cells reached by different paths are still one entry.
        let seq = [1, 1];
        let mut a = Board::new([0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let mut b = a.clone();
        assert!(a.make_move(Move::Left, &seq));
        assert!(b.make_move(Move::Left, &seq));
        assert!(f.insert(a, 7));
        assert!(!f.insert(b, 7));
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn it_keeps_distinct_boards_with_equal_rank() {
        let mut f = BoundedFrontier::new(10);
        for b in distinct_boards(4) {
            assert!(f.insert(b, 42));
        }
        assert_eq!(f.len(), 4);
    }

    #[test]
    fn it_extends_and_merges_within_capacity() {
        let boards = distinct_boards(20);
        let mut f = BoundedFrontier::new(5);
        f.extend(boards[..8].iter().cloned().enumerate().map(|(i, b)| (b, i as i64)));
        assert_eq!(f.len(), 5);

        let mut g = BoundedFrontier::new(5);
        g.extend(boards[8..].iter().cloned().enumerate().map(|(i, b)| (b, 100 + i as i64)));
        f.merge(g);
        assert_eq!(f.len(), 5);
        let ranks: Vec<i64> = f.iter().map(|(_, r)| r).collect();
        assert_eq!(ranks, vec![111, 110, 109, 108, 107]);
    }

    #[test]
    fn it_pops_in_rank_order_and_forgets_popped() {
        let boards = distinct_boards(4);
        let mut f = BoundedFrontier::new(4);
        f.extend(boards.iter().cloned().zip([3, 1, 4, 2]));
        let first = f.pop_best().unwrap();
        assert_eq!(first, boards[2]);
        assert!(!f.contains(&first));
        // A popped board may come back later.
        assert!(f.insert(first, 0));
        let order: Vec<i64> = f.into_sorted_vec().into_iter().map(|(_, r)| r).collect();
        assert_eq!(order, vec![3, 2, 1, 0]);
    }

    #[test]
    fn it_drops_lower_half() {
        let mut f = BoundedFrontier::new(10);
        f.extend(distinct_boards(7).into_iter().enumerate().map(|(i, b)| (b, i as i64)));
        assert_eq!(f.drop_lower_half(), 3);
        assert_eq!(f.len(), 4);
        assert_eq!(f.capacity(), 10);
        let ranks: Vec<i64> = f.iter().map(|(_, r)| r).collect();
        assert_eq!(ranks, vec![6, 5, 4, 3]);

        let mut empty = BoundedFrontier::new(3);
        assert_eq!(empty.drop_lower_half(), 0);
        assert!(empty.pop_best().is_none());
    }

    #[test]
    fn it_clamps_zero_capacity() {
        let mut f = BoundedFrontier::new(0);
        assert_eq!(f.capacity(), 1);
        f.extend(distinct_boards(3).into_iter().map(|b| (b, 1)));
        assert_eq!(f.len(), 1);
    }
}
