//! Puzzle board with pool-backed tile storage
//!
//! A [`Board`] is an N×N grid of numbered tiles plus one blank. The tile
//! array is not heap-allocated: it lives in a span taken from a shared
//! [`MemoryPool`], sized so that one board fills one pool block. The span is
//! returned to the pool when the board drops.

use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;

use blockpool::{AllocResult, MemoryPool};
use rand::Rng;

/// One slider move, named for the direction the blank travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Blank moves one column left.
    Left,
    /// Blank moves one column right.
    Right,
    /// Blank moves one row up.
    Up,
    /// Blank moves one row down.
    Down,
}

impl Move {
    /// Every move, in the order successor generation tries them.
    pub const ALL: [Move; 4] = [Move::Left, Move::Right, Move::Up, Move::Down];
}

/// An N×N puzzle configuration whose tiles live in a pool span.
#[derive(Debug)]
pub struct Board<'p> {
    pool: &'p MemoryPool,
    tiles: NonNull<u16>,
    side: usize,
    zero_row: usize,
    zero_col: usize,
}

// SAFETY: Board is Send.
// - The tile span is exclusively owned by this board until drop.
// - The pool reference is Send because MemoryPool is Sync.
unsafe impl Send for Board<'_> {}

// SAFETY: Board is Sync.
// - A shared reference only reads the tiles; every mutation of the span
//   goes through `&mut self`.
unsafe impl Sync for Board<'_> {}

impl<'p> Board<'p> {
    /// Bytes of tile storage a board of the given side length needs.
    pub fn tile_bytes(side: usize) -> usize {
        side * side * mem::size_of::<u16>()
    }

    /// Builds the goal configuration: tiles 1.. in row-major order with the
    /// blank in the last slot.
    pub fn goal(pool: &'p MemoryPool, side: usize) -> AllocResult<Self> {
        assert!(side >= 2, "a puzzle needs at least a 2x2 grid");

        // SAFETY: the span holds side*side u16 tiles, is 8-byte aligned,
        // and is released in Drop before the pool can go away.
        let span = unsafe { pool.zero_allocate(side * side, mem::size_of::<u16>())? };
        let tiles = span.cast::<u16>();

        let mut board = Self {
            pool,
            tiles,
            side,
            zero_row: side - 1,
            zero_col: side - 1,
        };

        let count = side * side;
        for (i, tile) in board.tiles_mut().iter_mut().enumerate() {
            *tile = if i + 1 < count { (i + 1) as u16 } else { 0 };
        }

        Ok(board)
    }

    /// Builds a solvable starting configuration by walking the blank
    /// randomly for `complexity` steps from the goal.
    pub fn scrambled<R: Rng>(
        pool: &'p MemoryPool,
        side: usize,
        complexity: usize,
        rng: &mut R,
    ) -> AllocResult<Self> {
        let mut board = Self::goal(pool, side)?;

        for _ in 0..complexity {
            let mv = Move::ALL[rng.gen_range(0..Move::ALL.len())];
            if board.can_apply(mv) {
                board.apply(mv);
            }
        }

        Ok(board)
    }

    /// Deep-copies this board into a fresh pool span.
    pub fn try_clone(&self) -> AllocResult<Self> {
        // SAFETY: same span contract as in `goal`.
        let span = unsafe { self.pool.allocate(Self::tile_bytes(self.side))? };
        let tiles = span.cast::<u16>();
        // SAFETY: both spans cover side*side u16 values and are disjoint.
        unsafe {
            ptr::copy_nonoverlapping(self.tiles.as_ptr(), tiles.as_ptr(), self.side * self.side);
        }

        Ok(Self {
            pool: self.pool,
            tiles,
            side: self.side,
            zero_row: self.zero_row,
            zero_col: self.zero_col,
        })
    }

    /// Side length N of the grid.
    pub fn side(&self) -> usize {
        self.side
    }

    /// The tiles in row-major order; 0 is the blank.
    pub fn tiles(&self) -> &[u16] {
        // SAFETY: the span is live and exclusively ours; the length matches
        // the allocation.
        unsafe { slice::from_raw_parts(self.tiles.as_ptr(), self.side * self.side) }
    }

    fn tiles_mut(&mut self) -> &mut [u16] {
        // SAFETY: as above, plus we hold `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.tiles.as_ptr(), self.side * self.side) }
    }

    /// Whether the blank can travel in the given direction.
    pub fn can_apply(&self, mv: Move) -> bool {
        match mv {
            Move::Left => self.zero_col > 0,
            Move::Right => self.zero_col < self.side - 1,
            Move::Up => self.zero_row > 0,
            Move::Down => self.zero_row < self.side - 1,
        }
    }

    /// Slides the blank in the given direction.
    ///
    /// The caller checks [`can_apply`](Self::can_apply) first.
    pub fn apply(&mut self, mv: Move) {
        debug_assert!(self.can_apply(mv));

        let (row, col) = (self.zero_row, self.zero_col);
        let (to_row, to_col) = match mv {
            Move::Left => (row, col - 1),
            Move::Right => (row, col + 1),
            Move::Up => (row - 1, col),
            Move::Down => (row + 1, col),
        };

        let side = self.side;
        let tiles = self.tiles_mut();
        tiles.swap(row * side + col, to_row * side + to_col);

        self.zero_row = to_row;
        self.zero_col = to_col;
    }

    /// Returns the board one move away, or `None` when the move is illegal.
    pub fn moved(&self, mv: Move) -> AllocResult<Option<Self>> {
        if !self.can_apply(mv) {
            return Ok(None);
        }
        let mut child = self.try_clone()?;
        child.apply(mv);
        Ok(Some(child))
    }

    /// Whether this board is the goal configuration.
    pub fn is_solved(&self) -> bool {
        let count = self.side * self.side;
        self.tiles()
            .iter()
            .enumerate()
            .all(|(i, &tile)| tile as usize == (i + 1) % count)
    }

    /// An owned copy of the tiles, used as the dedup key for visited
    /// configurations.
    pub fn key(&self) -> Box<[u16]> {
        self.tiles().into()
    }

    /// Admissible cost-to-go estimate: Manhattan distance plus two moves per
    /// generalized linear conflict.
    ///
    /// Two tiles conflict when both sit in their goal row (or column) but in
    /// swapped order; resolving each such pair needs at least two moves on
    /// top of the Manhattan distance.
    pub fn heuristic(&self) -> u32 {
        let side = self.side;
        let tiles = self.tiles();

        let mut manhattan = 0u32;
        for row in 0..side {
            for col in 0..side {
                let tile = tiles[row * side + col] as usize;
                if tile == 0 {
                    continue;
                }
                let goal_row = (tile - 1) / side;
                let goal_col = (tile - 1) % side;
                manhattan += (row.abs_diff(goal_row) + col.abs_diff(goal_col)) as u32;
            }
        }

        let mut conflicts = 0u32;

        // Row conflicts: both tiles at home in this row, left one greater.
        for row in 0..side {
            for col in 0..side - 1 {
                let left = tiles[row * side + col] as usize;
                if left == 0 || (left - 1) / side != row {
                    continue;
                }
                for other in col + 1..side {
                    let right = tiles[row * side + other] as usize;
                    if right == 0 || (right - 1) / side != row {
                        continue;
                    }
                    if left > right {
                        conflicts += 1;
                    }
                }
            }
        }

        // Column conflicts, symmetrically.
        for col in 0..side {
            for row in 0..side - 1 {
                let above = tiles[row * side + col] as usize;
                if above == 0 || (above - 1) % side != col {
                    continue;
                }
                for other in row + 1..side {
                    let below = tiles[other * side + col] as usize;
                    if below == 0 || (below - 1) % side != col {
                        continue;
                    }
                    if above > below {
                        conflicts += 1;
                    }
                }
            }
        }

        manhattan + 2 * conflicts
    }
}

impl PartialEq for Board<'_> {
    fn eq(&self, other: &Self) -> bool {
        // Blank position first, it disagrees cheaply.
        self.side == other.side
            && self.zero_row == other.zero_row
            && self.zero_col == other.zero_col
            && self.tiles() == other.tiles()
    }
}

impl Eq for Board<'_> {}

impl fmt::Display for Board<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Two digits cover tiles up to 99, which means sides up to 10.
        let width = if self.side < 11 { 2 } else { 3 };
        for row in 0..self.side {
            for col in 0..self.side {
                write!(f, "{:>width$} ", self.tiles()[row * self.side + col])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Drop for Board<'_> {
    fn drop(&mut self) {
        // SAFETY: the span came from this pool and is released exactly once;
        // the tiles are plain integers with no destructor.
        unsafe { self.pool.release(self.tiles.cast()) };
    }
}
