//! Reversi rules engine.
//!
//! The board is stored row-major, so cell `(x, y)` lives at `y * size + x`.
//! Coordinates arrive from the network as signed integers; anything outside
//! the board is simply an illegal move, never a fault.

use crate::{MoveError, Piece, BOARD_SIZE, EMPTY_CHAR};
use serde::{Deserialize, Serialize};

/// Contents of a single board cell.
pub type Cell = Option<Piece>;

/// The eight directions a line of discs can run in.
const DIRECTIONS: [(i32, i32); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Result of terminal evaluation after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Win(Piece),
    Draw,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Creates a board with the standard starting placement: the four
    /// center cells alternate pieces in a checkerboard, everything else
    /// is empty.
    pub fn new(size: usize) -> Self {
        assert!(
            size >= 2 && size % 2 == 0,
            "board size must be even and at least 2"
        );

        let mut board = Self::empty(size);
        let mid = (size / 2) as i32;
        board.set(mid - 1, mid - 1, Some(Piece::First));
        board.set(mid, mid - 1, Some(Piece::Second));
        board.set(mid - 1, mid, Some(Piece::Second));
        board.set(mid, mid, Some(Piece::First));
        board
    }

    fn empty(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    /// Rebuilds a board from its row-major snapshot string, as sent in
    /// `RECONNECT`. Returns `None` if the length or any character is off.
    pub fn from_snapshot(size: usize, snapshot: &str) -> Option<Self> {
        if snapshot.chars().count() != size * size {
            return None;
        }

        let cells = snapshot
            .chars()
            .map(|c| match c {
                EMPTY_CHAR => Some(None),
                other => Piece::from_char(other).map(Some),
            })
            .collect::<Option<Vec<Cell>>>()?;

        Some(Self { size, cells })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let size = self.size as i32;
        if x < 0 || y < 0 || x >= size || y >= size {
            return None;
        }
        Some(y as usize * self.size + x as usize)
    }

    /// Returns the cell at `(x, y)`, or `None` when off the board.
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.index(x, y).map(|i| self.cells[i])
    }

    fn set(&mut self, x: i32, y: i32, cell: Cell) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = cell;
        }
    }

    /// Number of opponent discs that a disc of `piece` at `(x, y)` would
    /// flip in direction `(dx, dy)`. Zero unless the run of opponent discs
    /// is non-empty and closed by one of `piece`'s own discs.
    fn flank_length(&self, x: i32, y: i32, dx: i32, dy: i32, piece: Piece) -> usize {
        let opponent = piece.opponent();
        let (mut nx, mut ny) = (x + dx, y + dy);
        let mut crossed = 0;

        while self.get(nx, ny) == Some(Some(opponent)) {
            crossed += 1;
            nx += dx;
            ny += dy;
        }

        if crossed > 0 && self.get(nx, ny) == Some(Some(piece)) {
            crossed
        } else {
            0
        }
    }

    /// Checks a move without touching the board.
    ///
    /// Off-board targets are `InvalidMove`, occupied targets `FieldTaken`,
    /// and a target that flanks nothing in any direction `InvalidMove`.
    pub fn check_move(&self, x: i32, y: i32, piece: Piece) -> Result<(), MoveError> {
        match self.get(x, y) {
            None => return Err(MoveError::InvalidMove),
            Some(Some(_)) => return Err(MoveError::FieldTaken),
            Some(None) => {}
        }

        let flanks = DIRECTIONS
            .iter()
            .any(|&(dx, dy)| self.flank_length(x, y, dx, dy, piece) > 0);

        if flanks {
            Ok(())
        } else {
            Err(MoveError::InvalidMove)
        }
    }

    pub fn is_legal(&self, x: i32, y: i32, piece: Piece) -> bool {
        self.check_move(x, y, piece).is_ok()
    }

    /// Places `piece` at `(x, y)` and flips every flanked run. Returns the
    /// number of discs flipped.
    ///
    /// The caller must have checked legality first.
    pub fn apply_move(&mut self, x: i32, y: i32, piece: Piece) -> usize {
        debug_assert!(self.is_legal(x, y, piece), "apply_move on illegal move");

        let mut flipped = 0;
        for &(dx, dy) in DIRECTIONS.iter() {
            let run = self.flank_length(x, y, dx, dy, piece);
            for step in 1..=run as i32 {
                self.set(x + dx * step, y + dy * step, Some(piece));
            }
            flipped += run;
        }

        self.set(x, y, Some(piece));
        flipped
    }

    pub fn has_any_legal_move(&self, piece: Piece) -> bool {
        let size = self.size as i32;
        (0..size).any(|y| (0..size).any(|x| self.is_legal(x, y, piece)))
    }

    pub fn count(&self, piece: Piece) -> usize {
        self.cells.iter().filter(|c| **c == Some(piece)).count()
    }

    pub fn empty_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Terminal evaluation, run after every applied move against the piece
    /// that would move next. The game ends only when that piece has no
    /// legal move; the side owning more cells wins.
    pub fn evaluate(&self, next_to_move: Piece) -> Outcome {
        if self.has_any_legal_move(next_to_move) {
            return Outcome::InProgress;
        }

        let first = self.count(Piece::First);
        let second = self.count(Piece::Second);
        if first > second {
            Outcome::Win(Piece::First)
        } else if second > first {
            Outcome::Win(Piece::Second)
        } else {
            Outcome::Draw
        }
    }

    /// Row-major concatenation of every cell character.
    pub fn snapshot(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.map_or(EMPTY_CHAR, Piece::as_char))
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(BOARD_SIZE)
    }
}
