//! Types shared by the Reversi server and its clients: the board with its
//! rules, and the line-based wire protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod board;
pub mod protocol;

pub use board::{Board, Cell, Outcome};
pub use protocol::{ClientMessage, GameResult, MoveStatus, ProtocolError, ServerMessage};

pub const BOARD_SIZE: usize = 4;
pub const MAX_USERNAME_LEN: usize = 20;
pub const MAX_MESSAGE_LEN: usize = 1024;

pub const FIRST_PIECE_CHAR: char = 'R';
pub const SECOND_PIECE_CHAR: char = 'B';
pub const EMPTY_CHAR: char = ' ';

pub const FIELD_DELIMITER: char = ';';

/// The marker a player places on the board.
///
/// `First` belongs to the player who was waiting when the match was made
/// and always moves first.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Piece {
    First,
    Second,
}

impl Piece {
    pub fn as_char(self) -> char {
        match self {
            Piece::First => FIRST_PIECE_CHAR,
            Piece::Second => SECOND_PIECE_CHAR,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            FIRST_PIECE_CHAR => Some(Piece::First),
            SECOND_PIECE_CHAR => Some(Piece::Second),
            _ => None,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Piece::First => Piece::Second,
            Piece::Second => Piece::First,
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Why a move attempt was refused.
///
/// None of these end the connection; each one is reported back to the
/// mover with its status digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("no active game")]
    GameNotFound,
    #[error("not your turn")]
    NotYourTurn,
    #[error("move is not legal")]
    InvalidMove,
    #[error("field is already taken")]
    FieldTaken,
}
