//! Match registry: owns every live game and its board.
//!
//! Players are stored as session ids. They are resolved through the session
//! registry by the caller, so a game never keeps a session alive.

use crate::error::RegistryError;
use crate::session::SessionId;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reversi_shared::{Board, MoveError, Outcome, Piece, BOARD_SIZE};
use serde::Serialize;
use std::collections::HashMap;

/// Random, non-zero game identifier.
pub type GameId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameStatus {
    InProgress,
    Finished,
}

/// One match between two sessions and its board.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: GameId,
    pub board: Board,
    /// First player holds `Piece::First` and opens the game.
    players: [SessionId; 2],
    to_move: SessionId,
    pub status: GameStatus,
    /// Meaningful once finished; `None` means a draw.
    pub winner: Option<SessionId>,
}

impl Game {
    pub fn new(id: GameId, first: SessionId, second: SessionId) -> Self {
        Self {
            id,
            board: Board::new(BOARD_SIZE),
            players: [first, second],
            to_move: first,
            status: GameStatus::InProgress,
            winner: None,
        }
    }

    pub fn players(&self) -> [SessionId; 2] {
        self.players
    }

    pub fn to_move(&self) -> SessionId {
        self.to_move
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == GameStatus::InProgress
    }

    pub fn piece_of(&self, player: SessionId) -> Option<Piece> {
        if player == self.players[0] {
            Some(Piece::First)
        } else if player == self.players[1] {
            Some(Piece::Second)
        } else {
            None
        }
    }

    pub fn player_with(&self, piece: Piece) -> SessionId {
        match piece {
            Piece::First => self.players[0],
            Piece::Second => self.players[1],
        }
    }

    pub fn opponent_of(&self, player: SessionId) -> Option<SessionId> {
        self.piece_of(player)
            .map(|piece| self.player_with(piece.opponent()))
    }

    /// Validates and applies a move by `player`, hands the turn over and
    /// runs terminal evaluation against the next mover.
    ///
    /// The board is only touched when every check passes.
    pub fn play(&mut self, player: SessionId, x: i32, y: i32) -> Result<Outcome, MoveError> {
        if !self.is_in_progress() {
            return Err(MoveError::GameNotFound);
        }
        let piece = self.piece_of(player).ok_or(MoveError::GameNotFound)?;
        if player != self.to_move {
            return Err(MoveError::NotYourTurn);
        }

        self.board.check_move(x, y, piece)?;
        let flipped = self.board.apply_move(x, y, piece);
        debug!(
            "Game {}: {} played ({}, {}), flipped {}",
            self.id, piece, x, y, flipped
        );

        self.to_move = self.player_with(piece.opponent());
        Ok(self.evaluate_terminal())
    }

    /// Ends the game if the player to move is stuck, recording the winner.
    pub fn evaluate_terminal(&mut self) -> Outcome {
        let next = self.player_with_turn_piece();
        let outcome = self.board.evaluate(next);
        match outcome {
            Outcome::InProgress => {}
            Outcome::Win(piece) => self.finish(Some(self.player_with(piece))),
            Outcome::Draw => self.finish(None),
        }
        outcome
    }

    fn player_with_turn_piece(&self) -> Piece {
        if self.to_move == self.players[0] {
            Piece::First
        } else {
            Piece::Second
        }
    }

    pub fn finish(&mut self, winner: Option<SessionId>) {
        self.status = GameStatus::Finished;
        self.winner = winner;
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id,
            players: self.players,
            to_move: self.to_move,
            status: self.status,
            winner: self.winner,
            board: self.board.snapshot(),
        }
    }
}

/// Loggable view of a game.
#[derive(Debug, Serialize)]
pub struct GameSummary {
    pub id: GameId,
    pub players: [SessionId; 2],
    pub to_move: SessionId,
    pub status: GameStatus,
    pub winner: Option<SessionId>,
    pub board: String,
}

/// Registry of live games
///
/// Holds at most `max_games` games at once. Ids are drawn at random and
/// never collide with a live game.
pub struct MatchManager {
    games: HashMap<GameId, Game>,
    max_games: usize,
    /// Source of game ids
    rng: StdRng,
}

impl MatchManager {
    /// Creates an empty registry with room for `max_games` games
    pub fn new(max_games: usize) -> Self {
        Self {
            games: HashMap::with_capacity(max_games),
            max_games,
            rng: StdRng::from_entropy(),
        }
    }

    /// Starts a game between two paired sessions. `first` opens.
    pub fn create(&mut self, first: SessionId, second: SessionId) -> Result<GameId, RegistryError> {
        if self.games.len() >= self.max_games {
            return Err(RegistryError::GamesFull(self.max_games));
        }

        let id = self.fresh_id();
        self.games.insert(id, Game::new(id, first, second));
        info!("Game {} created: session {} vs session {}", id, first, second);
        Ok(id)
    }

    /// Random non-zero id that no live game uses.
    fn fresh_id(&mut self) -> GameId {
        loop {
            let id = self.rng.gen_range(1..=GameId::MAX);
            if !self.games.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    pub fn get_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    /// The live game `player` takes part in, if any
    pub fn find_by_player(&self, player: SessionId) -> Option<GameId> {
        self.games
            .values()
            .find(|game| game.players.contains(&player))
            .map(|game| game.id)
    }

    /// Marks a game finished. Returns false if it does not exist.
    pub fn finish(&mut self, id: GameId, winner: Option<SessionId>) -> bool {
        match self.games.get_mut(&id) {
            Some(game) => {
                game.finish(winner);
                true
            }
            None => false,
        }
    }

    /// Removes a game, but only once it is finished.
    pub fn retire_if_finished(&mut self, id: GameId) -> bool {
        let finished = self
            .games
            .get(&id)
            .is_some_and(|game| game.status == GameStatus::Finished);
        if finished {
            self.games.remove(&id);
            info!("Game {} retired", id);
        }
        finished
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn summary(&self) -> Vec<GameSummary> {
        let mut games: Vec<GameSummary> = self.games.values().map(Game::summary).collect();
        games.sort_by_key(|game| game.id);
        games
    }
}
