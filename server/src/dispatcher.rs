//! Per-connection protocol state machine.
//!
//! After the login handshake each connection runs [`run_session`], which
//! reads one line at a time and hands parsed messages to the lobby. A
//! malformed line is fatal to the connection; a rejected move is not.

use crate::error::LineError;
use crate::framing::read_line_bounded;
use crate::lobby::{log_registries, DisconnectReason, Lobby};
use crate::session::SessionId;
use log::{debug, info, warn};
use reversi_shared::{
    ClientMessage, GameResult, MoveError, Outcome, Piece, ServerMessage, MAX_MESSAGE_LEN,
};
use tokio::io::AsyncBufRead;
use tokio::sync::oneshot;

/// Whether the read loop keeps going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Lobby {
    /// Routes one parsed client message.
    pub async fn dispatch(&self, id: SessionId, message: ClientMessage) -> Flow {
        match message {
            ClientMessage::JoinGame => self.join_game(id).await,
            ClientMessage::Move { x, y } => self.play_move(id, x, y).await,
            ClientMessage::Pong => self.pong(id).await,
            ClientMessage::WaitReply { wait } => self.wait_reply(id, wait).await,
            ClientMessage::Logout => {
                self.logout(id).await;
                return Flow::Stop;
            }
            ClientMessage::Login { username } => {
                warn!("Session {} sent a second LOGIN ({})", id, username);
                self.disconnect(id, DisconnectReason::ProtocolViolation).await;
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Puts the session in the match queue and tries to pair it at once.
    ///
    /// Replies `JOIN_GAME;R` when left waiting. When paired the caller is
    /// the second player and gets `JOIN_GAME;B` followed by `START_GAME`.
    pub async fn join_game(&self, id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        let mut games = self.games.lock().await;

        match sessions.get(id) {
            None => return,
            Some(session) if session.in_game() => {
                warn!(
                    "Session {} asked for a game while in game {:?}",
                    id, session.game_id
                );
                return;
            }
            Some(_) => {}
        }

        sessions.set_match_request(id, true);
        let found = sessions.find_and_pair(id, &mut games);

        let opponent_name = found.and_then(|f| sessions.get(f)).map(|f| f.username.clone());
        let Some(session) = sessions.get(id) else {
            return;
        };
        match opponent_name {
            Some(opponent) => {
                session.send(ServerMessage::JoinGame {
                    piece: Piece::Second,
                });
                session.send(ServerMessage::StartGame {
                    opponent,
                    opponent_piece: Piece::First,
                    moves_first: false,
                });
            }
            None => {
                info!("Session {} ({}) is waiting for an opponent", id, session.username);
                session.send(ServerMessage::JoinGame {
                    piece: Piece::First,
                });
            }
        }
    }

    /// Validates and applies a move, then scores the game if it is over.
    pub async fn play_move(&self, id: SessionId, x: i32, y: i32) {
        let mut sessions = self.sessions.lock().await;
        let mut games = self.games.lock().await;

        let Some(session) = sessions.get(id) else {
            return;
        };
        let linked = session.game_id.zip(session.opponent);

        let played = match linked {
            Some((game_id, opponent)) => match games.get_mut(game_id) {
                Some(game) => game
                    .play(id, x, y)
                    .map(|outcome| (game_id, opponent, outcome)),
                None => Err(MoveError::GameNotFound),
            },
            None => Err(MoveError::GameNotFound),
        };

        let (game_id, opponent, outcome) = match played {
            Ok(played) => played,
            Err(e) => {
                debug!("Session {} move ({}, {}) rejected: {}", id, x, y, e);
                session.send(ServerMessage::move_rejected(e));
                return;
            }
        };

        session.send(ServerMessage::move_accepted(x, y));
        if let Some(opp) = sessions.get(opponent) {
            opp.send(ServerMessage::OppMove { x, y });
        }
        if let Some(mover) = sessions.get_mut(id) {
            mover.has_move = false;
        }
        if let Some(opp) = sessions.get_mut(opponent) {
            opp.has_move = true;
        }

        if outcome == Outcome::InProgress {
            return;
        }

        let result = match games.get(game_id).and_then(|game| game.winner) {
            Some(winner) => match sessions.get(winner) {
                Some(session) => GameResult::Winner(session.username.clone()),
                None => GameResult::Draw,
            },
            None => GameResult::Draw,
        };
        info!("Game {} over: {}", game_id, result);

        for player in [id, opponent] {
            if let Some(session) = sessions.get(player) {
                session.send(ServerMessage::GameStatus(result.clone()));
            }
            sessions.clear_game_state(player);
        }
        games.retire_if_finished(game_id);
        log_registries(&sessions, &games);
    }

    /// Graceful disconnect. Forfeits a running game.
    pub async fn logout(&self, id: SessionId) {
        self.disconnect(id, DisconnectReason::Logout).await;
    }

    pub async fn pong(&self, id: SessionId) {
        self.sessions.lock().await.update_liveness(id, true);
    }

    /// Answer to `OPP_DISCONNECTED`.
    ///
    /// Only meaningful while the opponent is flagged unresponsive. Leaving
    /// ends the match for the caller as a draw; the game itself is retired
    /// once the opponent either comes back or is evicted.
    pub async fn wait_reply(&self, id: SessionId, wait: bool) {
        let mut sessions = self.sessions.lock().await;

        let Some(session) = sessions.get(id) else {
            return;
        };
        let Some(opp_id) = session.opponent else {
            debug!("Session {} sent WAIT_REPLY without an opponent", id);
            return;
        };
        if !sessions.get(opp_id).is_some_and(|opp| opp.reconnect_pending) {
            debug!("Session {} sent WAIT_REPLY while opponent is responsive", id);
            return;
        }

        if wait {
            info!("Session {} keeps waiting for session {}", id, opp_id);
            return;
        }

        info!("Session {} leaves its game with session {}", id, opp_id);
        session.send(ServerMessage::GameStatus(GameResult::Draw));
        if let Some(opp) = sessions.get_mut(opp_id) {
            opp.opponent = None;
        }
        sessions.clear_game_state(id);
    }
}

/// Drives one logged-in connection until it ends.
///
/// Stops when the client logs out, the stream ends or fails, a line cannot
/// be parsed or runs past `MAX_MESSAGE_LEN`, or the session is retired
/// elsewhere (`shutdown` fires).
pub async fn run_session<R>(
    lobby: &Lobby,
    id: SessionId,
    mut reader: R,
    mut shutdown: oneshot::Receiver<()>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Session {} closed by the server", id);
                break;
            }
            line = read_line_bounded(&mut reader, &mut buf, MAX_MESSAGE_LEN) => {
                let reason = match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match ClientMessage::parse(&line) {
                            Ok(message) => {
                                debug!("<- [{}]: {}", id, message);
                                if lobby.dispatch(id, message).await == Flow::Stop {
                                    break;
                                }
                                continue;
                            }
                            Err(e) => {
                                warn!("Session {} sent `{}`: {}", id, line, e);
                                DisconnectReason::ProtocolViolation
                            }
                        }
                    }
                    Ok(None) => DisconnectReason::EndOfStream,
                    Err(LineError::Protocol(e)) => {
                        warn!("Session {} sent an unreadable line: {}", id, e);
                        DisconnectReason::ProtocolViolation
                    }
                    Err(LineError::Io(e)) => {
                        warn!("Session {} read failed: {}", id, e);
                        DisconnectReason::ReadError
                    }
                };
                lobby.disconnect(id, reason).await;
                break;
            }
        }
    }
}
