//! The coordinator shared by every connection task and the liveness monitor.
//!
//! Both registries sit behind their own lock. Every operation that needs
//! both takes the session lock first and the game lock second, and does all
//! of its work inside that one critical section. Sending only pushes onto a
//! session's outbound queue, so it is safe under either lock.

use crate::config::ServerConfig;
use crate::error::RegistryError;
use crate::match_manager::MatchManager;
use crate::session::{ConnectionHandle, Session, SessionId};
use crate::session_manager::SessionManager;
use log::{debug, info, log_enabled, Level};
use reversi_shared::{GameResult, ServerMessage};
use std::fmt;
use tokio::sync::Mutex;

/// How a session came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Logout,
    EndOfStream,
    ReadError,
    ProtocolViolation,
    Zombie,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DisconnectReason::Logout => "logout",
            DisconnectReason::EndOfStream => "connection closed",
            DisconnectReason::ReadError => "read error",
            DisconnectReason::ProtocolViolation => "protocol violation",
            DisconnectReason::Zombie => "no ping response",
        };
        f.write_str(reason)
    }
}

/// Shared server state
///
/// Handed to every connection task and to the liveness monitor behind an
/// `Arc`. Lock `sessions` before `games` whenever both are needed.
pub struct Lobby {
    /// Session registry, locked first
    pub(crate) sessions: Mutex<SessionManager>,
    /// Match registry, locked second
    pub(crate) games: Mutex<MatchManager>,
    config: ServerConfig,
}

impl Lobby {
    /// Creates empty registries sized from `config`
    pub fn new(config: ServerConfig) -> Self {
        Self {
            sessions: Mutex::new(SessionManager::new(config.max_sessions)),
            games: Mutex::new(MatchManager::new(config.max_games)),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registers a client that completed the handshake and acknowledges
    /// the login.
    pub async fn login(
        &self,
        connection: ConnectionHandle,
        username: String,
    ) -> Result<SessionId, RegistryError> {
        let mut sessions = self.sessions.lock().await;
        let id = sessions.register(connection, username)?;
        if let Some(session) = sessions.get(id) {
            session.send(ServerMessage::Login {
                username: session.username.clone(),
            });
        }
        Ok(id)
    }

    /// Ends a session from its own connection task. Returns false if it was
    /// already retired by someone else.
    pub async fn disconnect(&self, id: SessionId, reason: DisconnectReason) -> bool {
        let mut sessions = self.sessions.lock().await;
        let mut games = self.games.lock().await;
        end_session(&mut sessions, &mut games, id, reason).is_some()
    }

    /// Number of logged-in sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Number of live games
    pub async fn game_count(&self) -> usize {
        self.games.lock().await.len()
    }
}

/// Tears a session down. Must run with both locks held.
///
/// A session in a game forfeits it: the opponent is told it won, the game
/// is finished and retired, and the opponent's game state is cleared. The
/// same happens whatever the reason. Returns the retired record, or `None`
/// if the session was already gone.
pub(crate) fn end_session(
    sessions: &mut SessionManager,
    games: &mut MatchManager,
    id: SessionId,
    reason: DisconnectReason,
) -> Option<Session> {
    let session = sessions.get(id)?;
    let game_id = session.game_id;
    let opponent = session.opponent.filter(|&opp| sessions.contains(opp));

    if let Some(opp_id) = opponent {
        if let Some(opp) = sessions.get(opp_id) {
            info!(
                "{} wins game {:?} by forfeit of {}",
                opp.username, game_id, session.username
            );
            opp.send(ServerMessage::GameStatus(GameResult::Winner(
                opp.username.clone(),
            )));
        }
        sessions.clear_game_state(opp_id);
    }

    if let Some(game_id) = game_id {
        games.finish(game_id, opponent);
        games.retire_if_finished(game_id);
    }

    let retired = sessions.retire(id);
    if let Some(session) = &retired {
        info!(
            "Session {} ({}) ended: {}",
            session.id, session.username, reason
        );
    }
    log_registries(sessions, games);
    retired
}

/// Dumps both registries at debug level.
pub(crate) fn log_registries(sessions: &SessionManager, games: &MatchManager) {
    if !log_enabled!(Level::Debug) {
        return;
    }
    match serde_json::to_string(&sessions.summary()) {
        Ok(json) => debug!("Sessions: {}", json),
        Err(e) => debug!("Cannot list sessions: {}", e),
    }
    match serde_json::to_string(&games.summary()) {
        Ok(json) => debug!("Games: {}", json),
        Err(e) => debug!("Cannot list games: {}", e),
    }
}
