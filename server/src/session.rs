//! Server-side record of one logged-in client.

use crate::match_manager::GameId;
use log::debug;
use reversi_shared::{Piece, ServerMessage};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

/// Slot id handed out by the session registry. Reused after a session is
/// retired.
pub type SessionId = usize;

/// The transport side of a session.
///
/// Owns the sending half of the connection's outbound queue and the
/// shutdown signal of its reader task. Dropping the handle closes both:
/// the writer flushes what is queued and closes the socket, and the reader
/// stops at its next poll.
#[derive(Debug)]
pub struct ConnectionHandle {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    _shutdown: oneshot::Sender<()>,
}

impl ConnectionHandle {
    /// Creates a handle for the peer at `addr` together with the receiving
    /// ends the connection tasks listen on.
    pub fn new(
        addr: SocketAddr,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<ServerMessage>,
        oneshot::Receiver<()>,
    ) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = Self {
            addr,
            outbound,
            _shutdown: shutdown,
        };
        (handle, outbound_rx, shutdown_rx)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// A logged-in client
///
/// Tracks identity, match state and ping bookkeeping. The record owns its
/// connection handle, so retiring the session closes the connection.
#[derive(Debug)]
pub struct Session {
    /// Slot id assigned by the registry
    pub id: SessionId,
    /// Name sent in LOGIN, trimmed and truncated
    pub username: String,
    /// Game this session plays in, if any.
    pub game_id: Option<GameId>,
    /// The opponent, resolved through the registry on every use.
    pub opponent: Option<SessionId>,
    /// Piece held in the current game
    pub piece: Option<Piece>,
    /// Queued for matchmaking
    pub wants_match: bool,
    /// It is this session's turn
    pub has_move: bool,
    /// Last time the client confirmed it is alive.
    pub last_seen: Instant,
    /// Answered the current ping round.
    pub responded: bool,
    /// Missed a ping round; the next answer triggers a reconnect snapshot.
    pub reconnect_pending: bool,
    connection: ConnectionHandle,
}

impl Session {
    /// Creates an idle session that counts as alive right now
    pub fn new(id: SessionId, username: String, connection: ConnectionHandle) -> Self {
        Self {
            id,
            username,
            game_id: None,
            opponent: None,
            piece: None,
            wants_match: false,
            has_move: false,
            last_seen: Instant::now(),
            responded: true,
            reconnect_pending: false,
            connection,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.connection.addr()
    }

    /// Queues a message for the writer task. Never blocks.
    ///
    /// Returns false if the connection's writer is already gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        debug!("-> {} [{}]: {}", self.username, self.id, message);
        if self.connection.outbound.send(message).is_err() {
            debug!("Session {} outbound queue closed", self.id);
            return false;
        }
        true
    }

    pub fn in_game(&self) -> bool {
        self.game_id.is_some()
    }

    /// Records the outcome of a ping round. A positive answer also
    /// refreshes the last-alive timestamp.
    pub fn mark_alive(&mut self, alive: bool) {
        self.responded = alive;
        if alive {
            self.last_seen = Instant::now();
        }
    }

    /// Checks if the client has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Has not answered this round and has been silent for longer than
    /// `timeout`.
    pub fn is_zombie(&self, timeout: Duration) -> bool {
        !self.responded && self.is_timed_out(timeout)
    }

    pub fn clear_game_state(&mut self) {
        self.game_id = None;
        self.opponent = None;
        self.piece = None;
        self.has_move = false;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            username: self.username.clone(),
            addr: self.addr().to_string(),
            game_id: self.game_id,
            opponent: self.opponent,
            piece: self.piece.map(Piece::as_char),
            wants_match: self.wants_match,
        }
    }
}

/// Loggable view of a session.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub username: String,
    pub addr: String,
    pub game_id: Option<GameId>,
    pub opponent: Option<SessionId>,
    pub piece: Option<char>,
    pub wants_match: bool,
}
