//! Session registry and matchmaking.
//!
//! Owns every logged-in session. Slot ids are handed out lowest-first and
//! reused after retirement. Peers are linked by id only, so retiring a
//! session can never leave another one pointing at freed state.

use crate::error::RegistryError;
use crate::match_manager::MatchManager;
use crate::session::{ConnectionHandle, Session, SessionId, SessionSummary};
use log::{info, warn};
use reversi_shared::{Piece, ServerMessage};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;

/// Registry of logged-in sessions
///
/// Enforces the session capacity and keeps an address index next to the
/// id map so a peer address can be resolved without a scan.
pub struct SessionManager {
    /// Live sessions keyed by slot id
    sessions: BTreeMap<SessionId, Session>,
    /// Reverse index from peer address to slot id
    by_addr: HashMap<SocketAddr, SessionId>,
    /// Unused slot ids; the lowest is handed out next
    free: BTreeSet<SessionId>,
    max_sessions: usize,
}

impl SessionManager {
    /// Creates an empty registry with `max_sessions` slots
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            by_addr: HashMap::with_capacity(max_sessions),
            free: (0..max_sessions).collect(),
            max_sessions,
        }
    }

    /// Adds a freshly logged-in client under the lowest free slot id.
    pub fn register(
        &mut self,
        connection: ConnectionHandle,
        username: String,
    ) -> Result<SessionId, RegistryError> {
        let addr = connection.addr();
        if self.by_addr.contains_key(&addr) {
            return Err(RegistryError::AlreadyRegistered(addr));
        }
        let id = self
            .free
            .pop_first()
            .ok_or(RegistryError::SessionsFull(self.max_sessions))?;

        info!("Session {} logged in as {} from {}", id, username, addr);
        self.by_addr.insert(addr, id);
        self.sessions.insert(id, Session::new(id, username, connection));
        Ok(id)
    }

    /// Looks up a session; `None` means it was retired
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.by_addr.get(&addr).copied()
    }

    /// Checks whether `id` still names a live session
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Ids of every session, ascending.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Number of logged-in sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Puts a session in or out of the match queue
    ///
    /// Returns false if the session does not exist.
    pub fn set_match_request(&mut self, id: SessionId, wants_match: bool) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.wants_match = wants_match;
                true
            }
            None => false,
        }
    }

    /// Looks for an opponent for `id` and, on success, starts a game.
    ///
    /// The candidate must be another user, have no game, and be waiting for
    /// one. It becomes the first player, is told the game started, and gets
    /// the opening move. Returns the candidate's id, or `None` when nobody
    /// is waiting or the match registry is full.
    pub fn find_and_pair(&mut self, id: SessionId, games: &mut MatchManager) -> Option<SessionId> {
        let requester = self.sessions.get(&id)?;
        if requester.in_game() {
            return None;
        }
        let requester_name = requester.username.clone();

        let found = self
            .sessions
            .values()
            .find(|s| {
                s.id != id && s.username != requester_name && !s.in_game() && s.wants_match
            })
            .map(|s| s.id)?;

        let game_id = match games.create(found, id) {
            Ok(game_id) => game_id,
            Err(e) => {
                warn!("Cannot pair session {} with session {}: {}", id, found, e);
                return None;
            }
        };

        if let Some(first) = self.sessions.get_mut(&found) {
            first.game_id = Some(game_id);
            first.opponent = Some(id);
            first.piece = Some(Piece::First);
            first.has_move = true;
            first.wants_match = false;
            first.send(ServerMessage::StartGame {
                opponent: requester_name,
                opponent_piece: Piece::Second,
                moves_first: true,
            });
        }
        if let Some(second) = self.sessions.get_mut(&id) {
            second.game_id = Some(game_id);
            second.opponent = Some(found);
            second.piece = Some(Piece::Second);
            second.has_move = false;
            second.wants_match = false;
        }

        info!("Paired session {} with session {} in game {}", found, id, game_id);
        Some(found)
    }

    /// Drops a session's game, opponent, piece and turn
    ///
    /// The match queue flag is left alone. Returns false if the session does
    /// not exist.
    pub fn clear_game_state(&mut self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.clear_game_state();
                true
            }
            None => false,
        }
    }

    /// Records a session's answer, or lack of one, for the current ping round
    ///
    /// Returns false if the session does not exist.
    pub fn update_liveness(&mut self, id: SessionId, alive: bool) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.mark_alive(alive);
                true
            }
            None => false,
        }
    }

    /// Removes a session and frees its slot.
    ///
    /// Any session still naming it as opponent loses that reference. The
    /// returned record owns the connection handle; dropping it closes the
    /// connection. `None` if the session was already gone.
    pub fn retire(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_addr.remove(&session.addr());
        self.free.insert(id);

        for other in self.sessions.values_mut() {
            if other.opponent == Some(id) {
                other.opponent = None;
            }
        }

        info!("Session {} ({}) removed", id, session.username);
        Some(session)
    }

    /// Loggable view of every session, in id order
    pub fn summary(&self) -> Vec<SessionSummary> {
        self.sessions.values().map(Session::summary).collect()
    }
}
