//! Ping rounds, zombie eviction and reconnect snapshots.
//!
//! One task alternates two phases: ping every session, sleep, then judge
//! each session on whether it answered.

use crate::lobby::{end_session, DisconnectReason, Lobby};
use crate::match_manager::MatchManager;
use crate::session::SessionId;
use crate::session_manager::SessionManager;
use log::{debug, info, warn};
use reversi_shared::{GameResult, ServerMessage};
use std::sync::Arc;

impl Lobby {
    /// Marks every session unanswered and sends it a `PING`.
    pub async fn broadcast_ping(&self) {
        let mut sessions = self.sessions.lock().await;
        for id in sessions.ids() {
            sessions.update_liveness(id, false);
            if let Some(session) = sessions.get(id) {
                session.send(ServerMessage::Ping);
            }
        }
    }

    /// Judges every session on the last ping round.
    ///
    /// Each session gets its own critical section, so a session retired by
    /// its connection task in between is simply skipped.
    pub async fn evaluate_liveness(&self) {
        let ids = self.sessions.lock().await.ids();
        for id in ids {
            let mut sessions = self.sessions.lock().await;
            let mut games = self.games.lock().await;
            self.evaluate_session(&mut sessions, &mut games, id);
        }
    }

    fn evaluate_session(
        &self,
        sessions: &mut SessionManager,
        games: &mut MatchManager,
        id: SessionId,
    ) {
        let Some(session) = sessions.get(id) else {
            return;
        };

        if session.is_zombie(self.config().zombie_timeout) {
            warn!(
                "Session {} ({}) silent for {:?}, evicting",
                id,
                session.username,
                session.last_seen.elapsed()
            );
            end_session(sessions, games, id, DisconnectReason::Zombie);
            return;
        }

        let opponent = session.opponent.filter(|&opp| sessions.contains(opp));

        if session.responded && session.reconnect_pending {
            let game_id = session.game_id;
            let wants_match = session.wants_match;
            if let Some(session) = sessions.get_mut(id) {
                session.reconnect_pending = false;
            }

            if let Some(opp_id) = opponent {
                info!("Session {} is back, resyncing with session {}", id, opp_id);
                send_reconnect(sessions, games, id, opp_id);
            } else if !wants_match {
                if let Some(game_id) = game_id {
                    info!("Session {} is back but game {} was abandoned", id, game_id);
                    games.finish(game_id, None);
                    if let Some(session) = sessions.get(id) {
                        session.send(ServerMessage::GameStatus(GameResult::OppDisconnected));
                    }
                    games.retire_if_finished(game_id);
                }
                sessions.clear_game_state(id);
            }
        } else if !session.responded {
            if !session.reconnect_pending {
                debug!("Session {} missed a ping round", id);
                if let Some(opp) = opponent.and_then(|opp| sessions.get(opp)) {
                    opp.send(ServerMessage::OppDisconnected);
                }
            }
            if let Some(session) = sessions.get_mut(id) {
                session.reconnect_pending = true;
            }
        }
    }
}

/// Sends both players the full game state, each from its own side.
fn send_reconnect(
    sessions: &SessionManager,
    games: &MatchManager,
    id: SessionId,
    opp_id: SessionId,
) {
    let Some(game) = sessions
        .get(id)
        .and_then(|session| session.game_id)
        .and_then(|game_id| games.get(game_id))
    else {
        debug!("Session {} has no game to resync", id);
        return;
    };

    let board = game.board.snapshot();
    let current_turn = match sessions.get(game.to_move()) {
        Some(session) => session.username.clone(),
        None => return,
    };

    for (recipient, other) in [(id, opp_id), (opp_id, id)] {
        let (Some(recipient), Some(other_session), Some(other_piece)) = (
            sessions.get(recipient),
            sessions.get(other),
            game.piece_of(other),
        ) else {
            continue;
        };
        recipient.send(ServerMessage::Reconnect {
            board: board.clone(),
            current_turn: current_turn.clone(),
            opponent: other_session.username.clone(),
            opponent_piece: other_piece,
        });
    }
}

/// Runs ping rounds forever.
pub async fn run_liveness_monitor(lobby: Arc<Lobby>) {
    let interval = lobby.config().ping_interval;
    info!(
        "Liveness monitor started (ping every {:?}, zombie after {:?})",
        interval,
        lobby.config().zombie_timeout
    );

    loop {
        lobby.broadcast_ping().await;
        tokio::time::sleep(interval).await;
        lobby.evaluate_liveness().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::tests::{connect, paired, test_lobby};
    use reversi_shared::Piece;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_ping() {
        let lobby = test_lobby();
        let mut alice = connect(&lobby, 8080, "alice").await;
        alice.drain();

        lobby.broadcast_ping().await;

        assert_eq!(alice.drain(), vec![ServerMessage::Ping]);
        assert!(!lobby.sessions.lock().await.get(alice.id).unwrap().responded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zombie_forfeits_game() {
        let lobby = test_lobby();
        let (mut alice, mut bob) = paired(&lobby).await;

        lobby.broadcast_ping().await;
        lobby.pong(bob.id).await;
        tokio::time::advance(Duration::from_secs(21)).await;
        lobby.evaluate_liveness().await;

        assert_eq!(
            bob.drain(),
            vec![
                ServerMessage::Ping,
                ServerMessage::GameStatus(GameResult::Winner("bob".to_string())),
            ]
        );
        assert!(alice.is_closed());
        assert_eq!(lobby.session_count().await, 1);
        assert_eq!(lobby.game_count().await, 0);
        assert!(!lobby.sessions.lock().await.get(bob.id).unwrap().in_game());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_round_notifies_opponent_once() {
        let lobby = test_lobby();
        let (alice, mut bob) = paired(&lobby).await;

        for _ in 0..2 {
            lobby.broadcast_ping().await;
            lobby.pong(bob.id).await;
            tokio::time::advance(Duration::from_secs(5)).await;
            lobby.evaluate_liveness().await;
        }

        assert_eq!(
            bob.drain(),
            vec![
                ServerMessage::Ping,
                ServerMessage::OppDisconnected,
                ServerMessage::Ping,
            ]
        );
        assert!(lobby.sessions.lock().await.get(alice.id).unwrap().reconnect_pending);
        assert_eq!(lobby.session_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_sends_snapshot_to_both() {
        let lobby = test_lobby();
        let (mut alice, mut bob) = paired(&lobby).await;
        lobby.play_move(alice.id, 0, 2).await;
        alice.drain();
        bob.drain();

        lobby.broadcast_ping().await;
        lobby.pong(bob.id).await;
        lobby.evaluate_liveness().await;

        lobby.broadcast_ping().await;
        lobby.pong(alice.id).await;
        lobby.pong(bob.id).await;
        lobby.evaluate_liveness().await;

        let board = "     RB RRR     ".to_string();
        assert_eq!(
            alice.drain(),
            vec![
                ServerMessage::Ping,
                ServerMessage::Ping,
                ServerMessage::Reconnect {
                    board: board.clone(),
                    current_turn: "bob".to_string(),
                    opponent: "bob".to_string(),
                    opponent_piece: Piece::Second,
                },
            ]
        );
        assert_eq!(
            bob.drain(),
            vec![
                ServerMessage::Ping,
                ServerMessage::OppDisconnected,
                ServerMessage::Ping,
                ServerMessage::Reconnect {
                    board,
                    current_turn: "bob".to_string(),
                    opponent: "alice".to_string(),
                    opponent_piece: Piece::First,
                },
            ]
        );
        assert!(!lobby.sessions.lock().await.get(alice.id).unwrap().reconnect_pending);
        assert_eq!(lobby.game_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_return_to_abandoned_game() {
        let lobby = test_lobby();
        let (mut alice, mut bob) = paired(&lobby).await;

        lobby.broadcast_ping().await;
        lobby.pong(bob.id).await;
        lobby.evaluate_liveness().await;
        lobby.wait_reply(bob.id, false).await;
        assert_eq!(
            bob.drain(),
            vec![
                ServerMessage::Ping,
                ServerMessage::OppDisconnected,
                ServerMessage::GameStatus(GameResult::Draw),
            ]
        );

        lobby.broadcast_ping().await;
        lobby.pong(alice.id).await;
        lobby.pong(bob.id).await;
        lobby.evaluate_liveness().await;

        assert_eq!(
            alice.drain(),
            vec![
                ServerMessage::Ping,
                ServerMessage::Ping,
                ServerMessage::GameStatus(GameResult::OppDisconnected),
            ]
        );
        assert_eq!(lobby.game_count().await, 0);
        assert!(!lobby.sessions.lock().await.get(alice.id).unwrap().in_game());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_comes_back_quietly() {
        let lobby = test_lobby();
        let mut alice = connect(&lobby, 8080, "alice").await;
        alice.drain();

        lobby.broadcast_ping().await;
        lobby.evaluate_liveness().await;
        lobby.broadcast_ping().await;
        lobby.pong(alice.id).await;
        lobby.evaluate_liveness().await;

        assert_eq!(alice.drain(), vec![ServerMessage::Ping, ServerMessage::Ping]);
        assert!(!lobby.sessions.lock().await.get(alice.id).unwrap().reconnect_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_evicts_silent_session() {
        let lobby = Arc::new(test_lobby());
        let alice = connect(&lobby, 8080, "alice").await;
        let monitor = tokio::spawn(run_liveness_monitor(Arc::clone(&lobby)));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(lobby.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(lobby.session_count().await, 0);
        assert!(lobby.sessions.lock().await.get(alice.id).is_none());

        monitor.abort();
    }
}
