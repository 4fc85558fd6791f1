//! End-to-end tests over real TCP connections.
//!
//! Each test starts its own server on an ephemeral port and drives it with
//! plain line-based clients.

use reversi_server::config::ServerConfig;
use reversi_server::liveness::run_liveness_monitor;
use reversi_server::lobby::Lobby;
use reversi_server::network::Server;
use reversi_shared::{Board, Outcome, Piece, MAX_MESSAGE_LEN};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A line-based client speaking the wire protocol directly
struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn login(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("LOGIN;{}", name)).await;
        client.expect(&format!("LOGIN;{}", name)).await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> io::Result<Option<String>> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for the server")
    }

    /// Asserts the next line from the server
    async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.unwrap().as_deref(), Some(expected));
    }

    /// Answers pings until a different line arrives.
    async fn expect_answering_pings(&mut self, expected: &str) {
        loop {
            let line = self.recv().await.unwrap();
            if line.as_deref() == Some("PING") {
                self.send("PONG").await;
                continue;
            }
            assert_eq!(line.as_deref(), Some(expected));
            return;
        }
    }

    /// Asserts the server closed the connection
    async fn expect_closed(&mut self) {
        match self.recv().await {
            Ok(None) | Err(_) => {}
            Ok(Some(line)) => panic!("expected close, got `{}`", line),
        }
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        max_sessions: 4,
        max_games: 2,
        ..ServerConfig::default()
    }
}

/// Starts a server on an ephemeral port without a liveness monitor
async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<Lobby>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let lobby = Arc::new(Lobby::new(config));
    let server = Server::with_listener(listener, Arc::clone(&lobby));
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, lobby)
}

/// Logs in two clients and pairs them; the first one opens.
async fn start_game(addr: SocketAddr) -> (TestClient, TestClient) {
    let mut alice = TestClient::login(addr, "alice").await;
    let mut bob = TestClient::login(addr, "bob").await;

    alice.send("JOIN_GAME").await;
    alice.expect("JOIN_GAME;R").await;
    bob.send("JOIN_GAME").await;
    bob.expect("JOIN_GAME;B").await;
    bob.expect("START_GAME;alice;R;0").await;
    alice.expect("START_GAME;bob;B;1").await;

    (alice, bob)
}

async fn wait_for_games(lobby: &Lobby, expected: usize) {
    for _ in 0..100 {
        if lobby.game_count().await == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lobby.game_count().await, expected);
}

async fn wait_for_sessions(lobby: &Lobby, expected: usize) {
    for _ in 0..100 {
        if lobby.session_count().await == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lobby.session_count().await, expected);
}

/// LOGIN HANDSHAKE TESTS
mod protocol_tests {
    use super::*;

    /// Tests that a valid LOGIN is echoed back and registers a session
    #[tokio::test]
    async fn login_is_acknowledged() {
        let (addr, lobby) = start_server(test_config()).await;

        let _alice = TestClient::login(addr, "alice").await;
        assert_eq!(lobby.session_count().await, 1);
    }

    /// Tests username truncation to the maximum length
    #[tokio::test]
    async fn long_username_is_truncated() {
        let (addr, _lobby) = start_server(test_config()).await;
        let mut client = TestClient::connect(addr).await;

        client.send(&format!("LOGIN;{}", "z".repeat(32))).await;
        client.expect(&format!("LOGIN;{}", "z".repeat(20))).await;
    }

    /// Tests that a connection opening with anything but LOGIN is closed
    #[tokio::test]
    async fn first_line_must_be_login() {
        let (addr, lobby) = start_server(test_config()).await;
        let mut client = TestClient::connect(addr).await;

        client.send("JOIN_GAME").await;
        client.expect_closed().await;
        assert_eq!(lobby.session_count().await, 0);
    }

    /// Tests blank lines and CRLF terminators before and after login
    #[tokio::test]
    async fn blank_lines_and_crlf_are_tolerated() {
        let (addr, _lobby) = start_server(test_config()).await;
        let mut client = TestClient::connect(addr).await;

        client.send("").await;
        client.send("LOGIN;carol\r").await;
        client.expect("LOGIN;carol").await;
        client.send("").await;
        client.send("JOIN_GAME\r").await;
        client.expect("JOIN_GAME;R").await;
    }

    /// Tests that a line past the length limit closes the connection without a newline ever arriving
    #[tokio::test]
    async fn oversized_line_closes_connection() {
        let (addr, lobby) = start_server(test_config()).await;
        let (mut alice, mut bob) = start_game(addr).await;

        let flood = "A".repeat(4 * MAX_MESSAGE_LEN);
        alice.writer.write_all(flood.as_bytes()).await.unwrap();

        bob.expect("GAME_STATUS;bob").await;
        alice.expect_closed().await;
        wait_for_sessions(&lobby, 1).await;
    }

    /// Tests that a protocol violation only affects the offending connection
    #[tokio::test]
    async fn unknown_command_closes_only_that_connection() {
        let (addr, lobby) = start_server(test_config()).await;
        let (mut alice, mut bob) = start_game(addr).await;
        let mut carol = TestClient::login(addr, "carol").await;

        carol.send("DANCE").await;
        carol.expect_closed().await;
        wait_for_sessions(&lobby, 2).await;

        alice.send("MOVE;0;2").await;
        alice.expect("MOVE;1;0;2").await;
        bob.expect("OPP_MOVE;0;2").await;
    }
}

/// MATCH FLOW TESTS
mod game_flow_tests {
    use super::*;

    /// Tests move acknowledgment, forwarding and every rejection status
    #[tokio::test]
    async fn moves_are_acknowledged_and_forwarded() {
        let (addr, _lobby) = start_server(test_config()).await;
        let (mut alice, mut bob) = start_game(addr).await;

        bob.send("MOVE;0;1").await;
        bob.expect("MOVE;3;0;0").await;

        alice.send("MOVE;0;2").await;
        alice.expect("MOVE;1;0;2").await;
        bob.expect("OPP_MOVE;0;2").await;

        bob.send("MOVE;0;2").await;
        bob.expect("MOVE;5;0;0").await;
        bob.send("MOVE;3;3").await;
        bob.expect("MOVE;4;0;0").await;
        bob.send("MOVE;-1;0").await;
        bob.expect("MOVE;4;0;0").await;
    }

    /// Tests MOVE from a player with no game
    #[tokio::test]
    async fn move_without_game_is_not_found() {
        let (addr, _lobby) = start_server(test_config()).await;
        let mut alice = TestClient::login(addr, "alice").await;

        alice.send("MOVE;0;2").await;
        alice.expect("MOVE;2;0;0").await;
    }

    /// Tests a complete game played to the end against a local board
    #[tokio::test]
    async fn full_game_ends_with_game_status() {
        let (addr, lobby) = start_server(test_config()).await;
        let (alice, bob) = start_game(addr).await;
        let mut players = [(alice, "alice"), (bob, "bob")];

        let mut board = Board::default();
        let mut piece = Piece::First;
        let size = board.size() as i32;

        loop {
            let (x, y) = (0..size * size)
                .map(|i| (i % size, i / size))
                .find(|&(x, y)| board.is_legal(x, y, piece))
                .expect("game in progress without a legal move");
            let (mover, other) = match piece {
                Piece::First => (0, 1),
                Piece::Second => (1, 0),
            };

            players[mover].0.send(&format!("MOVE;{};{}", x, y)).await;
            players[mover].0.expect(&format!("MOVE;1;{};{}", x, y)).await;
            players[other].0.expect(&format!("OPP_MOVE;{};{}", x, y)).await;

            board.apply_move(x, y, piece);
            piece = piece.opponent();

            let result = match board.evaluate(piece) {
                Outcome::InProgress => continue,
                Outcome::Win(Piece::First) => players[0].1,
                Outcome::Win(Piece::Second) => players[1].1,
                Outcome::Draw => "DRAW",
            };
            let status = format!("GAME_STATUS;{}", result);
            players[0].0.expect(&status).await;
            players[1].0.expect(&status).await;
            break;
        }

        wait_for_games(&lobby, 0).await;
        assert_eq!(lobby.session_count().await, 2);

        // Both can queue again.
        players[0].0.send("JOIN_GAME").await;
        players[0].0.expect("JOIN_GAME;R").await;
    }

    /// Tests that LOGOUT during a game hands the win to the opponent
    #[tokio::test]
    async fn logout_forfeits_to_opponent() {
        let (addr, lobby) = start_server(test_config()).await;
        let (mut alice, mut bob) = start_game(addr).await;

        alice.send("LOGOUT").await;
        bob.expect("GAME_STATUS;bob").await;
        alice.expect_closed().await;

        wait_for_games(&lobby, 0).await;
        wait_for_sessions(&lobby, 1).await;
    }

    /// Tests that an abrupt disconnect hands the win to the opponent
    #[tokio::test]
    async fn dropped_connection_forfeits_to_opponent() {
        let (addr, lobby) = start_server(test_config()).await;
        let (alice, mut bob) = start_game(addr).await;

        drop(alice);
        bob.expect("GAME_STATUS;bob").await;

        wait_for_games(&lobby, 0).await;
        wait_for_sessions(&lobby, 1).await;
    }

    /// Tests that two sessions with the same username are never paired
    #[tokio::test]
    async fn same_username_is_not_paired() {
        let (addr, lobby) = start_server(test_config()).await;
        let mut first = TestClient::login(addr, "dave").await;
        let mut second = TestClient::login(addr, "dave").await;

        first.send("JOIN_GAME").await;
        first.expect("JOIN_GAME;R").await;
        second.send("JOIN_GAME").await;
        second.expect("JOIN_GAME;R").await;

        assert_eq!(lobby.game_count().await, 0);
    }
}

/// CAPACITY TESTS
mod capacity_tests {
    use super::*;

    /// Tests the session capacity limit
    #[tokio::test]
    async fn session_limit_rejects_extra_login() {
        let (addr, lobby) = start_server(ServerConfig {
            max_sessions: 1,
            ..test_config()
        })
        .await;
        let _alice = TestClient::login(addr, "alice").await;

        let mut late = TestClient::connect(addr).await;
        late.send("LOGIN;late").await;
        late.expect_closed().await;
        assert_eq!(lobby.session_count().await, 1);
    }

    /// Tests that a full game registry leaves players in the queue
    #[tokio::test]
    async fn game_limit_leaves_requester_waiting() {
        let (addr, lobby) = start_server(ServerConfig {
            max_games: 1,
            ..test_config()
        })
        .await;
        let (_alice, _bob) = start_game(addr).await;
        let mut carol = TestClient::login(addr, "carol").await;
        let mut dave = TestClient::login(addr, "dave").await;

        carol.send("JOIN_GAME").await;
        carol.expect("JOIN_GAME;R").await;
        dave.send("JOIN_GAME").await;
        dave.expect("JOIN_GAME;R").await;

        assert_eq!(lobby.game_count().await, 1);
    }
}

/// LIVENESS TESTS
mod liveness_tests {
    use super::*;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            ping_interval: Duration::from_millis(200),
            zombie_timeout: Duration::from_millis(700),
            ..test_config()
        }
    }

    /// Tests zombie eviction of a player that never answers pings
    #[tokio::test]
    async fn silent_player_is_evicted_and_forfeits() {
        let (addr, lobby) = start_server(fast_config()).await;
        // alice never reads, so she never answers a ping.
        let (_alice, mut bob) = start_game(addr).await;
        tokio::spawn(run_liveness_monitor(Arc::clone(&lobby)));

        bob.expect_answering_pings("OPP_DISCONNECTED").await;
        bob.expect_answering_pings("GAME_STATUS;bob").await;

        wait_for_games(&lobby, 0).await;
        wait_for_sessions(&lobby, 1).await;
    }

    /// Tests that players answering pings are kept
    #[tokio::test]
    async fn responsive_players_stay_connected() {
        let (addr, lobby) = start_server(fast_config()).await;
        let mut alice = TestClient::login(addr, "alice").await;
        tokio::spawn(run_liveness_monitor(Arc::clone(&lobby)));

        for _ in 0..5 {
            alice.expect("PING").await;
            alice.send("PONG").await;
        }

        assert_eq!(lobby.session_count().await, 1);
    }
}
