//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 10000;
pub const MAX_SESSIONS: usize = 20;
pub const MAX_GAMES: usize = 10;
/// Seconds between a ping broadcast and the evaluation of its answers.
pub const PING_SLEEP: u64 = 5;
/// Seconds of silence after which a session is evicted as a zombie.
pub const PING_ZOMBIE: u64 = 20;
pub const LOGIN_TIMEOUT: u64 = 10;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Maximum number of logged-in sessions.
    pub max_sessions: usize,
    /// Maximum number of concurrent games.
    pub max_games: usize,
    /// Sleep between the ping broadcast and the liveness evaluation.
    pub ping_interval: Duration,
    /// Silence after which an unresponsive session is evicted.
    pub zombie_timeout: Duration,
    /// How long a fresh connection may take to send its `LOGIN`.
    pub login_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_sessions: MAX_SESSIONS,
            max_games: MAX_GAMES,
            ping_interval: Duration::from_secs(PING_SLEEP),
            zombie_timeout: Duration::from_secs(PING_ZOMBIE),
            login_timeout: Duration::from_secs(LOGIN_TIMEOUT),
        }
    }
}
