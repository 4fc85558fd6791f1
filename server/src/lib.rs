//! # Reversi Session Server
//!
//! Hosts two-player Reversi matches over a line-based TCP protocol. Clients
//! log in with a username, ask for a match, and play until one side runs
//! out of moves. Players that drop off briefly are resynced when they come
//! back; players that stay silent are evicted and forfeit.
//!
//! ## Architecture
//!
//! ### Registries
//! [`session_manager::SessionManager`] owns every logged-in session and does
//! matchmaking. [`match_manager::MatchManager`] owns every live game. The two
//! refer to each other's records by id only.
//!
//! ### Lobby
//! [`lobby::Lobby`] puts each registry behind its own lock and is shared by
//! all tasks. The session lock is always taken before the game lock.
//!
//! ### Tasks
//! - **Accept loop** ([`network::Server`]): one task per connection.
//! - **Reader** ([`dispatcher::run_session`]): parses lines and dispatches them.
//! - **Writer** ([`network::write_messages`]): drains the session's outbound queue.
//! - **Liveness monitor** ([`liveness::run_liveness_monitor`]): ping rounds,
//!   reconnect snapshots and zombie eviction.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use reversi_server::config::ServerConfig;
//! use reversi_server::liveness::run_liveness_monitor;
//! use reversi_server::lobby::Lobby;
//! use reversi_server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lobby = Arc::new(Lobby::new(ServerConfig::default()));
//!     tokio::spawn(run_liveness_monitor(Arc::clone(&lobby)));
//!
//!     let server = Server::bind(lobby).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod liveness;
pub mod lobby;
pub mod match_manager;
pub mod network;
pub mod session;
pub mod session_manager;
