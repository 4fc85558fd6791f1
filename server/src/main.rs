use clap::Parser;
use log::{error, info};
use reversi_server::config::{self, ServerConfig};
use reversi_server::liveness::run_liveness_monitor;
use reversi_server::lobby::Lobby;
use reversi_server::network::Server;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Reversi session server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,
    /// Port to listen on
    #[clap(
        short,
        long,
        default_value_t = config::DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,
    /// Maximum number of logged-in players
    #[clap(long, default_value_t = config::MAX_SESSIONS)]
    max_sessions: usize,
    /// Maximum number of concurrent games
    #[clap(long, default_value_t = config::MAX_GAMES)]
    max_games: usize,
    /// Seconds between a ping and the check of its answers
    #[clap(long, default_value_t = config::PING_SLEEP)]
    ping_interval: u64,
    /// Seconds of silence before a player is evicted
    #[clap(long, default_value_t = config::PING_ZOMBIE)]
    zombie_timeout: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: SocketAddr::new(args.host, args.port),
            max_sessions: args.max_sessions,
            max_games: args.max_games,
            ping_interval: Duration::from_secs(args.ping_interval),
            zombie_timeout: Duration::from_secs(args.zombie_timeout),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Hint: set RUST_LOG=info (or debug) to see server logs");
    }
    env_logger::init();

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on {} (max {} players, {} games)",
        config.bind_addr, config.max_sessions, config.max_games
    );

    let lobby = Arc::new(Lobby::new(config));
    let server = Server::bind(Arc::clone(&lobby)).await?;
    let monitor = tokio::spawn(run_liveness_monitor(Arc::clone(&lobby)));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        result = monitor => {
            if let Err(e) = result {
                error!("Liveness monitor panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
