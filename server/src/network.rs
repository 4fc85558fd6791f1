//! TCP front end: accept loop, login handshake and per-connection tasks.

use crate::dispatcher::run_session;
use crate::error::LoginError;
use crate::framing::read_line_bounded;
use crate::lobby::Lobby;
use crate::session::ConnectionHandle;
use log::{debug, error, info, warn};
use reversi_shared::{ClientMessage, ServerMessage, MAX_MESSAGE_LEN};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Duration;

pub struct Server {
    listener: TcpListener,
    lobby: Arc<Lobby>,
}

impl Server {
    /// Binds the address from the lobby's configuration.
    pub async fn bind(lobby: Arc<Lobby>) -> io::Result<Self> {
        let listener = TcpListener::bind(lobby.config().bind_addr).await?;
        Ok(Self::with_listener(listener, lobby))
    }

    pub fn with_listener(listener: TcpListener, lobby: Arc<Lobby>) -> Self {
        Self { listener, lobby }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one task each.
    pub async fn run(self) -> io::Result<()> {
        info!("Server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let lobby = Arc::clone(&self.lobby);
                    tokio::spawn(async move {
                        serve_connection(lobby, stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Handles one TCP connection from handshake to close.
pub async fn serve_connection(lobby: Arc<Lobby>, stream: TcpStream, addr: SocketAddr) {
    debug!("Connection from {}", addr);
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let username = match read_login(&mut reader, lobby.config().login_timeout).await {
        Ok(username) => username,
        Err(e) => {
            warn!("Rejected connection from {}: {}", addr, e);
            return;
        }
    };

    let (handle, outbound, shutdown) = ConnectionHandle::new(addr);
    let writer = tokio::spawn(write_messages(write_half, outbound));

    match lobby.login(handle, username).await {
        Ok(id) => run_session(&lobby, id, reader, shutdown).await,
        Err(e) => warn!("Rejected connection from {}: {}", addr, e),
    }

    if let Err(e) = writer.await {
        error!("Writer task for {} failed: {}", addr, e);
    }
    debug!("Connection from {} closed", addr);
}

/// Waits for the `LOGIN;<name>` line that must open every connection.
///
/// Blank lines are skipped. Anything else fails the handshake, and so do
/// a closed stream, a line past `MAX_MESSAGE_LEN` and silence longer than
/// `timeout`.
pub async fn read_login<R>(reader: &mut R, timeout: Duration) -> Result<String, LoginError>
where
    R: AsyncBufRead + Unpin,
{
    let handshake = async {
        let mut buf = Vec::new();
        loop {
            let Some(line) = read_line_bounded(&mut *reader, &mut buf, MAX_MESSAGE_LEN).await? else {
                return Err(LoginError::Closed);
            };
            if line.trim().is_empty() {
                continue;
            }
            return match ClientMessage::parse(&line)? {
                ClientMessage::Login { username } => Ok(username),
                other => Err(LoginError::NotLogin(other.to_string())),
            };
        }
    };

    tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| LoginError::Timeout(timeout))?
}

/// Drains a session's outbound queue into the socket.
///
/// Ends when every sender is gone or a write fails, then shuts the write
/// side down so the client sees the close.
pub async fn write_messages<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(e) = writer.write_all(message.encode().as_bytes()).await {
            debug!("Write failed: {}", e);
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown failed: {}", e);
    }
}
