//! Line-mode client for poking at a running server by hand.
//!
//! Logs in, prints every server line, answers `PING` on its own and sends
//! whatever is typed on stdin (`JOIN_GAME`, `MOVE;0;2`, `LOGOUT`, ...).

use clap::Parser;
use reversi_shared::{ClientMessage, ServerMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:10000")]
    server: String,
    /// Name to log in with
    #[clap(short, long)]
    username: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", stream.peer_addr()?);
    let (read_half, mut write_half) = stream.into_split();

    let login = ClientMessage::Login {
        username: args.username,
    };
    write_half.write_all(login.encode().as_bytes()).await?;

    let mut server_lines = BufReader::new(read_half).lines();
    let mut input_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let Some(line) = line? else {
                    println!("Server closed the connection");
                    break;
                };
                match ServerMessage::parse(&line) {
                    Ok(ServerMessage::Ping) => {
                        write_half.write_all(ClientMessage::Pong.encode().as_bytes()).await?;
                    }
                    Ok(message) => println!("< {}", message),
                    Err(e) => println!("< {} (unparsed: {})", line, e),
                }
            }
            line = input_lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = line.parse::<ClientMessage>() {
                    println!("Warning: {}", e);
                }
                write_half.write_all(format!("{}\n", line).as_bytes()).await?;
            }
        }
    }

    Ok(())
}
