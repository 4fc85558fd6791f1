//! Line-based wire protocol.
//!
//! Every message is a `;`-separated list of fields terminated by `\n`. The
//! first field names the message. Field values never contain `;` or `\n`.

use crate::{MoveError, Piece, FIELD_DELIMITER, MAX_MESSAGE_LEN, MAX_USERNAME_LEN};
use std::fmt;
use std::num::IntErrorKind;
use std::str::{FromStr, Split};

pub const LOGIN: &str = "LOGIN";
pub const JOIN_GAME: &str = "JOIN_GAME";
pub const START_GAME: &str = "START_GAME";
pub const MOVE: &str = "MOVE";
pub const OPP_MOVE: &str = "OPP_MOVE";
pub const LOGOUT: &str = "LOGOUT";
pub const PING: &str = "PING";
pub const PONG: &str = "PONG";
pub const GAME_STATUS: &str = "GAME_STATUS";
pub const OPP_DISCONNECTED: &str = "OPP_DISCONNECTED";
pub const WAIT_REPLY: &str = "WAIT_REPLY";
pub const RECONNECT: &str = "RECONNECT";

pub const WAIT: &str = "WAIT";
pub const DRAW: &str = "DRAW";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("message exceeds the maximum line length")]
    TooLong,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("{command} is missing field `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
    #[error("{command} has unexpected trailing fields")]
    UnexpectedField { command: &'static str },
    #[error("invalid {field} `{value}` in {command}")]
    InvalidField {
        command: &'static str,
        field: &'static str,
        value: String,
    },
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Login { username: String },
    JoinGame,
    Move { x: i32, y: i32 },
    Logout,
    Pong,
    /// Answer to `OPP_DISCONNECTED`: keep waiting for the opponent or not.
    WaitReply { wait: bool },
}

/// Outcome of a move attempt as reported in `MOVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    Accepted,
    Rejected(MoveError),
}

impl MoveStatus {
    pub fn code(self) -> u8 {
        match self {
            MoveStatus::Accepted => 1,
            MoveStatus::Rejected(MoveError::GameNotFound) => 2,
            MoveStatus::Rejected(MoveError::NotYourTurn) => 3,
            MoveStatus::Rejected(MoveError::InvalidMove) => 4,
            MoveStatus::Rejected(MoveError::FieldTaken) => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MoveStatus::Accepted),
            2 => Some(MoveStatus::Rejected(MoveError::GameNotFound)),
            3 => Some(MoveStatus::Rejected(MoveError::NotYourTurn)),
            4 => Some(MoveStatus::Rejected(MoveError::InvalidMove)),
            5 => Some(MoveStatus::Rejected(MoveError::FieldTaken)),
            _ => None,
        }
    }
}

/// How a match concluded, as carried by `GAME_STATUS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameResult {
    Winner(String),
    Draw,
    OppDisconnected,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Winner(name) => write!(f, "{}", name),
            GameResult::Draw => write!(f, "{}", DRAW),
            GameResult::OppDisconnected => write!(f, "{}", OPP_DISCONNECTED),
        }
    }
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Login {
        username: String,
    },
    JoinGame {
        piece: Piece,
    },
    /// `moves_first` is `true` for the recipient that holds the first move.
    StartGame {
        opponent: String,
        opponent_piece: Piece,
        moves_first: bool,
    },
    Move {
        status: MoveStatus,
        x: i32,
        y: i32,
    },
    OppMove {
        x: i32,
        y: i32,
    },
    GameStatus(GameResult),
    OppDisconnected,
    Reconnect {
        board: String,
        current_turn: String,
        opponent: String,
        opponent_piece: Piece,
    },
    Ping,
}

impl ServerMessage {
    pub fn move_accepted(x: i32, y: i32) -> Self {
        ServerMessage::Move {
            status: MoveStatus::Accepted,
            x,
            y,
        }
    }

    /// Rejections carry zeroed coordinates.
    pub fn move_rejected(error: MoveError) -> Self {
        ServerMessage::Move {
            status: MoveStatus::Rejected(error),
            x: 0,
            y: 0,
        }
    }

    /// The message as it goes on the wire, newline included.
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields = split_line(line)?;
        let command = fields.next().unwrap_or_default();

        let message = match command {
            LOGIN => ServerMessage::Login {
                username: next_field(&mut fields, LOGIN, "username")?.to_string(),
            },
            JOIN_GAME => ServerMessage::JoinGame {
                piece: parse_piece(next_field(&mut fields, JOIN_GAME, "piece")?, JOIN_GAME)?,
            },
            START_GAME => ServerMessage::StartGame {
                opponent: next_field(&mut fields, START_GAME, "opponent")?.to_string(),
                opponent_piece: parse_piece(
                    next_field(&mut fields, START_GAME, "opponent piece")?,
                    START_GAME,
                )?,
                moves_first: parse_flag(next_field(&mut fields, START_GAME, "first move")?)?,
            },
            MOVE => {
                let code = next_field(&mut fields, MOVE, "status")?;
                let status = code
                    .parse::<u8>()
                    .ok()
                    .and_then(MoveStatus::from_code)
                    .ok_or_else(|| invalid(MOVE, "status", code))?;
                ServerMessage::Move {
                    status,
                    x: parse_coordinate(next_field(&mut fields, MOVE, "x")?, MOVE, "x")?,
                    y: parse_coordinate(next_field(&mut fields, MOVE, "y")?, MOVE, "y")?,
                }
            }
            OPP_MOVE => ServerMessage::OppMove {
                x: parse_coordinate(next_field(&mut fields, OPP_MOVE, "x")?, OPP_MOVE, "x")?,
                y: parse_coordinate(next_field(&mut fields, OPP_MOVE, "y")?, OPP_MOVE, "y")?,
            },
            GAME_STATUS => {
                let result = match next_field(&mut fields, GAME_STATUS, "result")? {
                    DRAW => GameResult::Draw,
                    OPP_DISCONNECTED => GameResult::OppDisconnected,
                    winner => GameResult::Winner(winner.to_string()),
                };
                ServerMessage::GameStatus(result)
            }
            OPP_DISCONNECTED => ServerMessage::OppDisconnected,
            RECONNECT => ServerMessage::Reconnect {
                board: next_field(&mut fields, RECONNECT, "board")?.to_string(),
                current_turn: next_field(&mut fields, RECONNECT, "current turn")?.to_string(),
                opponent: next_field(&mut fields, RECONNECT, "opponent")?.to_string(),
                opponent_piece: parse_piece(
                    next_field(&mut fields, RECONNECT, "opponent piece")?,
                    RECONNECT,
                )?,
            },
            PING => ServerMessage::Ping,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };

        expect_end(&mut fields, command_name(&message))?;
        Ok(message)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Login { username } => write!(f, "{LOGIN};{username}"),
            ServerMessage::JoinGame { piece } => write!(f, "{JOIN_GAME};{piece}"),
            ServerMessage::StartGame {
                opponent,
                opponent_piece,
                moves_first,
            } => write!(
                f,
                "{START_GAME};{opponent};{opponent_piece};{}",
                u8::from(*moves_first)
            ),
            ServerMessage::Move { status, x, y } => write!(f, "{MOVE};{};{x};{y}", status.code()),
            ServerMessage::OppMove { x, y } => write!(f, "{OPP_MOVE};{x};{y}"),
            ServerMessage::GameStatus(result) => write!(f, "{GAME_STATUS};{result}"),
            ServerMessage::OppDisconnected => write!(f, "{OPP_DISCONNECTED}"),
            ServerMessage::Reconnect {
                board,
                current_turn,
                opponent,
                opponent_piece,
            } => write!(
                f,
                "{RECONNECT};{board};{current_turn};{opponent};{opponent_piece}"
            ),
            ServerMessage::Ping => write!(f, "{PING}"),
        }
    }
}

impl ClientMessage {
    /// Parses one line (with or without its trailing newline).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields = split_line(line)?;
        let command = fields.next().unwrap_or_default();

        let message = match command {
            LOGIN => {
                let raw = next_field(&mut fields, LOGIN, "username")?;
                ClientMessage::Login {
                    username: normalize_username(raw)?,
                }
            }
            JOIN_GAME => ClientMessage::JoinGame,
            MOVE => ClientMessage::Move {
                x: parse_coordinate(next_field(&mut fields, MOVE, "x")?, MOVE, "x")?,
                y: parse_coordinate(next_field(&mut fields, MOVE, "y")?, MOVE, "y")?,
            },
            LOGOUT => ClientMessage::Logout,
            PONG => ClientMessage::Pong,
            WAIT_REPLY => ClientMessage::WaitReply {
                wait: fields.next() == Some(WAIT),
            },
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };

        expect_end(&mut fields, command_name_client(&message))?;
        Ok(message)
    }

    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Login { username } => write!(f, "{LOGIN};{username}"),
            ClientMessage::JoinGame => write!(f, "{JOIN_GAME}"),
            ClientMessage::Move { x, y } => write!(f, "{MOVE};{x};{y}"),
            ClientMessage::Logout => write!(f, "{LOGOUT}"),
            ClientMessage::Pong => write!(f, "{PONG}"),
            ClientMessage::WaitReply { wait: true } => write!(f, "{WAIT_REPLY};{WAIT}"),
            ClientMessage::WaitReply { wait: false } => write!(f, "{WAIT_REPLY};LEAVE"),
        }
    }
}

/// Trims the line terminator and splits into fields.
fn split_line(line: &str) -> Result<Split<'_, char>, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::TooLong);
    }
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }

    Ok(line.split(FIELD_DELIMITER))
}

fn next_field<'a>(
    fields: &mut Split<'a, char>,
    command: &'static str,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    match fields.next() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ProtocolError::MissingField { command, field }),
    }
}

/// Trailing empty fields (`PONG;`) are tolerated, anything else is not.
fn expect_end(fields: &mut Split<'_, char>, command: &'static str) -> Result<(), ProtocolError> {
    if fields.all(str::is_empty) {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedField { command })
    }
}

fn invalid(command: &'static str, field: &'static str, value: &str) -> ProtocolError {
    ProtocolError::InvalidField {
        command,
        field,
        value: value.to_string(),
    }
}

/// Numbers too large for `i32` saturate; they are off the board either way.
fn parse_coordinate(
    value: &str,
    command: &'static str,
    field: &'static str,
) -> Result<i32, ProtocolError> {
    match value.trim().parse::<i32>() {
        Ok(coordinate) => Ok(coordinate),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i32::MAX),
            IntErrorKind::NegOverflow => Ok(i32::MIN),
            _ => Err(invalid(command, field, value)),
        },
    }
}

fn parse_piece(value: &str, command: &'static str) -> Result<Piece, ProtocolError> {
    let mut chars = value.chars();
    match (chars.next().and_then(Piece::from_char), chars.next()) {
        (Some(piece), None) => Ok(piece),
        _ => Err(invalid(command, "piece", value)),
    }
}

fn parse_flag(value: &str) -> Result<bool, ProtocolError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(invalid(START_GAME, "first move", other)),
    }
}

/// Usernames are trimmed and cut to `MAX_USERNAME_LEN` characters.
fn normalize_username(raw: &str) -> Result<String, ProtocolError> {
    let name: String = raw.trim().chars().take(MAX_USERNAME_LEN).collect();
    if name.is_empty() {
        return Err(invalid(LOGIN, "username", raw));
    }
    Ok(name)
}

fn command_name(message: &ServerMessage) -> &'static str {
    match message {
        ServerMessage::Login { .. } => LOGIN,
        ServerMessage::JoinGame { .. } => JOIN_GAME,
        ServerMessage::StartGame { .. } => START_GAME,
        ServerMessage::Move { .. } => MOVE,
        ServerMessage::OppMove { .. } => OPP_MOVE,
        ServerMessage::GameStatus(_) => GAME_STATUS,
        ServerMessage::OppDisconnected => OPP_DISCONNECTED,
        ServerMessage::Reconnect { .. } => RECONNECT,
        ServerMessage::Ping => PING,
    }
}

fn command_name_client(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Login { .. } => LOGIN,
        ClientMessage::JoinGame => JOIN_GAME,
        ClientMessage::Move { .. } => MOVE,
        ClientMessage::Logout => LOGOUT,
        ClientMessage::Pong => PONG,
        ClientMessage::WaitReply { .. } => WAIT_REPLY,
    }
}
