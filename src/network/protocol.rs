//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is one line of UTF-8 text: a command word, then fields.
//! Client commands separate fields with `:` (credentials) or `,`
//! (coordinates); server messages always use `:`.

use std::fmt;

use thiserror::Error;

use crate::game::player::PlayerId;
use crate::network::auth::CredentialError;

/// Malformed command text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A required field is absent.
    #[error("{command}: missing field `{field}`")]
    MissingField {
        /// Command word.
        command: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// A numeric field did not parse.
    #[error("{command}: invalid number `{value}`")]
    InvalidNumber {
        /// Command word.
        command: &'static str,
        /// Offending text.
        value: String,
    },

    /// A boolean field was neither `true` nor `false`.
    #[error("{command}: invalid flag `{value}`")]
    InvalidFlag {
        /// Command word.
        command: &'static str,
        /// Offending text.
        value: String,
    },
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Commands sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `LOGIN:<user>:<pass>`
    Login {
        /// Account name.
        username: String,
        /// Plaintext password.
        password: String,
    },

    /// `REGISTER:<user>:<pass>`
    Register {
        /// Requested account name.
        username: String,
        /// Plaintext password.
        password: String,
    },

    /// `LOGOUT`
    Logout,

    /// `MOVE:<x>,<y>`
    Move {
        /// Destination x.
        x: i32,
        /// Destination y.
        y: i32,
    },

    /// `TELEPORT:<x>,<y>,<z>`
    Teleport {
        /// Target x.
        x: i32,
        /// Target y.
        y: i32,
        /// Target plane.
        z: i32,
    },

    /// `RUN:<true|false>`
    Run(bool),

    /// Anything else; handed to gameplay.
    Gameplay(String),
}

impl ClientCommand {
    /// Parse one inbound line.
    pub fn parse(line: &str) -> Result<ClientCommand, ProtocolError> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("LOGIN:") {
            let (username, password) = credentials("LOGIN", rest)?;
            Ok(ClientCommand::Login { username, password })
        } else if let Some(rest) = line.strip_prefix("REGISTER:") {
            let (username, password) = credentials("REGISTER", rest)?;
            Ok(ClientCommand::Register { username, password })
        } else if line == "LOGOUT" {
            Ok(ClientCommand::Logout)
        } else if let Some(rest) = line.strip_prefix("MOVE:") {
            let mut fields = rest.split(',');
            let x = number("MOVE", "x", fields.next())?;
            let y = number("MOVE", "y", fields.next())?;
            Ok(ClientCommand::Move { x, y })
        } else if let Some(rest) = line.strip_prefix("TELEPORT:") {
            let mut fields = rest.split(',');
            let x = number("TELEPORT", "x", fields.next())?;
            let y = number("TELEPORT", "y", fields.next())?;
            let z = number("TELEPORT", "z", fields.next())?;
            Ok(ClientCommand::Teleport { x, y, z })
        } else if let Some(rest) = line.strip_prefix("RUN:") {
            match rest.trim() {
                "true" => Ok(ClientCommand::Run(true)),
                "false" => Ok(ClientCommand::Run(false)),
                other => Err(ProtocolError::InvalidFlag {
                    command: "RUN",
                    value: other.to_string(),
                }),
            }
        } else {
            Ok(ClientCommand::Gameplay(line.to_string()))
        }
    }
}

fn credentials(command: &'static str, rest: &str) -> Result<(String, String), ProtocolError> {
    let mut fields = rest.split(':');
    let username = fields
        .next()
        .ok_or(ProtocolError::MissingField { command, field: "username" })?;
    let password = fields
        .next()
        .ok_or(ProtocolError::MissingField { command, field: "password" })?;
    Ok((username.to_string(), password.to_string()))
}

fn number(command: &'static str, field: &'static str, raw: Option<&str>) -> Result<i32, ProtocolError> {
    let raw = raw.ok_or(ProtocolError::MissingField { command, field })?;
    raw.trim().parse().map_err(|_| ProtocolError::InvalidNumber {
        command,
        value: raw.to_string(),
    })
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Why a login was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// The username is already attached to a live session.
    AlreadyLoggedIn,
    /// Unknown user or wrong password.
    InvalidCredentials,
    /// Credentials matched but the record could not be loaded.
    LoadFailed,
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoginFailure::AlreadyLoggedIn => "Already logged in",
            LoginFailure::InvalidCredentials => "Invalid username or password",
            LoginFailure::LoadFailed => "Could not load player data",
        })
    }
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFailure {
    /// Username/password rules not met.
    Credentials(CredentialError),
    /// The username is already attached to a live session.
    AlreadyLoggedIn,
    /// An account with this name exists.
    UsernameTaken,
    /// Storage refused the new account.
    Failed,
}

impl fmt::Display for RegisterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterFailure::Credentials(err) => write!(f, "{}", err),
            RegisterFailure::AlreadyLoggedIn => f.write_str("Already logged in"),
            RegisterFailure::UsernameTaken => f.write_str("Username already exists"),
            RegisterFailure::Failed => f.write_str("Registration failed"),
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Connection accepted.
    Connected {
        /// Session assigned to this connection.
        session_id: String,
    },

    /// Login accepted.
    LoginSuccess {
        /// Persistent id.
        id: PlayerId,
        /// Account name.
        username: String,
    },

    /// Login refused.
    LoginFailed(LoginFailure),

    /// Account created.
    RegisterSuccess {
        /// Persistent id.
        id: PlayerId,
        /// Account name.
        username: String,
    },

    /// Registration refused.
    RegisterFailed(RegisterFailure),

    /// State saved; the client may disconnect.
    LogoutSuccess,

    /// Authoritative position and facing.
    Position {
        /// x
        x: i32,
        /// y
        y: i32,
        /// Plane.
        z: i32,
        /// Octant facing (0-7).
        direction: u8,
    },

    /// Run mode acknowledgement.
    RunToggle(bool),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Connected { session_id } => write!(f, "CONNECTED:{}", session_id),
            ServerMessage::LoginSuccess { id, username } => write!(f, "LOGIN_SUCCESS:{}:{}", id, username),
            ServerMessage::LoginFailed(reason) => write!(f, "LOGIN_FAILED:{}", reason),
            ServerMessage::RegisterSuccess { id, username } => write!(f, "REGISTER_SUCCESS:{}:{}", id, username),
            ServerMessage::RegisterFailed(reason) => write!(f, "REGISTER_FAILED:{}", reason),
            ServerMessage::LogoutSuccess => f.write_str("LOGOUT_SUCCESS"),
            ServerMessage::Position { x, y, z, direction } => write!(f, "POSITION:{}:{}:{}:{}", x, y, z, direction),
            ServerMessage::RunToggle(running) => write!(f, "RUN_TOGGLE:{}", running),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        assert_eq!(
            ClientCommand::parse("LOGIN:bob:secret1"),
            Ok(ClientCommand::Login { username: "bob".into(), password: "secret1".into() })
        );
        assert_eq!(
            ClientCommand::parse("REGISTER:alice:hunter22\n"),
            Ok(ClientCommand::Register { username: "alice".into(), password: "hunter22".into() })
        );
        assert_eq!(
            ClientCommand::parse("LOGIN:bob"),
            Err(ProtocolError::MissingField { command: "LOGIN", field: "password" })
        );
    }

    #[test]
    fn test_parse_movement() {
        assert_eq!(ClientCommand::parse("MOVE:10,-4"), Ok(ClientCommand::Move { x: 10, y: -4 }));
        assert_eq!(
            ClientCommand::parse("TELEPORT:3200, 3200, 1"),
            Ok(ClientCommand::Teleport { x: 3200, y: 3200, z: 1 })
        );
    }

    #[test]
    fn test_parse_malformed_numbers() {
        assert_eq!(
            ClientCommand::parse("MOVE:ten,10"),
            Err(ProtocolError::InvalidNumber { command: "MOVE", value: "ten".into() })
        );
        assert_eq!(
            ClientCommand::parse("TELEPORT:1,2"),
            Err(ProtocolError::MissingField { command: "TELEPORT", field: "z" })
        );
    }

    #[test]
    fn test_parse_run_and_logout() {
        assert_eq!(ClientCommand::parse("RUN:true"), Ok(ClientCommand::Run(true)));
        assert_eq!(ClientCommand::parse("RUN:false"), Ok(ClientCommand::Run(false)));
        assert!(matches!(ClientCommand::parse("RUN:yes"), Err(ProtocolError::InvalidFlag { .. })));
        assert_eq!(ClientCommand::parse("LOGOUT"), Ok(ClientCommand::Logout));
    }

    #[test]
    fn test_unknown_text_goes_to_gameplay() {
        assert_eq!(ClientCommand::parse("HELLO"), Ok(ClientCommand::Gameplay("HELLO".into())));
    }

    #[test]
    fn test_server_message_lines() {
        let id = PlayerId(7);
        assert_eq!(ServerMessage::Connected { session_id: "abc".into() }.to_string(), "CONNECTED:abc");
        assert_eq!(
            ServerMessage::LoginSuccess { id, username: "bob".into() }.to_string(),
            "LOGIN_SUCCESS:7:bob"
        );
        assert_eq!(
            ServerMessage::LoginFailed(LoginFailure::InvalidCredentials).to_string(),
            "LOGIN_FAILED:Invalid username or password"
        );
        assert_eq!(
            ServerMessage::RegisterFailed(RegisterFailure::Credentials(CredentialError::UsernameLength)).to_string(),
            "REGISTER_FAILED:Username must be 3-12 characters"
        );
        assert_eq!(
            ServerMessage::Position { x: 3222, y: 3223, z: 0, direction: 1 }.to_string(),
            "POSITION:3222:3223:0:1"
        );
        assert_eq!(ServerMessage::RunToggle(true).to_string(), "RUN_TOGGLE:true");
        assert_eq!(ServerMessage::LogoutSuccess.to_string(), "LOGOUT_SUCCESS");
    }
}
