//! Connection states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a connection; selects which packet catalog applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Initial state of every connection.
    Handshaking,
    /// Server list ping.
    Status,
    /// Authentication.
    Login,
    /// Registry and resource synchronisation before play.
    Configuration,
    /// In-game.
    Play,
    /// Transfer from another server (1.20.5+).
    Transfer,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 6] = [
        ConnectionState::Handshaking,
        ConnectionState::Status,
        ConnectionState::Login,
        ConnectionState::Configuration,
        ConnectionState::Play,
        ConnectionState::Transfer,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ConnectionState::Handshaking => "Handshaking",
            ConnectionState::Status => "Status",
            ConnectionState::Login => "Login",
            ConnectionState::Configuration => "Configuration",
            ConnectionState::Play => "Play",
            ConnectionState::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
