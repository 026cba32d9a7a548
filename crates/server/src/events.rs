use std::net::SocketAddr;

use salvo::Identifier;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    PlayerJoined {
        player: Identifier,
        addr: SocketAddr,
        name: String,
    },
    PlayerLeft {
        player: Identifier,
        name: String,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    Chat {
        player: Identifier,
        text: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
        }
    }
}
