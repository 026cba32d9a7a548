mod config;
mod connection;
mod delivery;
mod error;
mod inbound;
mod message;
mod peer;
mod protocol;
mod queue;
mod session;
mod stats;
mod transport;
mod wire;

pub use config::ConnectionConfig;
pub use connection::{ConnectionState, ServerConnection};
pub use delivery::DeliveryManager;
pub use error::{NetError, WireError};
pub use inbound::{InboundPacket, decode_packet};
pub use message::{
    EntityKind, InputButtons, Loadout, Message, MessageBody, MessageKind, Stamp, Transmission,
};
pub use peer::{Peer, PeerManager, PeerState};
pub use protocol::{
    APP_MAGIC, DEFAULT_PORT, HEADER_SIZE, MAX_CHAT_LEN, MAX_NAME_LEN, MAX_PACKET_SIZE,
    PROTOCOL_VERSION, PacketHeader,
};
pub use queue::{OutgoingQueue, Packet};
pub use session::GameSession;
pub use stats::NetworkStats;
pub use transport::{Transport, UdpTransport};
pub use wire::{WireRead, WireWrite, truncate_utf8};
