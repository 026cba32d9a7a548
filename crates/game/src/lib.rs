pub mod id;
pub mod net;

pub use id::{Identifier, IdentifierAllocator};
pub use net::{
    ConnectionConfig, ConnectionState, DeliveryManager, GameSession, Message, MessageBody,
    MessageKind, NetError, NetworkStats, OutgoingQueue, PeerManager, ServerConnection, Transport,
    UdpTransport, WireError,
};
