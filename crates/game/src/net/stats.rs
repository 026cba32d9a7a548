use super::inbound::InboundPacket;
use super::queue::Packet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub datagrams_rejected: u64,
    pub decode_errors: u64,
    pub messages_received: u64,
    pub messages_rejected: u64,
    pub messages_resent: u64,
}

impl NetworkStats {
    pub fn record_sent(&mut self, packet: &Packet) {
        self.packets_sent += 1;
        self.bytes_sent += packet.len() as u64;
        self.messages_resent += packet.resent_count() as u64;
    }

    pub fn record_received(&mut self, size: usize, packet: &InboundPacket) {
        self.packets_received += 1;
        self.bytes_received += size as u64;
        self.messages_received += packet.messages.len() as u64;
        self.messages_rejected += packet.rejected as u64;
        if packet.error.is_some() {
            self.decode_errors += 1;
        }
    }
}
