use std::io::Cursor;

use log::{trace, warn};

use super::delivery::DeliveryManager;
use super::error::WireError;
use super::message::Message;
use super::protocol::PacketHeader;

#[derive(Debug)]
pub struct InboundPacket {
    pub header: PacketHeader,
    pub messages: Vec<Message>,
    pub rejected: usize,
    /// Set when an unknown type code cut the datagram short.
    pub error: Option<WireError>,
}

/// Decodes a datagram against one connection's delivery state.
///
/// Returns `None` when the header is unusable or a message is malformed or
/// cut short; the delivery state is then untouched. An unknown type code
/// only abandons the bytes after it.
pub fn decode_packet(bytes: &[u8], delivery: &mut DeliveryManager) -> Option<InboundPacket> {
    let mut reader = Cursor::new(bytes);
    let header = PacketHeader::decode(&mut reader)?;

    let mut decoded = Vec::new();
    let mut error = None;

    while (reader.position() as usize) < bytes.len() {
        match Message::decode(&mut reader) {
            Ok(message) => decoded.push(message),
            Err(e @ WireError::UnknownMessageType(_)) => {
                warn!(
                    "Abandoning {} bytes of datagram: {}",
                    bytes.len() - reader.position().min(bytes.len() as u64) as usize,
                    e
                );
                error = Some(e);
                break;
            }
            Err(e) => {
                warn!("Discarding malformed datagram of {} bytes: {}", bytes.len(), e);
                return None;
            }
        }
    }

    delivery.update_last_acked(header.ack);
    let allow_unreliable = delivery.allow_unreliable_delivery(header.timestamp);

    let mut messages = Vec::with_capacity(decoded.len());
    let mut rejected = 0;

    for mut message in decoded {
        let accepted = if message.is_reliable() {
            delivery.allow_reliable_delivery(&message)
        } else {
            message.set_timestamp(header.timestamp);
            allow_unreliable
        };

        if accepted {
            messages.push(message);
        } else {
            trace!("Dropped {:?} {:?}", message.kind(), message.stamp());
            rejected += 1;
        }
    }

    Some(InboundPacket {
        header,
        messages,
        rejected,
        error,
    })
}
