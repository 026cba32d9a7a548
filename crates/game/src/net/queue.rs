use std::collections::VecDeque;
use std::time::Instant;

use log::trace;

use super::delivery::DeliveryManager;
use super::error::WireError;
use super::message::Message;
use super::protocol::{HEADER_SIZE, MAX_PACKET_SIZE, PacketHeader};

const SEQUENCE_OFFSET: usize = 1;

#[derive(Debug, Clone)]
struct PendingReliable {
    sequence: u32,
    bytes: Vec<u8>,
    sends: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
    reliable: usize,
    unreliable: usize,
    resent: usize,
}

impl Packet {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_count() == 0
    }

    pub fn message_count(&self) -> usize {
        self.reliable + self.unreliable
    }

    pub fn reliable_count(&self) -> usize {
        self.reliable
    }

    pub fn unreliable_count(&self) -> usize {
        self.unreliable
    }

    /// Reliable messages that already went out in an earlier packet.
    pub fn resent_count(&self) -> usize {
        self.resent
    }
}

/// Messages are encoded when enqueued, so an encode failure is reported to
/// the caller and every resend of a reliable message is byte-identical.
#[derive(Debug)]
pub struct OutgoingQueue {
    reliable: VecDeque<PendingReliable>,
    unreliable: VecDeque<Vec<u8>>,
    max_packet_size: usize,
}

impl Default for OutgoingQueue {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl OutgoingQueue {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            reliable: VecDeque::new(),
            unreliable: VecDeque::new(),
            max_packet_size: max_packet_size.max(HEADER_SIZE),
        }
    }

    pub fn enqueue(
        &mut self,
        delivery: &mut DeliveryManager,
        message: Message,
    ) -> Result<(), WireError> {
        if message.is_reliable() {
            self.enqueue_reliable(delivery, message).map(|_| ())
        } else {
            self.enqueue_unreliable(message)
        }
    }

    /// Returns the assigned sequence number. Nothing is numbered if the
    /// message fails to encode, so a rejected message never opens a gap.
    pub fn enqueue_reliable(
        &mut self,
        delivery: &mut DeliveryManager,
        mut message: Message,
    ) -> Result<u32, WireError> {
        debug_assert!(message.is_reliable(), "{:?} is unreliable", message.kind());

        let mut bytes = self.encode_checked(&message)?;
        let sequence = delivery.assign_sequence_number(&mut message);
        bytes[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4].copy_from_slice(&sequence.to_le_bytes());

        trace!("Queued reliable {:?} #{}", message.kind(), sequence);
        self.reliable.push_back(PendingReliable {
            sequence,
            bytes,
            sends: 0,
        });
        Ok(sequence)
    }

    pub fn enqueue_unreliable(&mut self, message: Message) -> Result<(), WireError> {
        debug_assert!(!message.is_reliable(), "{:?} is reliable", message.kind());

        let bytes = self.encode_checked(&message)?;
        self.unreliable.push_back(bytes);
        Ok(())
    }

    fn encode_checked(&self, message: &Message) -> Result<Vec<u8>, WireError> {
        let bytes = message.encode_to_vec()?;
        let max = self.max_packet_size - HEADER_SIZE;
        if bytes.len() > max {
            return Err(WireError::MessageTooLarge {
                len: bytes.len(),
                max,
            });
        }
        Ok(bytes)
    }

    pub fn has_pending_data(&self) -> bool {
        !self.reliable.is_empty() || !self.unreliable.is_empty()
    }

    pub fn reliable_len(&self) -> usize {
        self.reliable.len()
    }

    pub fn unreliable_len(&self) -> usize {
        self.unreliable.len()
    }

    pub fn pending_sequences(&self) -> impl Iterator<Item = u32> + '_ {
        self.reliable.iter().map(|pending| pending.sequence)
    }

    /// Acks are cumulative, so only a prefix of the queue can be acknowledged.
    pub fn discard_acknowledged(&mut self, delivery: &DeliveryManager) -> usize {
        let mut discarded = 0;
        while self
            .reliable
            .front()
            .is_some_and(|pending| delivery.is_sequence_acknowledged(pending.sequence))
        {
            self.reliable.pop_front();
            discarded += 1;
        }
        discarded
    }

    pub fn create_packet(&mut self, delivery: &DeliveryManager) -> Result<Packet, WireError> {
        self.create_packet_at(delivery, Instant::now())
    }

    /// Builds the next datagram: header, as many reliable messages as fit
    /// in order, then as many unreliable ones. Reliable leftovers stay
    /// queued; the unreliable queue is always emptied.
    pub fn create_packet_at(
        &mut self,
        delivery: &DeliveryManager,
        now: Instant,
    ) -> Result<Packet, WireError> {
        self.discard_acknowledged(delivery);

        let mut bytes = Vec::with_capacity(self.max_packet_size);
        let (ack, timestamp) = delivery.header_fields_at(now);
        PacketHeader::encode(&mut bytes, ack, timestamp)?;

        let mut reliable = 0;
        let mut resent = 0;
        for pending in self.reliable.iter_mut() {
            if bytes.len() + pending.bytes.len() > self.max_packet_size {
                break;
            }
            bytes.extend_from_slice(&pending.bytes);
            if pending.sends > 0 {
                resent += 1;
            }
            pending.sends += 1;
            reliable += 1;
        }

        let mut unreliable = 0;
        for message in self.unreliable.iter() {
            if bytes.len() + message.len() > self.max_packet_size {
                break;
            }
            bytes.extend_from_slice(message);
            unreliable += 1;
        }

        let dropped = self.unreliable.len() - unreliable;
        if dropped > 0 {
            trace!("Dropped {} unreliable messages that did not fit", dropped);
        }
        self.unreliable.clear();

        Ok(Packet {
            bytes,
            reliable,
            unreliable,
            resent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Identifier;
    use crate::net::message::MessageBody;
    use glam::{Vec2, Vec3};
    use std::io::Cursor;

    fn chat(text: &str) -> Message {
        Message::new(MessageBody::Chat {
            player: Identifier::new(1, 0),
            text: text.to_string(),
        })
    }

    fn update() -> Message {
        Message::new(MessageBody::Update {
            entity: Identifier::new(2, 0),
            position: Vec3::ONE,
            velocity: Vec3::ZERO,
            heading: 0.0,
        })
    }

    fn decode_all(packet: &Packet) -> (PacketHeader, Vec<Message>) {
        let mut reader = Cursor::new(packet.as_bytes());
        let header = PacketHeader::decode(&mut reader).unwrap();
        let mut messages = Vec::new();
        while (reader.position() as usize) < packet.len() {
            messages.push(Message::decode(&mut reader).unwrap());
        }
        (header, messages)
    }

    #[test]
    fn test_empty_packet_is_header_only() {
        let delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::default();

        assert!(!queue.has_pending_data());
        let packet = queue.create_packet(&delivery).unwrap();
        assert_eq!(packet.len(), HEADER_SIZE);
        assert!(packet.is_empty());
    }

    #[test]
    fn test_unacked_reliable_is_resent_with_same_sequence() {
        let mut delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::default();
        let sequence = queue.enqueue_reliable(&mut delivery, chat("hi")).unwrap();

        let first = queue.create_packet(&delivery).unwrap();
        let second = queue.create_packet(&delivery).unwrap();

        let (_, first_messages) = decode_all(&first);
        let (_, second_messages) = decode_all(&second);
        assert_eq!(first_messages.len(), 1);
        assert_eq!(first_messages, second_messages);
        assert_eq!(second_messages[0].sequence_number(), Some(sequence));
        assert_eq!(first.resent_count(), 0);
        assert_eq!(second.resent_count(), 1);
        assert_eq!(&first.as_bytes()[HEADER_SIZE..], &second.as_bytes()[HEADER_SIZE..]);
    }

    #[test]
    fn test_acknowledged_messages_are_discarded() {
        let mut delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::default();
        for text in ["a", "b", "c"] {
            queue.enqueue_reliable(&mut delivery, chat(text)).unwrap();
        }
        assert_eq!(queue.pending_sequences().collect::<Vec<_>>(), vec![1, 2, 3]);

        delivery.update_last_acked(2);
        let packet = queue.create_packet(&delivery).unwrap();

        let (_, messages) = decode_all(&packet);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence_number(), Some(3));
        assert_eq!(queue.pending_sequences().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_zero_based_numbering_ack_removal() {
        let mut delivery = DeliveryManager::with_first_sequence(0);
        let mut queue = OutgoingQueue::default();
        for text in ["a", "b", "c"] {
            queue.enqueue_reliable(&mut delivery, chat(text)).unwrap();
        }

        delivery.update_last_acked(1);
        queue.create_packet(&delivery).unwrap();
        assert_eq!(queue.pending_sequences().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_unreliable_sent_once() {
        let delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::default();
        queue.enqueue_unreliable(update()).unwrap();
        assert!(queue.has_pending_data());

        let first = queue.create_packet(&delivery).unwrap();
        assert_eq!(first.unreliable_count(), 1);
        assert!(!queue.has_pending_data());

        let second = queue.create_packet(&delivery).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_reliable_precede_unreliable() {
        let mut delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::default();
        queue.enqueue(&mut delivery, update()).unwrap();
        queue.enqueue(&mut delivery, chat("x")).unwrap();

        let packet = queue.create_packet(&delivery).unwrap();
        let (_, messages) = decode_all(&packet);
        assert!(messages[0].is_reliable());
        assert!(!messages[1].is_reliable());
    }

    #[test]
    fn test_packet_never_exceeds_budget() {
        let mut delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::new(200);
        let text = "x".repeat(45);
        for _ in 0..10 {
            queue.enqueue_reliable(&mut delivery, chat(&text)).unwrap();
        }
        for _ in 0..10 {
            queue.enqueue_unreliable(update()).unwrap();
        }

        let packet = queue.create_packet(&delivery).unwrap();
        assert!(packet.len() <= 200);
        assert!(packet.reliable_count() > 0);
        assert!(packet.reliable_count() < 10);
        assert_eq!(packet.unreliable_count(), 0);
        assert_eq!(queue.reliable_len(), 10);
        assert_eq!(queue.unreliable_len(), 0);

        let first_unsent = packet.reliable_count() as u32 + 1;
        delivery.update_last_acked(packet.reliable_count() as u32);
        let next = queue.create_packet(&delivery).unwrap();
        let (_, messages) = decode_all(&next);
        assert_eq!(messages[0].sequence_number(), Some(first_unsent));
    }

    #[test]
    fn test_header_carries_ack_and_clock() {
        let mut delivery = DeliveryManager::new();
        delivery.allow_reliable_sequence(1);
        let mut queue = OutgoingQueue::default();

        let now = delivery.epoch() + std::time::Duration::from_millis(250);
        let packet = queue.create_packet_at(&delivery, now).unwrap();
        let (header, _) = decode_all(&packet);
        assert_eq!(header.ack, 1);
        assert_eq!(header.timestamp, 250);
    }

    #[test]
    fn test_oversized_message_is_rejected_without_numbering() {
        let mut delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::new(HEADER_SIZE + 8);

        let err = queue.enqueue_reliable(&mut delivery, chat("too long for this packet"));
        assert!(matches!(err, Err(WireError::MessageTooLarge { .. })));
        assert_eq!(queue.reliable_len(), 0);
        assert_eq!(delivery.last_assigned_seq(), DeliveryManager::FIRST_SEQUENCE);

        let input = Message::new(MessageBody::Input {
            buttons: Default::default(),
            aim: Vec2::ZERO,
        });
        assert!(queue.enqueue_unreliable(input).is_err());
    }
}
