use std::time::Instant;

use super::message::Message;

/// Per-connection sequencing state. Pure bookkeeping, no I/O.
///
/// Outgoing reliable messages are numbered from 1 so that an ack of 0 means
/// "nothing received yet" and the receiver cursor can start at 0.
#[derive(Debug, Clone)]
pub struct DeliveryManager {
    epoch: Instant,
    last_acked_seq: u32,
    last_assigned_seq: u32,
    last_received_seq: u32,
    last_received_timestamp: u32,
}

impl Default for DeliveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryManager {
    pub const FIRST_SEQUENCE: u32 = 1;

    pub fn new() -> Self {
        Self::with_first_sequence(Self::FIRST_SEQUENCE)
    }

    pub fn with_first_sequence(first: u32) -> Self {
        Self {
            epoch: Instant::now(),
            last_acked_seq: 0,
            last_assigned_seq: first,
            last_received_seq: 0,
            last_received_timestamp: 0,
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn elapsed_ms_at(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.epoch).as_millis() as u32
    }

    pub fn write_header_fields(&self) -> (u32, u32) {
        self.header_fields_at(Instant::now())
    }

    pub fn header_fields_at(&self, now: Instant) -> (u32, u32) {
        (self.last_received_seq, self.elapsed_ms_at(now))
    }

    /// Call once per reliable message, when it is enqueued, so resent
    /// copies keep their number.
    pub fn assign_sequence_number(&mut self, message: &mut Message) -> u32 {
        let sequence = self.last_assigned_seq;
        message.set_sequence_number(sequence);
        self.last_assigned_seq = self.last_assigned_seq.wrapping_add(1);
        sequence
    }

    pub fn is_acknowledged(&self, message: &Message) -> bool {
        message
            .sequence_number()
            .is_some_and(|sequence| self.is_sequence_acknowledged(sequence))
    }

    pub fn is_sequence_acknowledged(&self, sequence: u32) -> bool {
        sequence <= self.last_acked_seq
    }

    pub fn update_last_acked(&mut self, ack: u32) {
        self.last_acked_seq = self.last_acked_seq.max(ack);
    }

    /// Accepts only the next sequence number in order; duplicates and gaps
    /// are left for the sender to resend.
    pub fn allow_reliable_delivery(&mut self, message: &Message) -> bool {
        match message.sequence_number() {
            Some(sequence) => self.allow_reliable_sequence(sequence),
            None => false,
        }
    }

    pub fn allow_reliable_sequence(&mut self, sequence: u32) -> bool {
        if sequence != self.last_received_seq.wrapping_add(1) {
            return false;
        }
        self.last_received_seq = sequence;
        true
    }

    /// Evaluated once per packet: rejects every unreliable message in a
    /// packet that is not strictly newer than the last accepted one.
    pub fn allow_unreliable_delivery(&mut self, timestamp: u32) -> bool {
        if timestamp <= self.last_received_timestamp {
            return false;
        }
        self.last_received_timestamp = timestamp;
        true
    }

    pub fn last_acked_seq(&self) -> u32 {
        self.last_acked_seq
    }

    pub fn last_assigned_seq(&self) -> u32 {
        self.last_assigned_seq
    }

    pub fn last_received_seq(&self) -> u32 {
        self.last_received_seq
    }

    pub fn last_received_timestamp(&self) -> u32 {
        self.last_received_timestamp
    }
}
