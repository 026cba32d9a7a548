use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::delivery::DeliveryManager;
use super::error::WireError;
use super::inbound::{InboundPacket, decode_packet};
use super::message::{Message, MessageBody};
use super::protocol::MAX_PACKET_SIZE;
use super::queue::{OutgoingQueue, Packet};
use super::stats::NetworkStats;
use crate::id::{Identifier, IdentifierAllocator};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Syncing,
    Connected,
}

#[derive(Debug)]
pub struct Peer {
    pub addr: SocketAddr,
    pub player: Identifier,
    pub name: String,
    pub state: PeerState,
    pub delivery: DeliveryManager,
    pub queue: OutgoingQueue,
    pub last_receive_time: Instant,
    pub stats: NetworkStats,
    synced_sequence: Option<u32>,
}

impl Peer {
    pub fn new(addr: SocketAddr, player: Identifier, name: String, max_packet_size: usize) -> Self {
        Self {
            addr,
            player,
            name,
            state: PeerState::Syncing,
            delivery: DeliveryManager::new(),
            queue: OutgoingQueue::new(max_packet_size),
            last_receive_time: Instant::now(),
            stats: NetworkStats::default(),
            synced_sequence: None,
        }
    }

    pub fn send(&mut self, message: impl Into<Message>) -> Result<(), WireError> {
        self.queue.enqueue(&mut self.delivery, message.into())
    }

    /// Queues the end-of-sync marker; the peer counts as connected once the
    /// client acknowledges it.
    pub fn mark_synced(&mut self) -> Result<(), WireError> {
        let sequence = self
            .queue
            .enqueue_reliable(&mut self.delivery, MessageBody::Synced.into())?;
        self.synced_sequence = Some(sequence);
        Ok(())
    }

    pub fn receive(&mut self, bytes: &[u8], now: Instant) -> Option<InboundPacket> {
        let packet = decode_packet(bytes, &mut self.delivery)?;
        self.stats.record_received(bytes.len(), &packet);
        self.last_receive_time = now;
        self.queue.discard_acknowledged(&self.delivery);

        if self.state == PeerState::Syncing
            && self
                .synced_sequence
                .is_some_and(|sequence| self.delivery.is_sequence_acknowledged(sequence))
        {
            debug!("Peer {} finished syncing", self.addr);
            self.state = PeerState::Connected;
        }

        Some(packet)
    }

    pub fn create_packet(&mut self, now: Instant) -> Result<Packet, WireError> {
        let packet = self.queue.create_packet_at(&self.delivery, now)?;
        self.stats.record_sent(&packet);
        Ok(packet)
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_receive_time) > timeout
    }
}

#[derive(Debug)]
pub struct PeerManager {
    peers: HashMap<SocketAddr, Peer>,
    players: IdentifierAllocator,
    max_peers: usize,
    max_packet_size: usize,
    timeout: Duration,
}

impl PeerManager {
    pub fn new(max_peers: usize) -> Self {
        Self::with_timeout(max_peers, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            players: IdentifierAllocator::new(),
            max_peers,
            max_packet_size: MAX_PACKET_SIZE,
            timeout,
        }
    }

    /// Datagram turning away a client when no slot is free. Built from a
    /// throwaway delivery state so the Full message is the client's first
    /// reliable message.
    pub fn full_packet() -> Result<Vec<u8>, WireError> {
        let mut delivery = DeliveryManager::new();
        let mut queue = OutgoingQueue::default();
        queue.enqueue_reliable(&mut delivery, MessageBody::Full.into())?;
        Ok(queue.create_packet(&delivery)?.into_bytes())
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers
    }

    pub fn admit(&mut self, addr: SocketAddr, name: String) -> Option<&mut Peer> {
        if self.peers.contains_key(&addr) {
            warn!("Peer {} admitted twice", addr);
            return self.peers.get_mut(&addr);
        }
        if self.is_full() {
            return None;
        }

        let player = self.players.allocate()?;
        let peer = Peer::new(addr, player, name, self.max_packet_size);
        Some(self.peers.entry(addr).or_insert(peer))
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Peer> {
        self.peers.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Peer> {
        self.peers.get_mut(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Peer> {
        let peer = self.peers.remove(addr)?;
        self.players.release(peer.player);
        Some(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }

    pub fn broadcast(&mut self, body: &MessageBody, except: Option<SocketAddr>) {
        for peer in self.peers.values_mut() {
            if Some(peer.addr) == except {
                continue;
            }
            if let Err(e) = peer.send(body.clone()) {
                warn!("Could not queue {:?} for {}: {}", body.kind(), peer.addr, e);
            }
        }
    }

    pub fn cleanup_timed_out(&mut self, now: Instant) -> Vec<Peer> {
        let timed_out: Vec<SocketAddr> = self
            .peers
            .values()
            .filter(|peer| peer.is_timed_out(now, self.timeout))
            .map(|peer| peer.addr)
            .collect();

        timed_out
            .iter()
            .filter_map(|addr| self.remove(addr))
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|peer| peer.state == PeerState::Connected)
            .count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
