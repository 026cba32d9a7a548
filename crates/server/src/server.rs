use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use salvo::net::{
    DeliveryManager, EntityKind, MAX_CHAT_LEN, MAX_NAME_LEN, Message, MessageBody,
    NetworkStats, PROTOCOL_VERSION, Peer, PeerManager, Transport, UdpTransport, decode_packet,
    truncate_utf8,
};
use salvo::{Identifier, IdentifierAllocator};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};
use crate::simulation::Avatar;

pub struct GameServer {
    transport: UdpTransport,
    peers: PeerManager,
    config: ServerConfig,
    /// Keyed by the owning player.
    avatars: HashMap<Identifier, Avatar>,
    entities: IdentifierAllocator,
    tick: u32,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let transport = UdpTransport::bind(bind_addr)?;
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);

        Ok(Self {
            transport,
            peers: PeerManager::with_timeout(config.max_players, config.peer_timeout),
            avatars: HashMap::new(),
            entities: IdentifierAllocator::new(),
            tick: 0,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn player_count(&self) -> usize {
        self.peers.len()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.accumulator += delta;

        if let Err(e) = self.process_network(now) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Network error: {}", e),
            });
        }

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.tick(now);
        }
    }

    fn tick(&mut self, now: Instant) {
        self.tick = self.tick.wrapping_add(1);

        let dt = self.tick_duration.as_secs_f32();
        for avatar in self.avatars.values_mut() {
            avatar.integrate(dt);
        }

        if self.tick % self.config.update_rate.max(1) == 0 {
            self.broadcast_updates();
        }

        for peer in self.peers.cleanup_timed_out(now) {
            self.remove_player(peer, DisconnectReason::Timeout);
        }

        self.flush(now);
    }

    fn broadcast_updates(&mut self) {
        let updates: Vec<MessageBody> = self
            .avatars
            .values_mut()
            .filter(|avatar| avatar.dirty)
            .map(|avatar| {
                avatar.dirty = false;
                avatar.update_message()
            })
            .collect();

        for update in &updates {
            self.peers.broadcast(update, None);
        }
    }

    /// Every peer gets a packet each tick so acks flow and clients can tell
    /// the server is alive.
    fn flush(&mut self, now: Instant) {
        let mut failed = Vec::new();
        for peer in self.peers.iter_mut() {
            let packet = match peer.create_packet(now) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Could not build packet for {}: {}", peer.addr, e);
                    continue;
                }
            };
            trace!(
                "Sending {} bytes to {} ({} reliable, {} unreliable)",
                packet.len(),
                peer.addr,
                packet.reliable_count(),
                packet.unreliable_count()
            );
            if let Err(e) = self.transport.send(packet.as_bytes(), peer.addr) {
                failed.push(format!("Failed to send to {}: {}", peer.addr, e));
            }
        }

        for message in failed {
            self.pending_events.push_back(ServerEvent::Error { message });
        }
    }

    fn process_network(&mut self, now: Instant) -> io::Result<()> {
        while let Some((bytes, addr)) = self.transport.try_receive()? {
            self.handle_datagram(&bytes, addr, now)?;
        }
        Ok(())
    }

    fn handle_datagram(&mut self, bytes: &[u8], addr: SocketAddr, now: Instant) -> io::Result<()> {
        let Some(peer) = self.peers.get_mut(&addr) else {
            return self.handle_hello(bytes, addr);
        };
        let Some(packet) = peer.receive(bytes, now) else {
            return Ok(());
        };

        for message in packet.messages {
            self.handle_message(addr, message);
            if !self.peers.contains(&addr) {
                break;
            }
        }
        Ok(())
    }

    fn handle_hello(&mut self, bytes: &[u8], addr: SocketAddr) -> io::Result<()> {
        let mut scratch = DeliveryManager::new();
        let Some(packet) = decode_packet(bytes, &mut scratch) else {
            return Ok(());
        };
        let hello = packet.messages.into_iter().find_map(|m| match m.into_body() {
            MessageBody::Connect { version, name } => Some((version, name)),
            _ => None,
        });
        let Some((version, name)) = hello else {
            debug!("Ignoring traffic from unknown sender {}", addr);
            return Ok(());
        };

        if version != PROTOCOL_VERSION {
            self.pending_events.push_back(ServerEvent::ConnectionDenied {
                addr,
                reason: format!("protocol version {} (expected {})", version, PROTOCOL_VERSION),
            });
            return Ok(());
        }

        if self.peers.is_full() {
            let full = PeerManager::full_packet().map_err(io::Error::other)?;
            self.transport.send(&full, addr)?;
            self.pending_events.push_back(ServerEvent::ConnectionDenied {
                addr,
                reason: String::from("server full"),
            });
            return Ok(());
        }

        self.admit(addr, truncate_utf8(&name, MAX_NAME_LEN).to_string());
        Ok(())
    }

    fn admit(&mut self, addr: SocketAddr, name: String) {
        let roster: Vec<(Identifier, String)> = self
            .peers
            .iter()
            .map(|peer| (peer.player, peer.name.clone()))
            .collect();

        let Some(entity) = self.entities.allocate() else {
            self.pending_events.push_back(ServerEvent::ConnectionDenied {
                addr,
                reason: String::from("no free entity slots"),
            });
            return;
        };
        let avatar = Avatar::spawn(entity);

        let Some(peer) = self.peers.admit(addr, name.clone()) else {
            self.entities.release(entity);
            return;
        };
        let player = peer.player;

        if let Err(e) = sync_world(peer, &roster, self.avatars.values(), &avatar) {
            warn!("Could not sync world to {}: {}", addr, e);
        }

        let joined = MessageBody::Join {
            player,
            name: name.clone(),
        };
        let added = MessageBody::Add {
            entity,
            kind: EntityKind::Avatar,
            position: avatar.position,
        };
        self.peers.broadcast(&joined, Some(addr));
        self.peers.broadcast(&added, Some(addr));

        self.avatars.insert(player, avatar);
        self.pending_events
            .push_back(ServerEvent::PlayerJoined { player, addr, name });
    }

    fn handle_message(&mut self, addr: SocketAddr, message: Message) {
        let Some(peer) = self.peers.get(&addr) else {
            return;
        };
        let player = peer.player;

        match message.into_body() {
            MessageBody::Connect { .. } => {
                trace!("Repeated hello from {}", addr);
            }
            MessageBody::Disconnect => {
                if let Some(peer) = self.peers.remove(&addr) {
                    self.remove_player(peer, DisconnectReason::Graceful);
                }
            }
            MessageBody::Input { buttons, aim } => {
                if let Some(avatar) = self.avatars.get_mut(&player) {
                    avatar.apply_input(buttons, aim);
                }
            }
            MessageBody::Chat { text, .. } => {
                let text = truncate_utf8(&text, MAX_CHAT_LEN).to_string();
                self.pending_events.push_back(ServerEvent::Chat {
                    player,
                    text: text.clone(),
                });
                self.peers
                    .broadcast(&MessageBody::Chat { player, text }, None);
            }
            MessageBody::Name { name, .. } => {
                let name = truncate_utf8(&name, MAX_NAME_LEN).to_string();
                if let Some(peer) = self.peers.get_mut(&addr) {
                    debug!("{} renamed to {}", peer.name, name);
                    peer.name = name.clone();
                }
                self.peers
                    .broadcast(&MessageBody::Name { player, name }, None);
            }
            MessageBody::Loadout { loadout, .. } => {
                self.peers
                    .broadcast(&MessageBody::Loadout { player, loadout }, None);
            }
            body => {
                warn!("Ignoring {:?} from client {}", body.kind(), addr);
            }
        }
    }

    fn remove_player(&mut self, peer: Peer, reason: DisconnectReason) {
        self.peers
            .broadcast(&MessageBody::Leave { player: peer.player }, None);
        if let Some(avatar) = self.avatars.remove(&peer.player) {
            self.entities.release(avatar.entity);
            self.peers
                .broadcast(&MessageBody::Remove { entity: avatar.entity }, None);
        }

        self.pending_events.push_back(ServerEvent::PlayerLeft {
            player: peer.player,
            name: peer.name,
            reason,
        });
    }

    pub fn stats(&self) -> ServerStats {
        let mut network_stats = NetworkStats::default();
        for peer in self.peers.iter() {
            network_stats.packets_sent += peer.stats.packets_sent;
            network_stats.packets_received += peer.stats.packets_received;
            network_stats.bytes_sent += peer.stats.bytes_sent;
            network_stats.bytes_received += peer.stats.bytes_received;
            network_stats.messages_resent += peer.stats.messages_resent;
        }

        ServerStats {
            tick: self.tick,
            player_count: self.peers.len(),
            connected_count: self.peers.connected_count(),
            entity_count: self.entities.live_count(),
            max_players: self.config.max_players,
            network_stats,
        }
    }
}

/// Streams the current world to a newly admitted peer: its own Join first,
/// so that it carries sequence 1, then everything already present, then the
/// end-of-sync marker.
fn sync_world<'a>(
    peer: &mut Peer,
    roster: &[(Identifier, String)],
    avatars: impl Iterator<Item = &'a Avatar>,
    own: &'a Avatar,
) -> Result<(), salvo::WireError> {
    peer.send(MessageBody::Join {
        player: peer.player,
        name: peer.name.clone(),
    })?;
    for (player, name) in roster {
        peer.send(MessageBody::Join {
            player: *player,
            name: name.clone(),
        })?;
    }
    for avatar in avatars.chain(std::iter::once(own)) {
        peer.send(MessageBody::Add {
            entity: avatar.entity,
            kind: EntityKind::Avatar,
            position: avatar.position,
        })?;
    }
    peer.mark_synced()
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u32,
    pub player_count: usize,
    pub connected_count: usize,
    pub entity_count: usize,
    pub max_players: usize,
    pub network_stats: NetworkStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use salvo::net::{
        ConnectionConfig, ConnectionState, InputButtons, MessageKind, ServerConnection,
    };
    use std::thread;

    fn server(max_players: usize) -> GameServer {
        let config = ServerConfig {
            max_players,
            tick_rate: 200,
            ..Default::default()
        };
        GameServer::new("127.0.0.1:0", config).unwrap()
    }

    fn client(server: &GameServer, name: &str) -> ServerConnection {
        let config = ConnectionConfig {
            player_name: String::from(name),
            ..Default::default()
        };
        ServerConnection::connect(server.local_addr(), config).unwrap()
    }

    fn pump(
        server: &mut GameServer,
        clients: &mut [(&mut ServerConnection, &mut Vec<Message>)],
        mut done: impl FnMut(&GameServer, &[(&mut ServerConnection, &mut Vec<Message>)]) -> bool,
    ) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            for (connection, session) in clients.iter_mut() {
                connection.update(&mut **session);
            }
            server.tick_once();
            if done(&*server, &*clients) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_join_streams_world_then_synced() {
        let mut server = server(4);
        let mut alice = client(&server, "alice");
        let mut alice_log = Vec::new();
        assert!(pump(&mut server, &mut [(&mut alice, &mut alice_log)], |_, c| {
            c[0].0.is_connected()
        }));

        let mut bob = client(&server, "bob");
        let mut bob_log = Vec::new();
        assert!(pump(&mut server, &mut [(&mut bob, &mut bob_log)], |_, c| {
            c[0].0.is_connected()
        }));

        let joins: Vec<&MessageBody> = bob_log
            .iter()
            .map(Message::body)
            .filter(|body| matches!(body, MessageBody::Join { .. }))
            .collect();
        assert_eq!(joins.len(), 1);
        assert!(matches!(joins[0], MessageBody::Join { name, .. } if name == "alice"));

        let adds = bob_log.iter().filter(|m| m.kind() == MessageKind::Add).count();
        assert_eq!(adds, 2);
        assert_eq!(server.player_count(), 2);
        assert_eq!(server.stats().entity_count, 2);

        let events: Vec<ServerEvent> = server.drain_events().collect();
        let joined = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::PlayerJoined { .. }))
            .count();
        assert_eq!(joined, 2);
    }

    #[test]
    fn test_server_full_rejects() {
        let mut server = server(1);
        let mut first = client(&server, "one");
        let mut first_log = Vec::new();
        assert!(pump(&mut server, &mut [(&mut first, &mut first_log)], |_, c| {
            c[0].0.is_connected()
        }));

        let mut second = client(&server, "two");
        let mut second_log = Vec::new();
        assert!(pump(&mut server, &mut [(&mut second, &mut second_log)], |_, c| {
            c[0].0.state().is_terminal()
        }));
        assert_eq!(second.state(), ConnectionState::Full);
        assert_eq!(server.player_count(), 1);
    }

    #[test]
    fn test_input_moves_avatar_and_broadcasts_update() {
        let mut server = server(4);
        let mut alice = client(&server, "alice");
        let mut log = Vec::new();
        assert!(pump(&mut server, &mut [(&mut alice, &mut log)], |_, c| {
            c[0].0.is_connected()
        }));
        log.clear();

        alice
            .send_message(MessageBody::Input {
                buttons: InputButtons::FORWARD,
                aim: Vec2::ZERO,
            })
            .unwrap();

        assert!(pump(&mut server, &mut [(&mut alice, &mut log)], |_, c| {
            c[0].1.iter().any(|m| {
                matches!(m.body(), MessageBody::Update { position, .. } if position.z < 0.0)
            })
        }));
    }

    #[test]
    fn test_chat_is_relayed_and_disconnect_announced() {
        let mut server = server(4);
        let mut alice = client(&server, "alice");
        let mut bob = client(&server, "bob");
        let mut alice_log = Vec::new();
        let mut bob_log = Vec::new();
        assert!(pump(
            &mut server,
            &mut [(&mut alice, &mut alice_log), (&mut bob, &mut bob_log)],
            |_, c| c.iter().all(|(connection, _)| connection.is_connected()),
        ));

        let alice_id = alice.local_player().unwrap();
        alice
            .send_message(MessageBody::Chat {
                player: Identifier::new(99, 99),
                text: String::from("gg"),
            })
            .unwrap();
        assert!(pump(
            &mut server,
            &mut [(&mut alice, &mut alice_log), (&mut bob, &mut bob_log)],
            |_, c| c[1].1.iter().any(|m| m.kind() == MessageKind::Chat),
        ));
        let chat = bob_log.iter().find(|m| m.kind() == MessageKind::Chat).unwrap();
        assert_eq!(
            chat.body(),
            &MessageBody::Chat {
                player: alice_id,
                text: String::from("gg"),
            }
        );

        alice.disconnect();
        assert!(pump(&mut server, &mut [(&mut bob, &mut bob_log)], |_, c| {
            c[0].1.iter().any(|m| m.body() == &MessageBody::Leave { player: alice_id })
        }));
        assert!(bob_log.iter().any(|m| m.kind() == MessageKind::Remove));
        assert_eq!(server.player_count(), 1);
        assert_eq!(server.stats().entity_count, 1);
    }
}
