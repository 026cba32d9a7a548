use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use super::config::ConnectionConfig;
use super::delivery::DeliveryManager;
use super::error::NetError;
use super::inbound::decode_packet;
use super::message::{Message, MessageBody, MessageKind};
use super::protocol::{MAX_NAME_LEN, PROTOCOL_VERSION};
use super::queue::OutgoingQueue;
use super::session::GameSession;
use super::stats::NetworkStats;
use super::transport::{Transport, UdpTransport};
use super::wire::truncate_utf8;
use crate::id::Identifier;

/// Sequence number of the server's first reliable message, the Join that
/// names the local player.
const HANDSHAKE_JOIN_SEQUENCE: u32 = DeliveryManager::FIRST_SEQUENCE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Syncing,
    Connected,
    Full,
    Dropped,
    Faulted,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Syncing | Self::Connected)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

pub struct ServerConnection<T: Transport = UdpTransport> {
    transport: T,
    server_addr: SocketAddr,
    config: ConnectionConfig,
    state: ConnectionState,
    delivery: DeliveryManager,
    queue: OutgoingQueue,
    last_receive_time: Instant,
    local_player: Option<Identifier>,
    stats: NetworkStats,
}

impl ServerConnection<UdpTransport> {
    pub fn connect<A: ToSocketAddrs>(
        server: A,
        config: ConnectionConfig,
    ) -> Result<Self, NetError> {
        let server_addr = server
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| NetError::NoAddress(String::from("server address")))?;

        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let transport = UdpTransport::bind(bind_addr)?;
        info!(
            "Connecting to {} from {}",
            server_addr,
            transport.local_addr()
        );

        Ok(Self::with_transport(transport, server_addr, config))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

impl<T: Transport> ServerConnection<T> {
    pub fn with_transport(
        transport: T,
        server_addr: SocketAddr,
        mut config: ConnectionConfig,
    ) -> Self {
        config.player_name = truncate_utf8(&config.player_name, MAX_NAME_LEN).to_string();
        let now = Instant::now();

        Self {
            transport,
            server_addr,
            queue: OutgoingQueue::new(config.max_packet_size),
            config,
            state: ConnectionState::Connecting,
            delivery: DeliveryManager::new(),
            last_receive_time: now,
            local_player: None,
            stats: NetworkStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn local_player(&self) -> Option<Identifier> {
        self.local_player
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn delivery(&self) -> &DeliveryManager {
        &self.delivery
    }

    pub fn queue(&self) -> &OutgoingQueue {
        &self.queue
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.delivery.elapsed_ms_at(Instant::now())
    }

    pub fn since_last_receive(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_receive_time)
    }

    pub fn is_lagging(&self) -> bool {
        self.is_lagging_at(Instant::now())
    }

    /// Advisory only: the server has been quiet for longer than the lag
    /// threshold but the connection has not been dropped.
    pub fn is_lagging_at(&self, now: Instant) -> bool {
        matches!(
            self.state,
            ConnectionState::Syncing | ConnectionState::Connected
        ) && self.since_last_receive(now) > self.config.lag_threshold
    }

    pub fn send_message(&mut self, message: impl Into<Message>) -> Result<(), NetError> {
        if self.state.is_terminal() {
            return Err(NetError::NotConnected(self.state));
        }
        self.queue.enqueue(&mut self.delivery, message.into())?;
        Ok(())
    }

    pub fn update<S: GameSession>(&mut self, session: &mut S) -> ConnectionState {
        self.tick(Instant::now(), session)
    }

    /// One cycle: drain the socket, evaluate timeouts, send at most one
    /// packet. Does nothing once the connection has ended.
    pub fn tick<S: GameSession>(&mut self, now: Instant, session: &mut S) -> ConnectionState {
        if self.state.is_active() {
            self.receive(now, session);
        }
        if self.state.is_active() {
            self.check_timeouts(now);
        }
        if self.state.is_active() {
            self.send(now);
        }
        self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("Connection to {}: {:?} -> {:?}", self.server_addr, self.state, state);
            self.state = state;
        }
    }

    fn fault(&mut self, context: &str, err: std::io::Error) {
        error!("Socket {} failed: {}", context, err);
        self.set_state(ConnectionState::Faulted);
    }

    fn receive<S: GameSession>(&mut self, now: Instant, session: &mut S) {
        loop {
            let (bytes, from) = match self.transport.try_receive() {
                Ok(Some(datagram)) => datagram,
                Ok(None) => break,
                Err(e) => {
                    self.fault("receive", e);
                    return;
                }
            };

            if from != self.server_addr {
                warn!("Ignoring datagram from unexpected sender {}", from);
                self.stats.datagrams_rejected += 1;
                continue;
            }

            self.handle_datagram(&bytes, now, session);
            if self.state.is_terminal() {
                return;
            }
        }
    }

    fn handle_datagram<S: GameSession>(&mut self, bytes: &[u8], now: Instant, session: &mut S) {
        let Some(packet) = decode_packet(bytes, &mut self.delivery) else {
            self.stats.datagrams_rejected += 1;
            return;
        };

        trace!(
            "Received {} bytes, ack {}, {} messages",
            bytes.len(),
            packet.header.ack,
            packet.messages.len()
        );
        self.stats.record_received(bytes.len(), &packet);
        self.last_receive_time = now;
        self.queue.discard_acknowledged(&self.delivery);

        for message in packet.messages {
            self.route(message, session);
            if self.state.is_terminal() {
                return;
            }
        }

        if self.state == ConnectionState::Connecting {
            self.set_state(ConnectionState::Syncing);
        }
    }

    fn route<S: GameSession>(&mut self, message: Message, session: &mut S) {
        match message.kind() {
            MessageKind::Join if message.sequence_number() == Some(HANDSHAKE_JOIN_SEQUENCE) => {
                if let MessageBody::Join { player, name } = message.body() {
                    info!("Joined as {} ({})", name, player);
                    self.local_player = Some(*player);
                }
                if self.state == ConnectionState::Connecting {
                    self.set_state(ConnectionState::Syncing);
                }
            }
            MessageKind::Synced => match self.state {
                ConnectionState::Connecting | ConnectionState::Syncing => {
                    self.set_state(ConnectionState::Connected);
                }
                state => warn!("Ignoring Synced while {:?}", state),
            },
            MessageKind::Full => match self.state {
                ConnectionState::Connecting => {
                    warn!("Server {} is full", self.server_addr);
                    self.set_state(ConnectionState::Full);
                }
                state => warn!("Ignoring Full while {:?}", state),
            },
            MessageKind::Connect => {
                warn!("Ignoring Connect from server while {:?}", self.state);
            }
            _ => session.dispatch(message),
        }
    }

    fn check_timeouts(&mut self, now: Instant) {
        let silence = self.since_last_receive(now);
        match self.state {
            ConnectionState::Connecting if silence > self.config.connect_timeout => {
                warn!("No answer from {} after {:?}", self.server_addr, silence);
                self.set_state(ConnectionState::Dropped);
            }
            ConnectionState::Syncing | ConnectionState::Connected
                if silence > self.config.drop_timeout =>
            {
                warn!("Lost server {} after {:?} of silence", self.server_addr, silence);
                self.set_state(ConnectionState::Dropped);
            }
            _ => {}
        }
    }

    fn send(&mut self, now: Instant) {
        if self.state == ConnectionState::Connecting {
            let hello = MessageBody::Connect {
                version: PROTOCOL_VERSION,
                name: self.config.player_name.clone(),
            };
            if let Err(e) = self.queue.enqueue_unreliable(hello.into()) {
                error!("Could not queue hello: {}", e);
            }
        }

        // The handshake needs traffic in both directions even when idle.
        let keep_alive = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Syncing
        );
        if !keep_alive && !self.queue.has_pending_data() {
            return;
        }

        self.flush(now);
    }

    fn flush(&mut self, now: Instant) {
        let packet = match self.queue.create_packet_at(&self.delivery, now) {
            Ok(packet) => packet,
            Err(e) => {
                error!("Could not build packet: {}", e);
                return;
            }
        };

        match self.transport.send(packet.as_bytes(), self.server_addr) {
            Ok(()) => {
                trace!(
                    "Sent {} bytes, {} reliable ({} resent), {} unreliable",
                    packet.len(),
                    packet.reliable_count(),
                    packet.resent_count(),
                    packet.unreliable_count()
                );
                self.stats.record_sent(&packet);
            }
            Err(e) => self.fault("send", e),
        }
    }

    /// Best-effort goodbye: a fixed number of Disconnect packets, spaced by
    /// the configured interval, then the socket is released. No reply is
    /// awaited.
    pub fn disconnect(mut self) {
        if self.state.is_active() {
            info!("Disconnecting from {}", self.server_addr);
            let count = self.config.disconnect_count;
            for attempt in 0..count {
                if let Err(e) = self.queue.enqueue_unreliable(MessageBody::Disconnect.into()) {
                    error!("Could not queue disconnect: {}", e);
                    break;
                }
                let packet = match self.queue.create_packet(&self.delivery) {
                    Ok(packet) => packet,
                    Err(e) => {
                        error!("Could not build disconnect packet: {}", e);
                        break;
                    }
                };
                if let Err(e) = self.transport.send(packet.as_bytes(), self.server_addr) {
                    debug!("Disconnect send failed: {}", e);
                    break;
                }
                self.stats.record_sent(&packet);

                if attempt + 1 < count {
                    thread::sleep(self.config.disconnect_interval);
                }
            }
        }
        debug!("Released connection to {}", self.server_addr);
    }
}
