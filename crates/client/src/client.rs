use std::thread;
use std::time::Instant;

use anyhow::{Result, anyhow};
use log::{debug, info, warn};

use salvo::net::{
    ConnectionConfig, ConnectionState, MAX_CHAT_LEN, MessageBody, NetError, ServerConnection,
    Transport, UdpTransport, truncate_utf8,
};

use crate::config::ClientConfig;
use crate::input::InputScript;
use crate::session::WorldMirror;

pub struct GameClient<T: Transport = UdpTransport> {
    connection: ServerConnection<T>,
    world: WorldMirror,
    input: InputScript,
    config: ClientConfig,
    pending_chat: Option<String>,
    connected_at: Option<Instant>,
    last_input: Option<Instant>,
}

impl GameClient<UdpTransport> {
    pub fn connect(
        server: &str,
        connection_config: ConnectionConfig,
        config: ClientConfig,
    ) -> Result<Self, NetError> {
        let connection = ServerConnection::connect(server, connection_config)?;
        Ok(Self::with_connection(connection, config))
    }
}

impl<T: Transport> GameClient<T> {
    pub fn with_connection(connection: ServerConnection<T>, config: ClientConfig) -> Self {
        Self {
            connection,
            world: WorldMirror::default(),
            input: InputScript::default(),
            config,
            pending_chat: None,
            connected_at: None,
            last_input: None,
        }
    }

    /// Line to say once the session is established.
    pub fn say_when_connected(&mut self, text: &str) {
        self.pending_chat = Some(truncate_utf8(text, MAX_CHAT_LEN).to_string());
    }

    /// One client frame: drive the connection, then produce this frame's
    /// outgoing game traffic.
    pub fn frame(&mut self, now: Instant) -> Result<ConnectionState> {
        let state = self.connection.tick(now, &mut self.world);
        if state != ConnectionState::Connected {
            return Ok(state);
        }

        let Some(player) = self.connection.local_player() else {
            return Ok(state);
        };
        let connected_at = *self.connected_at.get_or_insert_with(|| {
            info!("Session established as {}", player);
            now
        });

        if let Some(text) = self.pending_chat.take() {
            self.connection
                .send_message(MessageBody::Chat { player, text })?;
        }

        let input_due = self
            .last_input
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.input_interval());
        if input_due {
            let input = self.input.sample(now.saturating_duration_since(connected_at));
            self.connection.send_message(input)?;
            self.last_input = Some(now);
        }

        Ok(state)
    }

    /// Runs frames at the tick rate until the connection ends, the world
    /// closes or the configured duration passes, then says goodbye.
    pub fn run(mut self) -> Result<()> {
        let started = Instant::now();
        let mut was_lagging = false;

        let outcome = loop {
            let frame_start = Instant::now();
            let state = match self.frame(frame_start) {
                Ok(state) => state,
                Err(e) => break Err(e),
            };

            match state {
                ConnectionState::Full => break Err(anyhow!("server is full")),
                ConnectionState::Dropped => break Err(anyhow!("connection dropped")),
                ConnectionState::Faulted => break Err(anyhow!("socket failure")),
                _ => {}
            }

            let lagging = self.connection.is_lagging_at(frame_start);
            if lagging != was_lagging {
                if lagging {
                    warn!("Server has gone quiet");
                } else {
                    info!("Server is responsive again");
                }
                was_lagging = lagging;
            }

            if self.world.server_closed() {
                break Ok(());
            }
            if self
                .config
                .run_for
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                break Ok(());
            }

            let elapsed = frame_start.elapsed();
            if let Some(remaining) = self.config.tick_interval().checked_sub(elapsed) {
                thread::sleep(remaining);
            }
        };

        self.report();
        self.connection.disconnect();
        outcome
    }

    fn report(&self) {
        let name = self
            .connection
            .local_player()
            .and_then(|id| self.world.player(id))
            .map_or(self.connection.config().player_name.as_str(), |p| p.name.as_str());
        info!(
            "Session over for {}: {} players, {} entities, {} chat lines, {} kills, {} collisions",
            name,
            self.world.player_count(),
            self.world.entity_count(),
            self.world.chat().count(),
            self.world.kill_feed().count(),
            self.world.collisions()
        );
        for (id, player) in self.world.players() {
            info!(
                "  {} ({}): {} kills, {} deaths, {:?}",
                player.name, id, player.kills, player.deaths, player.loadout
            );
        }
        for (id, entity) in self.world.entities() {
            debug!(
                "  {} {:?} at {} moving {} heading {:.2}",
                id, entity.kind, entity.position, entity.velocity, entity.heading
            );
        }

        let stats = self.connection.stats();
        info!(
            "Traffic: {} packets out, {} in, {} resent, {} rejected",
            stats.packets_sent,
            stats.packets_received,
            stats.messages_resent,
            stats.messages_rejected + stats.datagrams_rejected
        );
    }
}
