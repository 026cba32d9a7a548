use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_players: usize,
    /// Silence after which a peer is removed.
    pub peer_timeout: Duration,
    /// Ticks between avatar Update broadcasts.
    pub update_rate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_players: 16,
            peer_timeout: Duration::from_secs(10),
            update_rate: 2,
        }
    }
}
