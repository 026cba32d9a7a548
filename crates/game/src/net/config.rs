use std::time::Duration;

use super::protocol::MAX_PACKET_SIZE;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub player_name: String,
    pub max_packet_size: usize,
    pub connect_timeout: Duration,
    pub drop_timeout: Duration,
    pub lag_threshold: Duration,
    pub disconnect_count: u32,
    pub disconnect_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            player_name: String::from("player"),
            max_packet_size: MAX_PACKET_SIZE,
            connect_timeout: Duration::from_secs(10),
            drop_timeout: Duration::from_secs(5),
            lag_threshold: Duration::from_millis(500),
            disconnect_count: 3,
            disconnect_interval: Duration::from_millis(50),
        }
    }
}
