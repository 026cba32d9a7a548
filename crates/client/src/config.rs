use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tick_rate: u32,
    /// Input messages per second once connected.
    pub input_rate: u32,
    /// Stop after this long; run until the connection ends when `None`.
    pub run_for: Option<Duration>,
}

impl ClientConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn input_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.input_rate.max(1) as f64)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            input_rate: 30,
            run_for: None,
        }
    }
}
