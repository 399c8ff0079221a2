use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Intake buffer between writers and the broadcast loop.
    pub notify_buffer: usize,
    /// Per-connection send queue; overflow drops the pending update.
    pub send_queue: usize,
    /// WebSocket ping interval.
    pub keepalive: Duration,
    /// Presence debounce interval.
    pub presence_tick: Duration,
    /// How long a leader stays authoritative without a heartbeat.
    pub leader_max_life: chrono::Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            notify_buffer: 10,
            send_queue: 10,
            keepalive: Duration::from_secs(5),
            presence_tick: Duration::from_millis(200),
            leader_max_life: chrono::Duration::hours(4),
        }
    }
}

impl ServerConfig {
    pub fn service_settings(&self) -> poker_engine::ServiceSettings {
        poker_engine::ServiceSettings {
            notify_buffer: self.notify_buffer,
            send_queue: self.send_queue,
            presence_tick: self.presence_tick,
            leader_max_life: self.leader_max_life,
        }
    }
}
