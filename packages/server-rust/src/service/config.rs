use std::time::Duration;

/// Server-level configuration for the gateway.
///
/// Controls queue-group membership, concurrency limits, and shutdown timing.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Queue group shared by every instance serving the same command subjects.
    pub queue_group: String,
    /// Maximum number of concurrent dispatches before load shedding.
    pub max_concurrent_operations: u32,
    /// Capacity of the event publish queue. Events beyond it are dropped.
    pub event_queue_capacity: usize,
    /// Interval between event publisher statistics log lines.
    pub event_stats_interval: Duration,
    /// How long shutdown waits for in-flight dispatches to finish.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_group: "cent".to_string(),
            max_concurrent_operations: 1000,
            event_queue_capacity: 1024,
            event_stats_interval: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
