//! Configuration for connection behavior.

use std::time::Duration;

/// Tunables for one connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum number of encoded frames held in the outbound queue.
    ///
    /// When the queue is full the oldest frame is dropped to make room for
    /// the newest. Drops are counted in the connection metrics.
    pub max_outbound_queue: usize,

    /// How long an issued call may wait for its response.
    ///
    /// When the timer fires first, the pending entry is removed and the
    /// caller's future resolves to a timeout error; a response arriving later
    /// is dropped like any other unmatched response.
    ///
    /// Set to `Duration::ZERO` to disable call timeouts.
    pub call_timeout: Duration,

    /// Size of the buffer handed to each stream read.
    pub read_chunk_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_outbound_queue: 1000,
            call_timeout: Duration::ZERO, // Disabled by default
            read_chunk_size: 4096,
        }
    }
}

impl ConnectionConfig {
    /// Enable call timeouts with the given duration.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Cap the outbound queue at `capacity` frames.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.max_outbound_queue = capacity;
        self
    }
}
