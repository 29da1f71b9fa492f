//! Per-connection traffic counters.

/// Counters describing one connection's traffic and health.
///
/// Kept inside the connection's shared state and updated by the driver, the
/// dispatcher, and the stub; [`Connection::metrics`](super::Connection::metrics)
/// hands out a snapshot by clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetrics {
    /// Whether the transport is currently usable.
    pub is_connected: bool,

    /// Frames written to the stream.
    pub frames_sent: u64,

    /// Bytes written to the stream, framing included.
    pub bytes_sent: u64,

    /// Frames successfully delimited from the stream.
    pub frames_received: u64,

    /// Bytes consumed from the stream, framing included.
    pub bytes_received: u64,

    /// Frames currently waiting in the outbound queue.
    pub current_queue_size: usize,

    /// Frames dropped because the outbound queue was full.
    pub messages_dropped: u64,

    /// Calls issued through stubs on this connection.
    pub calls_issued: u64,

    /// Incoming requests handed to a handler.
    pub requests_handled: u64,

    /// Envelopes dropped because they failed to decode.
    pub decode_errors: u64,

    /// Responses dropped because no pending call claimed their key.
    pub unmatched_responses: u64,

    /// Requests for methods with no registered handler.
    pub unknown_methods: u64,
}

impl ConnectionMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_frame_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub(crate) fn record_message_queued(&mut self) {
        self.current_queue_size += 1;
    }

    pub(crate) fn record_message_dequeued(&mut self) {
        self.current_queue_size = self.current_queue_size.saturating_sub(1);
    }

    pub(crate) fn record_message_dropped(&mut self) {
        self.messages_dropped += 1;
        self.current_queue_size = self.current_queue_size.saturating_sub(1);
    }

    pub(crate) fn record_call_issued(&mut self) {
        self.calls_issued += 1;
    }

    pub(crate) fn record_request_handled(&mut self) {
        self.requests_handled += 1;
    }

    pub(crate) fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub(crate) fn record_unmatched_response(&mut self) {
        self.unmatched_responses += 1;
    }

    pub(crate) fn record_unknown_method(&mut self) {
        self.unknown_methods += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_counters_track_size() {
        let mut metrics = ConnectionMetrics::new();

        metrics.record_message_queued();
        metrics.record_message_queued();
        assert_eq!(metrics.current_queue_size, 2);

        metrics.record_message_dequeued();
        assert_eq!(metrics.current_queue_size, 1);

        metrics.record_message_dropped();
        assert_eq!(metrics.current_queue_size, 0);
        assert_eq!(metrics.messages_dropped, 1);

        // Dropping from an empty queue must not underflow.
        metrics.record_message_dequeued();
        assert_eq!(metrics.current_queue_size, 0);
    }

    #[test]
    fn frame_counters_accumulate_bytes() {
        let mut metrics = ConnectionMetrics::new();
        metrics.record_frame_sent(10);
        metrics.record_frame_sent(5);
        metrics.record_frame_received(7);

        assert_eq!(metrics.frames_sent, 2);
        assert_eq!(metrics.bytes_sent, 15);
        assert_eq!(metrics.frames_received, 1);
        assert_eq!(metrics.bytes_received, 7);
    }
}
