//! Connection lifecycle over adopted streams.
//!
//! The crate never dials or listens. The host hands each established,
//! ordered, reliable byte stream to the node, which wraps it in a
//! [`Connection`]: a driver task owning the stream, a bounded outbound frame
//! queue, and a pending-call table shared with the dispatch layer.
//!
//! # Lifecycle
//!
//! ```text
//! host stream ──► adopt ──► Active ──► torn down
//!                             │            ▲
//!                             │ EOF, transport error,
//!                             │ framing violation, close()
//!                             └────────────┘
//! ```
//!
//! Teardown is terminal and one-way: the queue is cleared, pending calls are
//! discarded without resolving, and a [`ConnectionEvent::Closed`] is
//! emitted. Reconnection, if wanted, is the host's business; it adopts a
//! fresh stream and gets a fresh connection.
//!
//! Per-message decode failures never reach teardown. An envelope that does
//! not decode is counted, logged, and dropped, and the connection keeps
//! going; only a violation of the length-prefixed framing itself (where
//! resynchronization is impossible) kills the stream.

mod config;
mod metrics;

pub(crate) mod core;

// Re-export main types
pub use config::ConnectionConfig;
pub use core::{CloseReason, Connection, ConnectionEvent};
pub use metrics::ConnectionMetrics;
