//! Connection handle, shared state, and the driver task.
//!
//! Each adopted stream gets exactly one driver task that owns the stream and
//! performs all I/O. Everything else talks to the connection through shared
//! state behind `Rc<RefCell<..>>`: the stub enqueues request frames and
//! registers pending calls, the dispatcher enqueues replies, and the driver
//! drains the queue and feeds decoded envelopes back into dispatch. Borrows
//! are short and never held across an await.
//!
//! Teardown is one-way. When the stream errors, reaches EOF, or violates the
//! framing contract, the driver marks the connection closed, clears the
//! outbound queue, discards every pending call without invoking it, and
//! exits. There is no reconnection: a correlation key is only meaningful to
//! the peer that issued it, so a fresh stream is a fresh connection with a
//! fresh table.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::codec::MessageCodec;
use crate::connection::{ConnectionConfig, ConnectionMetrics};
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::pending::{Continuation, PendingCalls};
use crate::payload::Payload;
use crate::providers::Providers;
use crate::types::{CallId, Direction, PeerId};
use crate::wire::EnvelopeCodec;

/// Lifecycle notifications delivered on the node's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A stream was adopted and its driver started.
    Opened {
        /// Node-local connection id, for log correlation.
        connection: u64,
        /// Peer identity, when the host supplied one.
        peer: Option<PeerId>,
        /// Who initiated the stream.
        direction: Direction,
    },
    /// The driver exited and the connection's state was torn down.
    Closed {
        /// Node-local connection id, for log correlation.
        connection: u64,
        /// Peer identity, when the host supplied one.
        peer: Option<PeerId>,
        /// Why the connection ended.
        reason: CloseReason,
    },
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The local host closed it.
    Requested,
    /// The remote side closed the stream.
    PeerClosed,
    /// Reading or writing the stream failed.
    TransportError(String),
    /// The inbound bytes violated the framing contract; frame boundaries
    /// were unrecoverable.
    FramingViolation(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Requested => f.write_str("requested"),
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::TransportError(e) => write!(f, "transport error: {}", e),
            CloseReason::FramingViolation(e) => write!(f, "framing violation: {}", e),
        }
    }
}

/// Marker error: the connection is closed.
#[derive(Debug)]
pub(crate) struct ConnectionClosed;

/// State mutated from multiple tasks on the same thread.
struct ConnState<P> {
    /// Encoded frames waiting for the driver, oldest first.
    outbound: VecDeque<Vec<u8>>,

    /// Calls awaiting a response.
    pending: PendingCalls<P>,

    /// Traffic counters.
    metrics: ConnectionMetrics,

    /// Set once, by teardown.
    closed: bool,
}

/// Everything the stub, the dispatcher, and the driver share.
pub(crate) struct ConnectionShared<P, C: MessageCodec> {
    id: u64,
    peer: Option<PeerId>,
    direction: Direction,
    codec: EnvelopeCodec<C>,
    config: ConnectionConfig,
    state: RefCell<ConnState<P>>,
    data_to_send: Notify,
}

impl<P, C: MessageCodec> ConnectionShared<P, C> {
    pub(crate) fn new(
        id: u64,
        peer: Option<PeerId>,
        direction: Direction,
        codec: EnvelopeCodec<C>,
        config: ConnectionConfig,
    ) -> Rc<Self> {
        let mut metrics = ConnectionMetrics::new();
        metrics.is_connected = true;

        Rc::new(Self {
            id,
            peer,
            direction,
            codec,
            config,
            state: RefCell::new(ConnState {
                outbound: VecDeque::new(),
                pending: PendingCalls::new(),
                metrics,
                closed: false,
            }),
            data_to_send: Notify::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn codec(&self) -> &EnvelopeCodec<C> {
        &self.codec
    }

    pub(crate) fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub(crate) fn metrics_snapshot(&self) -> ConnectionMetrics {
        self.state.borrow().metrics.clone()
    }

    pub(crate) fn update_metrics(&self, update: impl FnOnce(&mut ConnectionMetrics)) {
        update(&mut self.state.borrow_mut().metrics);
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.state.borrow().outbound.len()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub(crate) fn has_pending(&self, key: &CallId) -> bool {
        self.state.borrow().pending.contains(key)
    }

    /// Register a continuation for an issued call.
    pub(crate) fn register_pending(
        &self,
        key: CallId,
        continuation: Continuation<P>,
    ) -> Result<(), ConnectionClosed> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(ConnectionClosed);
        }
        state.pending.insert(key, continuation);
        Ok(())
    }

    /// Take the continuation for `key`, whether to complete or abandon it.
    pub(crate) fn take_pending(&self, key: &CallId) -> Option<Continuation<P>> {
        self.state.borrow_mut().pending.remove(key)
    }

    /// Queue an encoded frame for the driver, dropping the oldest queued
    /// frame if the queue is at capacity.
    pub(crate) fn enqueue_frame(&self, frame: Vec<u8>) -> Result<(), ConnectionClosed> {
        let first_unsent;
        {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(ConnectionClosed);
            }

            if state.outbound.len() >= self.config.max_outbound_queue
                && state.outbound.pop_front().is_some()
            {
                state.metrics.record_message_dropped();
                tracing::warn!(
                    connection = self.id,
                    capacity = self.config.max_outbound_queue,
                    "outbound queue full, dropping oldest frame"
                );
            }

            first_unsent = state.outbound.is_empty();
            state.outbound.push_back(frame);
            state.metrics.record_message_queued();
        }

        // Wake the driver only for the first frame; it drains the whole
        // queue per wakeup.
        if first_unsent {
            self.data_to_send.notify_one();
        }
        Ok(())
    }

    /// Mark closed, clear the queue, and discard pending calls.
    ///
    /// Discarded continuations are dropped, never invoked; their futures
    /// stay pending forever unless a call timeout resolves them. Returns the
    /// number of discarded calls. Idempotent.
    pub(crate) fn teardown(&self) -> usize {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return 0;
        }
        state.closed = true;
        state.metrics.is_connected = false;
        state.outbound.clear();
        state.metrics.current_queue_size = 0;
        state.pending.discard_all()
    }
}

#[cfg(test)]
impl<P, C: MessageCodec> ConnectionShared<P, C> {
    pub(crate) fn pop_outbound(&self) -> Option<Vec<u8>> {
        self.state.borrow_mut().outbound.pop_front()
    }
}

/// Handle to a live connection.
///
/// Dropping the handle shuts the driver down just like [`close`](Self::close),
/// except nothing waits for the driver to finish. Stubs hold their own
/// reference to the shared state, so an early drop tears down their calls
/// too.
pub struct Connection<P, C: MessageCodec> {
    shared: Rc<ConnectionShared<P, C>>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    driver_handle: Option<JoinHandle<()>>,
}

impl<P, C: MessageCodec> Connection<P, C> {
    pub(crate) fn new(
        shared: Rc<ConnectionShared<P, C>>,
        shutdown_tx: mpsc::UnboundedSender<()>,
        driver_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            shared,
            shutdown_tx,
            driver_handle: Some(driver_handle),
        }
    }

    pub(crate) fn shared(&self) -> &Rc<ConnectionShared<P, C>> {
        &self.shared
    }

    /// Node-local connection id, for log correlation.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Peer identity, when the host supplied one.
    pub fn peer(&self) -> Option<&PeerId> {
        self.shared.peer()
    }

    /// Who initiated the stream.
    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    /// Whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Frames currently waiting in the outbound queue.
    pub fn queue_size(&self) -> usize {
        self.shared.queue_size()
    }

    /// Calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending_len()
    }

    /// Snapshot of the connection's traffic counters.
    pub fn metrics(&self) -> ConnectionMetrics {
        self.shared.metrics_snapshot()
    }

    /// Close the connection and wait for the driver to finish.
    ///
    /// Pending calls are discarded; queued outbound frames are not flushed.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.driver_handle.take() {
            let _ = handle.await;
        }
    }
}

/// Driver task owning the stream; one per connection.
///
/// Event-driven: waits on shutdown, outbound data, and inbound bytes, and
/// only ever does one of the three at a time.
pub(crate) async fn connection_task<P, C, Pr, S>(
    shared: Rc<ConnectionShared<P, C>>,
    dispatcher: Dispatcher<P, Pr>,
    mut stream: S,
    mut shutdown_rx: mpsc::UnboundedReceiver<()>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) where
    P: Payload,
    C: MessageCodec,
    Pr: Providers,
    S: AsyncRead + AsyncWrite + Unpin + 'static,
{
    let mut read_buffer: Vec<u8> = Vec::with_capacity(shared.config.read_chunk_size);
    let mut chunk = vec![0u8; shared.config.read_chunk_size];

    let reason = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!(connection = shared.id, "driver shutting down");
                break CloseReason::Requested;
            }

            _ = shared.data_to_send.notified() => {
                if let Err(reason) = flush_outbound(&shared, &mut stream).await {
                    break reason;
                }
            }

            read = stream.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        tracing::debug!(connection = shared.id, "stream reached EOF");
                        break CloseReason::PeerClosed;
                    }
                    Ok(n) => {
                        read_buffer.extend_from_slice(&chunk[..n]);
                        if let Err(reason) = drain_frames(&shared, &dispatcher, &mut read_buffer) {
                            break reason;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(connection = shared.id, error = %e, "stream read failed");
                        break CloseReason::TransportError(e.to_string());
                    }
                }
            }
        }
    };

    let discarded = shared.teardown();
    if discarded > 0 {
        tracing::debug!(
            connection = shared.id,
            discarded,
            "discarded pending calls on teardown"
        );
    }
    tracing::debug!(connection = shared.id, reason = %reason, "connection closed");

    let _ = events.send(ConnectionEvent::Closed {
        connection: shared.id,
        peer: shared.peer.clone(),
        reason,
    });
}

/// Write queued frames until the queue is empty.
async fn flush_outbound<P, C, S>(
    shared: &Rc<ConnectionShared<P, C>>,
    stream: &mut S,
) -> Result<(), CloseReason>
where
    C: MessageCodec,
    S: AsyncWrite + Unpin,
{
    loop {
        // Short borrow: pop one frame, then write with no borrow held.
        let frame = shared.state.borrow_mut().outbound.pop_front();
        let Some(frame) = frame else {
            return Ok(());
        };

        match stream.write_all(&frame).await {
            Ok(()) => {
                let mut state = shared.state.borrow_mut();
                state.metrics.record_frame_sent(frame.len());
                state.metrics.record_message_dequeued();
            }
            Err(e) => {
                tracing::debug!(connection = shared.id, error = %e, "stream write failed");
                return Err(CloseReason::TransportError(e.to_string()));
            }
        }
    }
}

/// Decode and dispatch every complete frame in the read buffer.
///
/// Per-message decode failures are logged and dropped; framing failures are
/// returned so the driver tears the connection down.
fn drain_frames<P, C, Pr>(
    shared: &Rc<ConnectionShared<P, C>>,
    dispatcher: &Dispatcher<P, Pr>,
    read_buffer: &mut Vec<u8>,
) -> Result<(), CloseReason>
where
    P: Payload,
    C: MessageCodec,
    Pr: Providers,
{
    loop {
        match shared.codec.try_decode::<P>(read_buffer) {
            Ok(None) => return Ok(()),
            Ok(Some((consumed, decoded))) => {
                shared.update_metrics(|m| m.record_frame_received(consumed));
                read_buffer.drain(..consumed);

                match decoded {
                    Ok(envelope) => dispatcher.dispatch(shared, envelope),
                    Err(error) => {
                        shared.update_metrics(|m| m.record_decode_error());
                        tracing::warn!(
                            connection = shared.id,
                            error = %error,
                            "dropping undecodable envelope"
                        );
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    connection = shared.id,
                    error = %error,
                    "wire format violation, tearing down connection"
                );
                return Err(CloseReason::FramingViolation(error.to_string()));
            }
        }
    }
}
