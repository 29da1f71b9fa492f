//! # Switchboard
//!
//! Request/response correlation and dispatch over host-provided byte
//! streams.
//!
//! This crate provides:
//! - **Envelope composition**: deterministic wire layouts derived from
//!   declared message schemas and a service descriptor
//! - **Varint framing**: length-prefixed frames over any ordered, reliable
//!   byte stream the host establishes
//! - **Connection driver**: one task per stream with a bounded outbound
//!   queue, so callers never block on I/O
//! - **Dispatch**: calls correlated by random 128-bit keys, typed handlers,
//!   and stub handles for issuing calls
//!
//! The host owns the transport. Anything implementing `AsyncRead +
//! AsyncWrite` can be adopted: a TCP socket, a Unix socket, or an
//! in-process duplex pipe in tests.
//!
//! ```ignore
//! switchboard::rpc_schemas! {
//!     pub enum CalcPayload {
//!         pub struct AddRequest { pub a: i64, pub b: i64 }
//!         pub struct AddReply { pub sum: i64 }
//!     }
//! }
//!
//! let descriptor = ServiceDescriptor::new().method("add", "AddRequest", "AddReply");
//! let node = NodeBuilder::<CalcPayload, _, _>::new(descriptor, JsonCodec, TokioProviders::new())
//!     .handle("add", |req: AddRequest, _peer| async move {
//!         Ok(AddReply { sum: req.a + req.b })
//!     })
//!     .build()?;
//!
//! let connection = node.adopt(stream, None, Direction::Outgoing);
//! let reply: AddReply = node.stub(&connection).call("add", AddRequest { a: 2, b: 3 })?.await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Pluggable payload serialization.
pub mod codec;

/// Connection lifecycle over adopted streams.
pub mod connection;

/// Call correlation, handlers, and stubs.
pub mod dispatch;

/// Error types for calls and stubs.
pub mod error;

/// Declarative payload-union and service macros.
mod macros;

/// Node assembly and stream adoption.
pub mod node;

/// The payload union contract.
pub mod payload;

/// Provider bundle for time, tasks, and randomness.
pub mod providers;

/// Random number generation provider abstraction.
pub mod random;

/// Message schemas, service descriptors, and envelope composition.
pub mod schema;

/// Task provider abstraction for spawning local tasks.
pub mod task;

/// Time provider abstraction for delays and timeouts.
pub mod time;

/// Identifier types shared across the crate.
pub mod types;

/// Envelope wire format and framing.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Core type exports
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use error::{CallError, StubError};
pub use payload::Payload;
pub use types::{CallId, Direction, PeerId};

// Schema exports
pub use schema::{
    CompositionError, ERROR_SLOT, EnvelopeLayout, FIRST_PAYLOAD_TAG, FieldKind, MessageSchema,
    MethodSpec, SchemaSet, ServiceDescriptor, compose,
};

// Wire format exports
pub use wire::{
    DecodeError, EncodeError, Envelope, EnvelopeCodec, MAX_FRAME_SIZE, MAX_VARINT_LEN,
    MessageKind, WireError, decode_frame, decode_varint, encode_frame, encode_varint,
    try_decode_frame,
};

// Connection exports
pub use connection::{
    CloseReason, Connection, ConnectionConfig, ConnectionEvent, ConnectionMetrics,
};

// Dispatch exports
pub use dispatch::{CallFuture, HandlerFuture, HandlerRegistry, RawHandler, Stub};

// Node exports
pub use node::{BuildError, NodeBuilder, RpcNode};

// Provider exports
pub use providers::{Providers, TokioProviders};
pub use random::{RandomProvider, TokioRandomProvider};
pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};
