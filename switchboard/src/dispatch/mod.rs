//! Call correlation and request routing.
//!
//! This module is the heart of the crate: it turns a stream of decoded
//! envelopes into handler invocations and resolved call futures.
//!
//! # Overview
//!
//! ```text
//!  caller side                              callee side
//!  ───────────                              ───────────
//!  Stub::call ──► pending table ──► frame ──► Dispatcher ──► handler task
//!                      ▲                                          │
//!                      │                                          ▼
//!  CallFuture ◄── continuation ◄── frame ◄──────────────── reply envelope
//! ```
//!
//! Requests and responses correlate by key, never by arrival order, so any
//! number of calls can be in flight on one connection and replies may come
//! back in any order.
//!
//! # Failure model
//!
//! Remote failures travel as error payloads inside response envelopes and
//! resolve the matching [`CallFuture`] with an error. Transport failures
//! resolve nothing: when a connection dies, its pending calls are dropped
//! silently and their futures never complete. Callers that need liveness
//! bound each call with
//! [`ConnectionConfig::call_timeout`](crate::connection::ConnectionConfig).

/// Handler registration and typed adapters.
pub mod handlers;

pub(crate) mod dispatcher;
pub(crate) mod pending;

mod future;
mod stub;

// Re-export main types
pub use future::CallFuture;
pub use handlers::{HandlerFuture, HandlerRegistry, RawHandler};
pub use stub::Stub;
