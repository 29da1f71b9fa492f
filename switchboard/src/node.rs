//! Node assembly and stream adoption.
//!
//! [`NodeBuilder`] collects the pieces of a service (descriptor, payload
//! union, codec, handlers, providers, connection config) and validates them
//! once; [`RpcNode`] is the frozen result. After [`NodeBuilder::build`]
//! nothing about the service changes: the envelope layout is composed, the
//! handler registry is sealed, and every connection adopted afterwards
//! shares both.
//!
//! The node does no I/O setup of its own. The host establishes streams
//! however it likes (TCP, Unix sockets, an in-process duplex pipe) and hands
//! each one to [`RpcNode::adopt`], which returns the [`Connection`] handle
//! and starts the driver task.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::codec::MessageCodec;
use crate::connection::core::{ConnectionShared, connection_task};
use crate::connection::{Connection, ConnectionConfig, ConnectionEvent};
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::{HandlerFuture, HandlerRegistry, Stub};
use crate::error::CallError;
use crate::payload::Payload;
use crate::providers::Providers;
use crate::schema::{CompositionError, EnvelopeLayout, SchemaSet, ServiceDescriptor, compose};
use crate::task::TaskProvider;
use crate::types::{Direction, PeerId};
use crate::wire::EnvelopeCodec;

/// Errors from [`NodeBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The descriptor and schema set do not compose into an envelope layout.
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// A handler was registered for a method the descriptor does not
    /// declare.
    #[error("handler registered for unknown method '{method}'")]
    UnknownHandlerMethod {
        /// The offending method name.
        method: String,
    },
}

/// Assembles an [`RpcNode`].
pub struct NodeBuilder<P: Payload, C: MessageCodec, Pr: Providers> {
    descriptor: ServiceDescriptor,
    schemas: Option<SchemaSet>,
    handlers: HandlerRegistry<P>,
    codec: C,
    providers: Pr,
    config: ConnectionConfig,
}

impl<P: Payload, C: MessageCodec, Pr: Providers> NodeBuilder<P, C, Pr> {
    /// Start a builder for the given service.
    pub fn new(descriptor: ServiceDescriptor, codec: C, providers: Pr) -> Self {
        Self {
            descriptor,
            schemas: None,
            handlers: HandlerRegistry::new(),
            codec,
            providers,
            config: ConnectionConfig::default(),
        }
    }

    /// Override the connection configuration.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the schema set.
    ///
    /// By default the set is derived from the payload union's declaration
    /// order; supplying one explicitly is only needed when the union carries
    /// schemas the service does not use and the host wants them excluded
    /// from the layout.
    pub fn with_schemas(mut self, schemas: SchemaSet) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Register a typed handler for `method`.
    ///
    /// Registering the same method twice keeps the later handler.
    pub fn handle<Req, Res, F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        Req: TryFrom<P, Error = P>,
        Res: Into<P>,
        F: Fn(Req, Option<PeerId>) -> Fut + 'static,
        Fut: Future<Output = Result<Res, CallError>> + 'static,
    {
        self.handlers.register(method, handler);
        self
    }

    /// Register a handler working on the raw payload union.
    pub fn handle_raw<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P, Option<PeerId>) -> HandlerFuture<P> + 'static,
    {
        self.handlers.register_raw(method, handler);
        self
    }

    /// Validate everything and freeze the node.
    ///
    /// # Errors
    ///
    /// Fails if a handler names a method outside the descriptor, or if the
    /// descriptor and schema set do not compose. Both are configuration
    /// bugs; a node that fails to build must not adopt streams.
    pub fn build(self) -> Result<RpcNode<P, C, Pr>, BuildError> {
        for method in self.handlers.methods() {
            if self.descriptor.get(method).is_none() {
                return Err(BuildError::UnknownHandlerMethod {
                    method: method.to_string(),
                });
            }
        }

        let schemas = self.schemas.unwrap_or_else(SchemaSet::from_payload::<P>);
        let layout = Rc::new(compose(&self.descriptor, &schemas)?);

        tracing::debug!(
            methods = self.descriptor.len(),
            handlers = self.handlers.len(),
            slots = layout.slot_count(),
            "node built"
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(RpcNode {
            descriptor: Rc::new(self.descriptor),
            codec: EnvelopeCodec::new(layout, self.codec),
            handlers: Rc::new(self.handlers),
            providers: self.providers,
            config: self.config,
            next_connection_id: Cell::new(0),
            event_tx,
            event_rx: RefCell::new(Some(event_rx)),
        })
    }
}

/// A built service endpoint.
///
/// Symmetric by construction: the same node issues calls through stubs and
/// serves them through handlers, on any number of adopted connections.
pub struct RpcNode<P: Payload, C: MessageCodec, Pr: Providers> {
    descriptor: Rc<ServiceDescriptor>,
    codec: EnvelopeCodec<C>,
    handlers: Rc<HandlerRegistry<P>>,
    providers: Pr,
    config: ConnectionConfig,
    next_connection_id: Cell<u64>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: RefCell<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
}

impl<P: Payload, C: MessageCodec, Pr: Providers> RpcNode<P, C, Pr> {
    /// Adopt an established stream and start driving it.
    ///
    /// `peer` is the remote identity when the host knows it, which it
    /// usually does for streams it dialed and usually does not for streams
    /// it accepted. The returned handle closes the connection when dropped;
    /// keep it alive for as long as the stream should run.
    pub fn adopt<S>(
        &self,
        stream: S,
        peer: Option<PeerId>,
        direction: Direction,
    ) -> Connection<P, C>
    where
        S: AsyncRead + AsyncWrite + Unpin + 'static,
    {
        let id = self.next_connection_id.get();
        self.next_connection_id.set(id + 1);

        let shared = ConnectionShared::new(
            id,
            peer.clone(),
            direction,
            self.codec.clone(),
            self.config.clone(),
        );

        tracing::debug!(connection = id, ?peer, ?direction, "adopting stream");

        // The host may never take the event receiver; delivery is
        // best-effort.
        let _ = self.event_tx.send(ConnectionEvent::Opened {
            connection: id,
            peer,
            direction,
        });

        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            self.descriptor.clone(),
            self.handlers.clone(),
            self.providers.clone(),
        );
        let driver = self.providers.task().spawn_task(
            "connection_driver",
            connection_task(
                shared.clone(),
                dispatcher,
                stream,
                shutdown_rx,
                self.event_tx.clone(),
            ),
        );

        Connection::new(shared, shutdown_tx, driver)
    }

    /// Create a stub bound to one of this node's connections.
    pub fn stub(&self, connection: &Connection<P, C>) -> Stub<P, C, Pr> {
        Stub::new(
            self.descriptor.clone(),
            connection.shared().clone(),
            self.providers.clone(),
        )
    }

    /// Take the lifecycle event receiver.
    ///
    /// Returns `Some` on the first call and `None` afterwards.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.event_rx.borrow_mut().take()
    }

    /// The service descriptor this node was built from.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// The composed envelope layout shared by every connection.
    pub fn layout(&self) -> &EnvelopeLayout {
        self.codec.layout()
    }
}
