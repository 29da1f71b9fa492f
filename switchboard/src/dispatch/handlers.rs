//! Handler registry.
//!
//! Methods are registered while the node is being built and the set is
//! frozen once the node exists; the dispatcher only ever reads it. This
//! write-then-freeze split means dispatch never races a registration and
//! lookups need no locking of any kind.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::CallError;
use crate::payload::Payload;
use crate::types::PeerId;

/// The future a handler invocation produces.
pub type HandlerFuture<P> = Pin<Box<dyn Future<Output = Result<P, CallError>>>>;

/// A type-erased handler: payload union in, payload union (or error) out.
pub type RawHandler<P> = Box<dyn Fn(P, Option<PeerId>) -> HandlerFuture<P>>;

/// The methods a node serves.
///
/// Later registrations for the same method replace earlier ones; the last
/// writer before the freeze wins.
pub struct HandlerRegistry<P> {
    handlers: HashMap<String, RawHandler<P>>,
}

impl<P: Payload> HandlerRegistry<P> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler for `method`.
    ///
    /// The request payload is narrowed to `Req` before the handler runs and
    /// the `Res` it returns is widened back into the payload union. A payload
    /// that does not narrow (possible only when the descriptor and the
    /// handler disagree about the method's request type) resolves to a
    /// [`CallError::Handler`] reply without invoking the handler.
    pub fn register<Req, Res, F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        Req: TryFrom<P, Error = P>,
        Res: Into<P>,
        F: Fn(Req, Option<PeerId>) -> Fut + 'static,
        Fut: Future<Output = Result<Res, CallError>> + 'static,
    {
        let raw: RawHandler<P> =
            Box::new(move |payload: P, peer: Option<PeerId>| -> HandlerFuture<P> {
                match Req::try_from(payload) {
                    Ok(request) => {
                        let invocation = handler(request, peer);
                        Box::pin(async move { invocation.await.map(Into::into) })
                    }
                    Err(rejected) => {
                        let error = CallError::Handler {
                            message: format!(
                                "handler cannot accept payload '{}'",
                                rejected.schema_name()
                            ),
                        };
                        Box::pin(async move { Err(error) })
                    }
                }
            });
        self.handlers.insert(method.into(), raw);
    }

    /// Register a handler working on the raw payload union.
    ///
    /// Escape hatch for methods that want to inspect the payload themselves.
    pub fn register_raw<F>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(P, Option<PeerId>) -> HandlerFuture<P> + 'static,
    {
        self.handlers.insert(method.into(), Box::new(handler));
    }

    pub(crate) fn get(&self, method: &str) -> Option<&RawHandler<P>> {
        self.handlers.get(method)
    }

    /// Whether a handler is registered for `method`.
    pub fn contains_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<P: Payload> Default for HandlerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
