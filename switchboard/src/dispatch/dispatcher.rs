//! Envelope dispatch.
//!
//! Every decoded envelope from a connection lands here. Responses are matched
//! against the connection's pending call table by correlation key; requests
//! are routed to the frozen handler registry by method name. Handler
//! invocations run on their own spawned task so a slow handler never stalls
//! the connection's read loop, and their replies reuse the request's key.
//!
//! Failure policy, in one place:
//!
//! - response with no pending key: count it, log it, drop it
//! - request carrying an error payload: malformed, drop it
//! - request for an unregistered method: error reply to the caller
//! - request or reply payload not matching the declared schema: error reply
//!
//! Nothing here tears a connection down. Envelope-level trouble is always
//! scoped to the one message.

use std::rc::Rc;

use crate::codec::MessageCodec;
use crate::connection::core::ConnectionShared;
use crate::dispatch::handlers::HandlerRegistry;
use crate::error::CallError;
use crate::payload::Payload;
use crate::providers::Providers;
use crate::schema::ServiceDescriptor;
use crate::task::TaskProvider;
use crate::types::CallId;
use crate::wire::{Envelope, MessageKind};

/// Routes envelopes for every connection of one node.
pub(crate) struct Dispatcher<P, Pr: Providers> {
    descriptor: Rc<ServiceDescriptor>,
    handlers: Rc<HandlerRegistry<P>>,
    providers: Pr,
}

impl<P, Pr: Providers> Clone for Dispatcher<P, Pr> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            handlers: self.handlers.clone(),
            providers: self.providers.clone(),
        }
    }
}

impl<P: Payload, Pr: Providers> Dispatcher<P, Pr> {
    pub(crate) fn new(
        descriptor: Rc<ServiceDescriptor>,
        handlers: Rc<HandlerRegistry<P>>,
        providers: Pr,
    ) -> Self {
        Self {
            descriptor,
            handlers,
            providers,
        }
    }

    /// Route one decoded envelope.
    pub(crate) fn dispatch<C: MessageCodec>(
        &self,
        connection: &Rc<ConnectionShared<P, C>>,
        envelope: Envelope<P>,
    ) {
        match envelope.kind {
            MessageKind::Response => self.dispatch_response(connection, envelope),
            MessageKind::Request => self.dispatch_request(connection, envelope),
        }
    }

    fn dispatch_response<C: MessageCodec>(
        &self,
        connection: &Rc<ConnectionShared<P, C>>,
        envelope: Envelope<P>,
    ) {
        match connection.take_pending(&envelope.key) {
            Some(continuation) => {
                tracing::trace!(
                    connection = connection.id(),
                    key = %envelope.key,
                    method = %envelope.method,
                    "response matched pending call"
                );
                continuation(envelope.body);
            }
            None => {
                // Late (post-timeout), duplicate, or fabricated. All equally
                // droppable.
                connection.update_metrics(|m| m.record_unmatched_response());
                tracing::debug!(
                    connection = connection.id(),
                    key = %envelope.key,
                    method = %envelope.method,
                    "dropping response with no pending call"
                );
            }
        }
    }

    fn dispatch_request<C: MessageCodec>(
        &self,
        connection: &Rc<ConnectionShared<P, C>>,
        envelope: Envelope<P>,
    ) {
        let key = envelope.key;
        let method = envelope.method;

        let payload = match envelope.body {
            Ok(payload) => payload,
            Err(_) => {
                tracing::warn!(
                    connection = connection.id(),
                    method = %method,
                    "dropping request carrying an error payload"
                );
                return;
            }
        };

        let Some(handler) = self.handlers.get(&method) else {
            connection.update_metrics(|m| m.record_unknown_method());
            tracing::warn!(
                connection = connection.id(),
                method = %method,
                "request for method with no registered handler"
            );
            send_reply(
                connection,
                key,
                &method,
                Err(CallError::UnknownMethod {
                    method: method.clone(),
                }),
            );
            return;
        };

        // Node construction guarantees every registered method has a
        // descriptor entry.
        let Some(spec) = self.descriptor.get(&method) else {
            tracing::error!(
                connection = connection.id(),
                method = %method,
                "handler registered for a method missing from the descriptor"
            );
            send_reply(
                connection,
                key,
                &method,
                Err(CallError::UnknownMethod {
                    method: method.clone(),
                }),
            );
            return;
        };

        let actual = payload.schema_name();
        if actual != spec.request {
            tracing::warn!(
                connection = connection.id(),
                method = %method,
                expected = %spec.request,
                actual = %actual,
                "request payload does not match declared schema"
            );
            send_reply(
                connection,
                key,
                &method,
                Err(CallError::UnexpectedPayload {
                    expected: spec.request.clone(),
                    actual: actual.to_string(),
                }),
            );
            return;
        }

        connection.update_metrics(|m| m.record_request_handled());

        // Build the future while the registry borrow is live, then hand it
        // to its own task so dispatch returns immediately.
        let invocation = handler(payload, connection.peer().cloned());
        let declared_response = spec.response.clone();
        let connection = connection.clone();
        self.providers.task().spawn_task("rpc_handler", async move {
            let mut outcome = invocation.await;

            if let Ok(reply) = &outcome {
                let actual = reply.schema_name();
                if actual != declared_response {
                    tracing::error!(
                        connection = connection.id(),
                        method = %method,
                        expected = %declared_response,
                        actual = %actual,
                        "handler returned undeclared response type"
                    );
                    outcome = Err(CallError::Handler {
                        message: format!(
                            "handler returned '{actual}', declared response '{declared_response}'"
                        ),
                    });
                }
            }

            send_reply(&connection, key, &method, outcome);
        });
    }
}

/// Encode a response envelope and queue it, reusing the request's key.
///
/// Both failure modes end in a drop: an encode failure is logged loudly (a
/// reply we built ourselves should always encode), a closed connection
/// quietly (the caller is gone).
fn send_reply<P: Payload, C: MessageCodec>(
    connection: &Rc<ConnectionShared<P, C>>,
    key: CallId,
    method: &str,
    body: Result<P, CallError>,
) {
    let envelope = Envelope::response(key, method, body);
    match connection.codec().encode(&envelope) {
        Ok(frame) => {
            if connection.enqueue_frame(frame).is_err() {
                tracing::debug!(
                    connection = connection.id(),
                    method = %method,
                    "connection closed before reply could be queued"
                );
            }
        }
        Err(error) => {
            tracing::error!(
                connection = connection.id(),
                method = %method,
                error = %error,
                "failed to encode reply, dropping it"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::connection::ConnectionConfig;
    use crate::providers::TokioProviders;
    use crate::schema::{SchemaSet, compose};
    use crate::types::Direction;
    use crate::wire::EnvelopeCodec;
    use std::cell::RefCell;
    use std::time::Duration;

    crate::rpc_schemas! {
        /// Payload union for dispatcher tests.
        pub enum ArithPayload {
            /// Ask for a sum.
            pub struct SumRequest {
                /// Operands.
                pub terms: Vec<i64>,
            }

            /// The sum.
            pub struct SumReply {
                /// Total of the operands.
                pub total: i64,
            }
        }
    }

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new().method("sum", "SumRequest", "SumReply")
    }

    fn fixture(
        handlers: HandlerRegistry<ArithPayload>,
    ) -> (
        Dispatcher<ArithPayload, TokioProviders>,
        Rc<ConnectionShared<ArithPayload, JsonCodec>>,
    ) {
        let descriptor = Rc::new(descriptor());
        let schemas = SchemaSet::from_payload::<ArithPayload>();
        let layout = Rc::new(compose(&descriptor, &schemas).expect("compose"));
        let codec = EnvelopeCodec::new(layout, JsonCodec);

        let dispatcher = Dispatcher::new(descriptor, Rc::new(handlers), TokioProviders::new());
        let connection = ConnectionShared::new(
            7,
            None,
            Direction::Incoming,
            codec,
            ConnectionConfig::default(),
        );
        (dispatcher, connection)
    }

    fn queued_reply(
        connection: &Rc<ConnectionShared<ArithPayload, JsonCodec>>,
    ) -> Envelope<ArithPayload> {
        let frame = connection.pop_outbound().expect("a reply should be queued");
        let (consumed, decoded) = connection
            .codec()
            .try_decode::<ArithPayload>(&frame)
            .expect("framing")
            .expect("complete frame");
        assert_eq!(consumed, frame.len());
        decoded.expect("reply should decode")
    }

    #[tokio::test]
    async fn response_resolves_pending_call() {
        let (dispatcher, connection) = fixture(HandlerRegistry::new());

        let key = CallId::new(1, 2);
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        connection
            .register_pending(key, Box::new(move |body| *sink.borrow_mut() = Some(body)))
            .expect("register");

        let envelope = Envelope::response(
            key,
            "sum",
            Ok(ArithPayload::SumReply(SumReply { total: 3 })),
        );
        dispatcher.dispatch(&connection, envelope);

        assert_eq!(
            *seen.borrow(),
            Some(Ok(ArithPayload::SumReply(SumReply { total: 3 })))
        );
        assert_eq!(connection.pending_len(), 0);
    }

    #[tokio::test]
    async fn unmatched_response_is_dropped() {
        let (dispatcher, connection) = fixture(HandlerRegistry::new());

        let envelope = Envelope::response(
            CallId::new(9, 9),
            "sum",
            Ok(ArithPayload::SumReply(SumReply { total: 1 })),
        );
        dispatcher.dispatch(&connection, envelope);

        assert_eq!(connection.metrics_snapshot().unmatched_responses, 1);
        assert!(connection.pop_outbound().is_none());
    }

    #[tokio::test]
    async fn request_runs_handler_and_replies_with_same_key() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut handlers = HandlerRegistry::new();
                handlers.register("sum", |request: SumRequest, _peer| async move {
                    Ok(SumReply {
                        total: request.terms.iter().sum(),
                    })
                });
                let (dispatcher, connection) = fixture(handlers);

                let key = CallId::new(0xAB, 0xCD);
                let envelope = Envelope::request(
                    key,
                    "sum",
                    ArithPayload::SumRequest(SumRequest {
                        terms: vec![1, 2, 3],
                    }),
                );
                dispatcher.dispatch(&connection, envelope);

                // Let the spawned handler task run.
                tokio::time::sleep(Duration::from_millis(5)).await;

                let reply = queued_reply(&connection);
                assert_eq!(reply.key, key);
                assert_eq!(reply.kind, MessageKind::Response);
                assert_eq!(reply.method, "sum");
                assert_eq!(
                    reply.body,
                    Ok(ArithPayload::SumReply(SumReply { total: 6 }))
                );
                assert_eq!(connection.metrics_snapshot().requests_handled, 1);
            })
            .await;
    }

    #[tokio::test]
    async fn unknown_method_gets_error_reply() {
        let (dispatcher, connection) = fixture(HandlerRegistry::new());

        let key = CallId::new(5, 5);
        let envelope = Envelope::request(
            key,
            "sum",
            ArithPayload::SumRequest(SumRequest { terms: vec![] }),
        );
        dispatcher.dispatch(&connection, envelope);

        let reply = queued_reply(&connection);
        assert_eq!(reply.key, key);
        assert_eq!(
            reply.body,
            Err(CallError::UnknownMethod {
                method: "sum".to_string()
            })
        );
        assert_eq!(connection.metrics_snapshot().unknown_methods, 1);
    }

    #[tokio::test]
    async fn request_carrying_error_payload_is_dropped() {
        let mut handlers = HandlerRegistry::new();
        handlers.register("sum", |_request: SumRequest, _peer| async move {
            Ok(SumReply { total: 0 })
        });
        let (dispatcher, connection) = fixture(handlers);

        let envelope: Envelope<ArithPayload> = Envelope {
            key: CallId::new(1, 1),
            method: "sum".to_string(),
            kind: MessageKind::Request,
            body: Err(CallError::Timeout),
        };
        dispatcher.dispatch(&connection, envelope);

        assert!(connection.pop_outbound().is_none());
        assert_eq!(connection.metrics_snapshot().requests_handled, 0);
    }

    #[tokio::test]
    async fn wrong_request_schema_is_rejected() {
        let mut handlers = HandlerRegistry::new();
        handlers.register("sum", |_request: SumRequest, _peer| async move {
            Ok(SumReply { total: 0 })
        });
        let (dispatcher, connection) = fixture(handlers);

        // A reply payload where the request belongs.
        let envelope = Envelope::request(
            CallId::new(2, 2),
            "sum",
            ArithPayload::SumReply(SumReply { total: 1 }),
        );
        dispatcher.dispatch(&connection, envelope);

        let reply = queued_reply(&connection);
        assert_eq!(
            reply.body,
            Err(CallError::UnexpectedPayload {
                expected: "SumRequest".to_string(),
                actual: "SumReply".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn handler_returning_undeclared_type_becomes_handler_error() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut handlers: HandlerRegistry<ArithPayload> = HandlerRegistry::new();
                handlers.register_raw("sum", |payload, _peer| {
                    // Echo the request back where a SumReply belongs.
                    Box::pin(async move { Ok(payload) })
                });
                let (dispatcher, connection) = fixture(handlers);

                let envelope = Envelope::request(
                    CallId::new(3, 3),
                    "sum",
                    ArithPayload::SumRequest(SumRequest { terms: vec![1] }),
                );
                dispatcher.dispatch(&connection, envelope);

                tokio::time::sleep(Duration::from_millis(5)).await;

                let reply = queued_reply(&connection);
                match reply.body {
                    Err(CallError::Handler { message }) => {
                        assert!(message.contains("SumRequest"), "got: {message}");
                        assert!(message.contains("SumReply"), "got: {message}");
                    }
                    other => panic!("expected handler error, got {other:?}"),
                }
            })
            .await;
    }
}
