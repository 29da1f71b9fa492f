//! Typed client surface for issuing calls.
//!
//! A [`Stub`] borrows nothing from its node: it holds the service descriptor
//! and a handle to one connection's shared state, so it can be cloned freely
//! and moved into tasks. Each [`call`](Stub::call) validates the request
//! against the descriptor, draws a fresh correlation key, registers a
//! continuation in the connection's pending table, and queues the encoded
//! request. The returned [`CallFuture`] resolves when a response with the
//! same key arrives.
//!
//! If the connection dies first, the future never resolves; the pending
//! table is discarded without invoking continuations so a dead transport is
//! indistinguishable from a slow peer. Hosts that need liveness opt into
//! [`ConnectionConfig::call_timeout`](crate::connection::ConnectionConfig),
//! which resolves overdue calls with [`CallError::Timeout`].

use std::rc::Rc;
use std::time::Duration;

use crate::codec::MessageCodec;
use crate::connection::core::ConnectionShared;
use crate::dispatch::future::{CallFuture, call_slot};
use crate::error::{CallError, StubError};
use crate::payload::Payload;
use crate::providers::Providers;
use crate::schema::ServiceDescriptor;
use crate::task::TaskProvider;
use crate::time::TimeProvider;
use crate::types::CallId;
use crate::wire::Envelope;

/// Client handle for calling methods over one connection.
pub struct Stub<P, C: MessageCodec, Pr: Providers> {
    descriptor: Rc<ServiceDescriptor>,
    connection: Rc<ConnectionShared<P, C>>,
    providers: Pr,
}

impl<P, C: MessageCodec, Pr: Providers> Clone for Stub<P, C, Pr> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            connection: self.connection.clone(),
            providers: self.providers.clone(),
        }
    }
}

impl<P: Payload, C: MessageCodec, Pr: Providers> Stub<P, C, Pr> {
    pub(crate) fn new(
        descriptor: Rc<ServiceDescriptor>,
        connection: Rc<ConnectionShared<P, C>>,
        providers: Pr,
    ) -> Self {
        Self {
            descriptor,
            connection,
            providers,
        }
    }

    /// Issue a call and get a future for its reply.
    ///
    /// The request type converts into the payload union; the response type
    /// converts back out. With the `rpc_schemas!` union both conversions come
    /// for free, so a call site reads:
    ///
    /// ```ignore
    /// let reply: SumReply = stub.call("sum", SumRequest { terms })?.await?;
    /// ```
    ///
    /// Errors returned here are local and synchronous: the method is missing
    /// from the descriptor, the payload is not the method's declared request
    /// type, the envelope would not encode, or the connection is already
    /// closed. Everything that can go wrong after the request is queued
    /// surfaces through the future instead.
    pub fn call<Req, Res>(&self, method: &str, request: Req) -> Result<CallFuture<Res>, StubError>
    where
        Req: Into<P>,
        Res: TryFrom<P, Error = P> + 'static,
    {
        let spec = self
            .descriptor
            .get(method)
            .ok_or_else(|| StubError::MethodNotFound {
                method: method.to_string(),
            })?;

        let payload: P = request.into();
        let actual = payload.schema_name();
        if actual != spec.request {
            return Err(StubError::PayloadMismatch {
                method: method.to_string(),
                expected: spec.request.clone(),
                actual: actual.to_string(),
            });
        }

        if self.connection.is_closed() {
            return Err(StubError::ConnectionClosed);
        }

        let key = self.draw_key();
        let envelope = Envelope::request(key, method, payload);
        let frame = self
            .connection
            .codec()
            .encode(&envelope)
            .map_err(|error| StubError::Encode(error.to_string()))?;

        let (slot, future) = call_slot::<Res>();
        let declared_response = spec.response.clone();
        let continuation = Box::new(move |outcome: Result<P, CallError>| {
            slot.fill(match outcome {
                Err(error) => Err(error),
                Ok(reply) => {
                    let actual = reply.schema_name();
                    if actual != declared_response {
                        Err(CallError::UnexpectedPayload {
                            expected: declared_response,
                            actual: actual.to_string(),
                        })
                    } else {
                        match Res::try_from(reply) {
                            Ok(converted) => Ok(converted),
                            Err(rejected) => Err(CallError::UnexpectedPayload {
                                expected: declared_response,
                                actual: rejected.schema_name().to_string(),
                            }),
                        }
                    }
                }
            });
        });

        if self.connection.register_pending(key, continuation).is_err() {
            return Err(StubError::ConnectionClosed);
        }
        if self.connection.enqueue_frame(frame).is_err() {
            // Unwind the registration so the slot is not stranded.
            self.connection.take_pending(&key);
            return Err(StubError::ConnectionClosed);
        }
        self.connection.update_metrics(|m| m.record_call_issued());

        tracing::debug!(
            connection = self.connection.id(),
            key = %key,
            method = %method,
            "call issued"
        );

        let timeout = self.connection.config().call_timeout;
        if !timeout.is_zero() {
            self.arm_timeout(key, timeout);
        }

        Ok(future)
    }

    /// Draw a correlation key that is valid and unused on this connection.
    ///
    /// With 128 random bits a retry is essentially theoretical, but the loop
    /// keeps the guarantee unconditional.
    fn draw_key(&self) -> CallId {
        loop {
            let key = CallId::random(self.providers.random());
            if key.is_valid() && !self.connection.has_pending(&key) {
                return key;
            }
        }
    }

    fn arm_timeout(&self, key: CallId, timeout: Duration) {
        let connection = self.connection.clone();
        let time = self.providers.time().clone();
        self.providers.task().spawn_task("call_timeout", async move {
            if time.sleep(timeout).await.is_err() {
                return;
            }
            if let Some(continuation) = connection.take_pending(&key) {
                tracing::debug!(
                    connection = connection.id(),
                    key = %key,
                    "call timed out"
                );
                continuation(Err(CallError::Timeout));
            }
        });
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
    use crate::wire::{EnvelopeCodec, MessageKind};

    crate::rpc_schemas! {
        /// Payload union for stub tests.
        pub enum EchoPayload {
            /// A string to echo.
            pub struct EchoRequest {
                /// Text to send back.
                pub text: String,
            }

            /// The echoed string.
            pub struct EchoReply {
                /// Text sent back.
                pub text: String,
            }
        }
    }

    fn fixture(
        config: ConnectionConfig,
    ) -> (
        Stub<EchoPayload, JsonCodec, TokioProviders>,
        Rc<ConnectionShared<EchoPayload, JsonCodec>>,
    ) {
        let descriptor =
            Rc::new(ServiceDescriptor::new().method("echo", "EchoRequest", "EchoReply"));
        let schemas = SchemaSet::from_payload::<EchoPayload>();
        let layout = Rc::new(compose(&descriptor, &schemas).expect("compose"));
        let codec = EnvelopeCodec::new(layout, JsonCodec);

        let connection = ConnectionShared::new(1, None, Direction::Outgoing, codec, config);
        let stub = Stub::new(descriptor, connection.clone(), TokioProviders::new());
        (stub, connection)
    }

    fn queued_request(
        connection: &Rc<ConnectionShared<EchoPayload, JsonCodec>>,
    ) -> Envelope<EchoPayload> {
        let frame = connection.pop_outbound().expect("a frame should be queued");
        let (_, decoded) = connection
            .codec()
            .try_decode::<EchoPayload>(&frame)
            .expect("framing")
            .expect("complete frame");
        decoded.expect("request should decode")
    }

    #[tokio::test]
    async fn call_queues_request_and_resolves_on_reply() {
        let (stub, connection) = fixture(ConnectionConfig::default());

        let future = stub
            .call::<_, EchoReply>(
                "echo",
                EchoRequest {
                    text: "hi".to_string(),
                },
            )
            .expect("call should be accepted");

        let request = queued_request(&connection);
        assert_eq!(request.kind, MessageKind::Request);
        assert_eq!(request.method, "echo");
        assert!(request.key.is_valid());
        assert_eq!(connection.metrics_snapshot().calls_issued, 1);

        let continuation = connection
            .take_pending(&request.key)
            .expect("call should be pending");
        continuation(Ok(EchoPayload::EchoReply(EchoReply {
            text: "hi".to_string(),
        })));

        let reply = future.await.expect("reply should be ok");
        assert_eq!(reply.text, "hi");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected_locally() {
        let (stub, connection) = fixture(ConnectionConfig::default());

        let result = stub.call::<_, EchoReply>(
            "shout",
            EchoRequest {
                text: "hi".to_string(),
            },
        );

        assert!(matches!(
            result,
            Err(StubError::MethodNotFound { method }) if method == "shout"
        ));
        assert!(connection.pop_outbound().is_none());
        assert_eq!(connection.pending_len(), 0);
    }

    #[tokio::test]
    async fn wrong_request_payload_is_rejected_locally() {
        let (stub, connection) = fixture(ConnectionConfig::default());

        let result = stub.call::<_, EchoReply>(
            "echo",
            EchoReply {
                text: "backwards".to_string(),
            },
        );

        assert!(matches!(
            result,
            Err(StubError::PayloadMismatch { expected, actual, .. })
                if expected == "EchoRequest" && actual == "EchoReply"
        ));
        assert!(connection.pop_outbound().is_none());
    }

    #[tokio::test]
    async fn call_on_closed_connection_fails() {
        let (stub, connection) = fixture(ConnectionConfig::default());
        connection.teardown();

        let result = stub.call::<_, EchoReply>(
            "echo",
            EchoRequest {
                text: "hi".to_string(),
            },
        );

        assert!(matches!(result, Err(StubError::ConnectionClosed)));
        assert_eq!(connection.pending_len(), 0);
    }

    #[tokio::test]
    async fn reply_with_undeclared_schema_resolves_to_error() {
        let (stub, connection) = fixture(ConnectionConfig::default());

        let future = stub
            .call::<_, EchoReply>(
                "echo",
                EchoRequest {
                    text: "hi".to_string(),
                },
            )
            .expect("call should be accepted");

        let request = queued_request(&connection);
        let continuation = connection
            .take_pending(&request.key)
            .expect("call should be pending");
        // A request payload where the reply belongs.
        continuation(Ok(EchoPayload::EchoRequest(EchoRequest {
            text: "hi".to_string(),
        })));

        assert_eq!(
            future.await,
            Err(CallError::UnexpectedPayload {
                expected: "EchoReply".to_string(),
                actual: "EchoRequest".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn consecutive_calls_draw_distinct_keys() {
        let (stub, connection) = fixture(ConnectionConfig::default());

        stub.call::<_, EchoReply>(
            "echo",
            EchoRequest {
                text: "a".to_string(),
            },
        )
        .expect("first call");
        stub.call::<_, EchoReply>(
            "echo",
            EchoRequest {
                text: "b".to_string(),
            },
        )
        .expect("second call");

        let first = queued_request(&connection);
        let second = queued_request(&connection);
        assert_ne!(first.key, second.key);
        assert_eq!(connection.pending_len(), 2);
    }

    #[tokio::test]
    async fn timeout_resolves_unanswered_call() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let config =
                    ConnectionConfig::default().with_call_timeout(Duration::from_millis(10));
                let (stub, connection) = fixture(config);

                let future = stub
                    .call::<_, EchoReply>(
                        "echo",
                        EchoRequest {
                            text: "hi".to_string(),
                        },
                    )
                    .expect("call should be accepted");

                assert_eq!(future.await, Err(CallError::Timeout));
                assert_eq!(connection.pending_len(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn reply_before_timeout_wins() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let config =
                    ConnectionConfig::default().with_call_timeout(Duration::from_millis(50));
                let (stub, connection) = fixture(config);

                let future = stub
                    .call::<_, EchoReply>(
                        "echo",
                        EchoRequest {
                            text: "hi".to_string(),
                        },
                    )
                    .expect("call should be accepted");

                let request = queued_request(&connection);
                let continuation = connection
                    .take_pending(&request.key)
                    .expect("call should be pending");
                continuation(Ok(EchoPayload::EchoReply(EchoReply {
                    text: "hi".to_string(),
                })));

                let reply = future.await.expect("reply should win the race");
                assert_eq!(reply.text, "hi");

                // Let the timer fire against the now-empty table.
                tokio::time::sleep(Duration::from_millis(60)).await;
                assert_eq!(connection.pending_len(), 0);
            })
            .await;
    }
}
