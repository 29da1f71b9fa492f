//! Macros for reducing service-definition boilerplate.
//!
//! - [`rpc_schemas!`]: declare message schemas and their payload union in one
//!   block, with required derives and [`Payload`](crate::Payload) wiring
//! - [`rpc_service!`]: declare a service's methods with auto-generated name
//!   constants and a [`ServiceDescriptor`](crate::ServiceDescriptor) builder
//!
//! # Example
//!
//! ```rust
//! use switchboard::{Payload, rpc_schemas, rpc_service};
//!
//! rpc_schemas! {
//!     /// Payload union for a tiny calculator service.
//!     pub enum CalculatorPayload {
//!         /// Request to add two numbers.
//!         pub struct AddRequest {
//!             /// Left operand.
//!             pub a: i64,
//!             /// Right operand.
//!             pub b: i64,
//!         }
//!
//!         /// Response carrying the sum.
//!         pub struct AddReply {
//!             /// The sum.
//!             pub sum: i64,
//!         }
//!     }
//! }
//!
//! rpc_service! {
//!     /// Calculator service definition.
//!     pub Calculator {
//!         /// Add two numbers.
//!         add: AddRequest => AddReply,
//!     }
//! }
//!
//! // Declaration order is the schema order tags are composed from.
//! assert_eq!(CalculatorPayload::SCHEMAS, &["AddRequest", "AddReply"]);
//! assert_eq!(Calculator::add, "add");
//! assert_eq!(Calculator::descriptor().len(), 1);
//! ```

/// Declare message schemas and the payload union that carries them.
///
/// Each `struct` block becomes a standalone message type with
/// `#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]`, and the
/// enclosing `enum` becomes the payload union with one variant per message.
/// The macro also generates:
///
/// - `impl Payload` for the union, with `SCHEMAS` in declaration order
/// - `From<Message> for Union` for every message
/// - `TryFrom<Union> for Message`, handing the union back on mismatch
///
/// Declaration order matters: it is the order schema names appear in
/// [`Payload::SCHEMAS`](crate::Payload::SCHEMAS), which feeds envelope
/// composition. Reordering message blocks changes wire tags.
///
/// # Example
///
/// ```rust
/// use switchboard::rpc_schemas;
///
/// rpc_schemas! {
///     /// Payloads for a greeter service.
///     pub enum GreeterPayload {
///         /// Ask for a greeting.
///         pub struct GreetRequest {
///             /// Who to greet.
///             pub name: String,
///         }
///
///         /// The greeting.
///         pub struct GreetReply {
///             /// Rendered greeting text.
///             pub text: String,
///         }
///     }
/// }
///
/// let payload = GreeterPayload::from(GreetRequest { name: "sam".into() });
/// let back = GreetRequest::try_from(payload).expect("payload carries a GreetRequest");
/// assert_eq!(back.name, "sam");
/// ```
#[macro_export]
macro_rules! rpc_schemas {
    (
        $(#[$enum_meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$msg_meta:meta])*
                $msg_vis:vis struct $msg:ident {
                    $(
                        $(#[$field_meta:meta])*
                        $field_vis:vis $field:ident : $ty:ty
                    ),* $(,)?
                }
            )+
        }
    ) => {
        $(
            $(#[$msg_meta])*
            #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
            $msg_vis struct $msg {
                $(
                    $(#[$field_meta])*
                    $field_vis $field : $ty,
                )*
            }
        )+

        $(#[$enum_meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                #[doc = concat!("Carries a [`", stringify!($msg), "`].")]
                $msg($msg),
            )+
        }

        impl $crate::Payload for $name {
            const SCHEMAS: &'static [&'static str] = &[$(stringify!($msg)),+];

            fn schema_name(&self) -> &'static str {
                match self {
                    $( $name::$msg(_) => stringify!($msg), )+
                }
            }

            fn encode_payload<C: $crate::MessageCodec>(
                &self,
                codec: &C,
            ) -> Result<Vec<u8>, $crate::CodecError> {
                match self {
                    $( $name::$msg(msg) => codec.encode(msg), )+
                }
            }

            fn decode_payload<C: $crate::MessageCodec>(
                codec: &C,
                schema: &str,
                bytes: &[u8],
            ) -> Result<Self, $crate::CodecError> {
                match schema {
                    $( stringify!($msg) => Ok($name::$msg(codec.decode(bytes)?)), )+
                    other => Err($crate::CodecError::Decode(
                        format!("unknown schema '{other}'").into(),
                    )),
                }
            }
        }

        $(
            impl From<$msg> for $name {
                fn from(msg: $msg) -> Self {
                    $name::$msg(msg)
                }
            }

            impl TryFrom<$name> for $msg {
                type Error = $name;

                fn try_from(payload: $name) -> Result<Self, Self::Error> {
                    #[allow(unreachable_patterns)]
                    match payload {
                        $name::$msg(msg) => Ok(msg),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

/// Declare a service's methods.
///
/// Generates a unit struct carrying one string constant per method (so call
/// sites say `Calculator::add` instead of a bare `"add"`) and a
/// `descriptor()` constructor producing the matching
/// [`ServiceDescriptor`](crate::ServiceDescriptor).
///
/// A trailing `stub` section also generates a typed client wrapper around
/// [`Stub`](crate::Stub) with one method per service entry, each taking the
/// declared request type and returning a future for the declared response
/// type. The wrapper's name is spelled out because `macro_rules!` cannot
/// concatenate identifiers:
///
/// ```ignore
/// let kv = KvStoreStub::new(node.stub(&connection));
/// let reply = kv.get(GetRequest { key: "color".into() })?.await?;
/// ```
///
/// # Example
///
/// ```rust
/// use switchboard::{rpc_schemas, rpc_service};
///
/// rpc_schemas! {
///     /// Key-value store payloads.
///     pub enum KvPayload {
///         /// Fetch a value.
///         pub struct GetRequest {
///             /// Key to look up.
///             pub key: String,
///         }
///
///         /// The fetched value, if present.
///         pub struct GetReply {
///             /// Value, or `None` when absent.
///             pub value: Option<String>,
///         }
///     }
/// }
///
/// rpc_service! {
///     /// Key-value store service.
///     pub KvStore {
///         /// Look up a key.
///         get: GetRequest => GetReply,
///     }
///
///     /// Typed client for [`KvStore`].
///     pub stub KvStoreStub;
/// }
///
/// let descriptor = KvStore::descriptor();
/// let spec = descriptor.get(KvStore::get).expect("method is declared");
/// assert_eq!(spec.request, "GetRequest");
/// assert_eq!(spec.response, "GetReply");
/// ```
#[macro_export]
macro_rules! rpc_service {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident {
            $(
                $(#[$method_meta:meta])*
                $method:ident : $req:ident => $res:ident
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name;

        impl $name {
            $(
                $(#[$method_meta])*
                #[allow(non_upper_case_globals)]
                pub const $method: &'static str = stringify!($method);
            )+

            /// Build the service descriptor declaring every method.
            pub fn descriptor() -> $crate::ServiceDescriptor {
                $crate::ServiceDescriptor::new()
                    $( .method(stringify!($method), stringify!($req), stringify!($res)) )+
            }
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis $name:ident {
            $(
                $(#[$method_meta:meta])*
                $method:ident : $req:ident => $res:ident
            ),+ $(,)?
        }

        $(#[$stub_meta:meta])*
        $stub_vis:vis stub $stub:ident;
    ) => {
        $crate::rpc_service! {
            $(#[$meta])*
            $vis $name {
                $(
                    $(#[$method_meta])*
                    $method : $req => $res
                ),+
            }
        }

        $(#[$stub_meta])*
        $stub_vis struct $stub<P, C, Pr>
        where
            C: $crate::MessageCodec,
            Pr: $crate::Providers,
        {
            inner: $crate::Stub<P, C, Pr>,
        }

        impl<P, C, Pr> Clone for $stub<P, C, Pr>
        where
            C: $crate::MessageCodec,
            Pr: $crate::Providers,
        {
            fn clone(&self) -> Self {
                Self {
                    inner: self.inner.clone(),
                }
            }
        }

        impl<P, C, Pr> $stub<P, C, Pr>
        where
            P: $crate::Payload,
            C: $crate::MessageCodec,
            Pr: $crate::Providers,
        {
            /// Wrap a connection's stub in the typed client surface.
            pub fn new(inner: $crate::Stub<P, C, Pr>) -> Self {
                Self { inner }
            }

            $(
                $(#[$method_meta])*
                pub fn $method(
                    &self,
                    request: $req,
                ) -> Result<$crate::CallFuture<$res>, $crate::StubError>
                where
                    $req: Into<P>,
                    $res: TryFrom<P, Error = P> + 'static,
                {
                    self.inner.call($name::$method, request)
                }
            )+
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::Payload;

    crate::rpc_schemas! {
        /// Test payload union.
        pub enum TestPayload {
            /// A probe request.
            pub struct ProbeRequest {
                /// Sequence number.
                pub seq: u32,
            }

            /// A probe response.
            pub struct ProbeReply {
                /// Echoed sequence number.
                pub seq: u32,
                /// Whether the probe was accepted.
                pub accepted: bool,
            }
        }
    }

    crate::rpc_service! {
        /// Test service.
        pub ProbeService {
            /// Send a probe.
            probe: ProbeRequest => ProbeReply,
            /// Send a probe nobody answers.
            probe_quiet: ProbeRequest => ProbeReply,
        }

        /// Typed client for [`ProbeService`].
        pub stub ProbeServiceStub;
    }

    #[test]
    fn schemas_follow_declaration_order() {
        assert_eq!(TestPayload::SCHEMAS, &["ProbeRequest", "ProbeReply"]);
    }

    #[test]
    fn schema_name_matches_variant() {
        let payload = TestPayload::ProbeRequest(ProbeRequest { seq: 1 });
        assert_eq!(payload.schema_name(), "ProbeRequest");
    }

    #[test]
    fn conversions_narrow_and_widen() {
        let request = ProbeRequest { seq: 5 };
        let payload: TestPayload = request.clone().into();
        assert_eq!(
            ProbeRequest::try_from(payload).expect("narrowing should succeed"),
            request
        );

        let wrong = TestPayload::ProbeReply(ProbeReply {
            seq: 5,
            accepted: true,
        });
        let rejected = ProbeRequest::try_from(wrong).expect_err("narrowing should fail");
        assert_eq!(rejected.schema_name(), "ProbeReply");
    }

    #[test]
    fn payload_codec_roundtrip() {
        use crate::{JsonCodec, MessageCodec};

        let codec = JsonCodec;
        let payload = TestPayload::ProbeReply(ProbeReply {
            seq: 9,
            accepted: false,
        });

        let bytes = payload.encode_payload(&codec).expect("encode");
        let decoded = TestPayload::decode_payload(&codec, "ProbeReply", &bytes).expect("decode");
        assert_eq!(decoded, payload);

        let err = TestPayload::decode_payload(&codec, "Mystery", &bytes)
            .expect_err("unknown schema should fail");
        assert!(err.to_string().contains("Mystery"));
    }

    #[test]
    fn service_constants_and_descriptor_agree() {
        assert_eq!(ProbeService::probe, "probe");
        assert_eq!(ProbeService::probe_quiet, "probe_quiet");

        let descriptor = ProbeService::descriptor();
        assert_eq!(descriptor.len(), 2);
        let spec = descriptor.get("probe").expect("declared");
        assert_eq!(spec.request, "ProbeRequest");
        assert_eq!(spec.response, "ProbeReply");
    }

    #[tokio::test]
    async fn typed_stub_delegates_to_generic_call() {
        use std::rc::Rc;

        use crate::codec::JsonCodec;
        use crate::connection::ConnectionConfig;
        use crate::connection::core::ConnectionShared;
        use crate::dispatch::Stub;
        use crate::providers::TokioProviders;
        use crate::schema::{SchemaSet, compose};
        use crate::types::Direction;
        use crate::wire::{EnvelopeCodec, MessageKind};

        let descriptor = Rc::new(ProbeService::descriptor());
        let schemas = SchemaSet::from_payload::<TestPayload>();
        let layout = Rc::new(compose(&descriptor, &schemas).expect("compose"));
        let codec = EnvelopeCodec::new(layout, JsonCodec);
        let connection = ConnectionShared::new(
            1,
            None,
            Direction::Outgoing,
            codec,
            ConnectionConfig::default(),
        );
        let probe = ProbeServiceStub::new(Stub::new(
            descriptor,
            connection.clone(),
            TokioProviders::new(),
        ));

        let future = probe
            .probe(ProbeRequest { seq: 3 })
            .expect("call should be accepted");

        let frame = connection.pop_outbound().expect("request should be queued");
        let (_, decoded) = connection
            .codec()
            .try_decode::<TestPayload>(&frame)
            .expect("framing")
            .expect("complete frame");
        let request = decoded.expect("request should decode");
        assert_eq!(request.kind, MessageKind::Request);
        assert_eq!(request.method, "probe");

        let continuation = connection
            .take_pending(&request.key)
            .expect("call should be pending");
        continuation(Ok(TestPayload::ProbeReply(ProbeReply {
            seq: 3,
            accepted: true,
        })));

        let reply = future.await.expect("reply should resolve");
        assert_eq!(reply.seq, 3);
        assert!(reply.accepted);

        // Each wrapper method routes to its own declared name.
        let _quiet = probe
            .probe_quiet(ProbeRequest { seq: 4 })
            .expect("call should be accepted");
        let frame = connection.pop_outbound().expect("request should be queued");
        let (_, decoded) = connection
            .codec()
            .try_decode::<TestPayload>(&frame)
            .expect("framing")
            .expect("complete frame");
        assert_eq!(decoded.expect("decode").method, "probe_quiet");
    }
}
