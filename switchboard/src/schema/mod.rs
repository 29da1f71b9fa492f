//! Message schemas, service descriptions, and envelope composition.
//!
//! At startup the host declares a set of named message schemas and a service
//! descriptor mapping method names to request/response schema names.
//! [`compose()`] turns the pair into an [`EnvelopeLayout`]: the deterministic
//! assignment of wire tags to payload slots that both sides of a connection
//! must agree on. Composition failures are fatal; a node is never built on
//! top of a bad layout.

mod compose;
mod descriptor;
mod message;

pub use compose::{
    CompositionError, ERROR_SLOT, EnvelopeLayout, FIRST_PAYLOAD_TAG, TAG_KEY, TAG_KIND, TAG_METHOD,
    TAG_PAYLOAD_TYPE, compose,
};
pub use descriptor::{MethodSpec, ServiceDescriptor};
pub use message::{FieldKind, MessageSchema, SchemaSet};
