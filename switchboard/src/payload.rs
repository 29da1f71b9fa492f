//! The payload union contract.
//!
//! Every envelope carries exactly one payload drawn from a closed set of
//! message types declared by the service. That set is expressed as a single
//! enum implementing [`Payload`], usually generated by
//! [`rpc_schemas!`](crate::rpc_schemas): one variant per message schema, with
//! the declaration order preserved in [`Payload::SCHEMAS`] because wire tag
//! assignment depends on it.

use crate::codec::{CodecError, MessageCodec};

/// A closed union over the message schemas a service declares.
///
/// Implementations are generated by [`rpc_schemas!`](crate::rpc_schemas);
/// hand-written impls just need to keep `SCHEMAS`, [`schema_name`], and
/// [`decode_payload`] mutually consistent.
///
/// [`schema_name`]: Payload::schema_name
/// [`decode_payload`]: Payload::decode_payload
pub trait Payload: Sized + 'static {
    /// Schema names in declaration order.
    ///
    /// Two nodes composing an envelope layout from the same service must see
    /// the same order here, or their wire tags diverge.
    const SCHEMAS: &'static [&'static str];

    /// The schema name of this value's variant.
    fn schema_name(&self) -> &'static str;

    /// Encode the inner message with the given codec.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the codec rejects the message.
    fn encode_payload<C: MessageCodec>(&self, codec: &C) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into the variant named by `schema`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if `schema` is not one of
    /// [`SCHEMAS`](Payload::SCHEMAS) or the bytes do not parse as that
    /// message.
    fn decode_payload<C: MessageCodec>(
        codec: &C,
        schema: &str,
        bytes: &[u8],
    ) -> Result<Self, CodecError>;
}
