//! Envelope encoding and decoding.
//!
//! An envelope body is a sequence of tag-length-value fields:
//!
//! ```text
//! [tag:varint][len:varint][value:len] ...
//! ```
//!
//! Tags 1-4 are fixed header fields (key, method, kind, payload type); tags 5
//! and up are payload slots assigned by [`compose`](crate::schema::compose).
//! Exactly one payload slot must be present and it must agree with the
//! declared payload type. Fields may arrive in any order; unknown tags are
//! rejected rather than skipped, because two nodes disagreeing on the layout
//! is a deployment bug better surfaced than papered over.
//!
//! Errors here are per-message: the enclosing frame is well delimited, so the
//! reader can drop the envelope and continue with the next frame.

use std::rc::Rc;

use crate::codec::{CodecError, MessageCodec};
use crate::error::CallError;
use crate::payload::Payload;
use crate::schema::{
    ERROR_SLOT, EnvelopeLayout, FIRST_PAYLOAD_TAG, TAG_KEY, TAG_KIND, TAG_METHOD, TAG_PAYLOAD_TYPE,
};
use crate::types::CallId;
use crate::wire::{WireError, decode_varint, encode_frame, encode_varint, try_decode_frame};

/// Whether an envelope carries a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Asks the remote node to run a handler.
    Request,
    /// Resolves a pending call on the remote node.
    Response,
}

impl MessageKind {
    /// Wire byte for this kind.
    pub const fn as_byte(self) -> u8 {
        match self {
            MessageKind::Request => 0,
            MessageKind::Response => 1,
        }
    }

    /// Parse a wire byte. Returns `None` for anything but 0 or 1.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessageKind::Request),
            1 => Some(MessageKind::Response),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => f.write_str("request"),
            MessageKind::Response => f.write_str("response"),
        }
    }
}

/// One correlated message.
///
/// `body` is `Ok` for an application payload and `Err` for a response whose
/// payload slot is the reserved error slot. Requests normally carry `Ok`; a
/// request carrying `Err` is malformed and the dispatcher drops it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<P> {
    /// Correlation key linking this message to its counterpart.
    pub key: CallId,
    /// The method being invoked or replied to.
    pub method: String,
    /// Request or response.
    pub kind: MessageKind,
    /// The single payload, or the error that stands in for one.
    pub body: Result<P, CallError>,
}

impl<P: Payload> Envelope<P> {
    /// Build a request envelope.
    pub fn request(key: CallId, method: impl Into<String>, payload: P) -> Self {
        Self {
            key,
            method: method.into(),
            kind: MessageKind::Request,
            body: Ok(payload),
        }
    }

    /// Build a response envelope, successful or not.
    pub fn response(key: CallId, method: impl Into<String>, body: Result<P, CallError>) -> Self {
        Self {
            key,
            method: method.into(),
            kind: MessageKind::Response,
            body,
        }
    }

    /// The payload type name that goes in the header: the payload's schema
    /// name, or [`ERROR_SLOT`] when the body is an error.
    pub fn payload_type(&self) -> &'static str {
        match &self.body {
            Ok(payload) => payload.schema_name(),
            Err(_) => ERROR_SLOT,
        }
    }

    /// True if this envelope asks for a handler to run.
    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }
}

/// Envelope encoding failures.
///
/// Only possible for locally built envelopes, so each one is a caller bug or
/// a codec rejection rather than peer behavior.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The payload's schema has no slot in the composed layout.
    #[error("payload type '{name}' has no slot in the envelope layout")]
    UnknownSlot {
        /// The schema name without a slot.
        name: String,
    },

    /// The payload codec rejected the message.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The encoded envelope does not fit in a frame.
    #[error(transparent)]
    Frame(#[from] WireError),
}

/// Envelope decoding failures. All are per-message: log, drop, read on.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A field ran past the end of the envelope body.
    #[error("envelope body truncated")]
    Truncated,

    /// A tag or length varint inside the body is malformed.
    #[error("malformed varint in envelope body")]
    BadVarint,

    /// A required header field is absent.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },

    /// A header field appeared twice.
    #[error("duplicate field with tag {tag}")]
    DuplicateField {
        /// The repeated tag.
        tag: u64,
    },

    /// The tag is neither a header field nor a composed payload slot.
    #[error("unknown field tag {tag}")]
    UnknownTag {
        /// The unrecognized tag.
        tag: u64,
    },

    /// A fixed-size field has the wrong length.
    #[error("field with tag {tag} has invalid length {len}")]
    BadFieldLength {
        /// The field's tag.
        tag: u64,
        /// The length carried on the wire.
        len: usize,
    },

    /// The kind byte is neither request nor response.
    #[error("invalid message kind {value}")]
    InvalidKind {
        /// The byte received.
        value: u8,
    },

    /// A string field is not valid UTF-8.
    #[error("field '{field}' is not valid UTF-8")]
    InvalidUtf8 {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The declared payload type has no slot in the composed layout.
    #[error("payload type '{name}' has no slot in the envelope layout")]
    UnknownPayloadType {
        /// The declared payload type name.
        name: String,
    },

    /// The payload arrived in a different slot than its declared type owns.
    #[error("payload type declares slot {expected} but payload arrived in slot {actual}")]
    SlotMismatch {
        /// The slot the declared type owns.
        expected: u32,
        /// The slot the payload arrived in.
        actual: u32,
    },

    /// More than one payload slot is present.
    #[error("envelope carries more than one payload slot")]
    MultiplePayloads,

    /// The payload slot bytes do not parse as the declared type.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Encodes and decodes envelopes against one composed layout.
///
/// Cheap to clone: the layout is shared behind an `Rc` and codecs are small.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec<C: MessageCodec> {
    layout: Rc<EnvelopeLayout>,
    codec: C,
}

impl<C: MessageCodec> EnvelopeCodec<C> {
    /// Bind a payload codec to a composed layout.
    pub fn new(layout: Rc<EnvelopeLayout>, codec: C) -> Self {
        Self { layout, codec }
    }

    /// The layout this codec encodes against.
    pub fn layout(&self) -> &EnvelopeLayout {
        &self.layout
    }

    /// Encode an envelope into a complete frame, length prefix included.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownSlot`] if the payload's schema is not in
    /// the layout, or the codec/frame errors from the inner encoders.
    pub fn encode<P: Payload>(&self, envelope: &Envelope<P>) -> Result<Vec<u8>, EncodeError> {
        let name = envelope.payload_type();
        let tag = self
            .layout
            .tag_for(name)
            .ok_or_else(|| EncodeError::UnknownSlot {
                name: name.to_string(),
            })?;

        let payload_bytes = match &envelope.body {
            Ok(payload) => payload.encode_payload(&self.codec)?,
            Err(error) => self.codec.encode(error)?,
        };

        let mut body = Vec::with_capacity(
            CallId::WIRE_LEN + envelope.method.len() + name.len() + payload_bytes.len() + 24,
        );
        put_field(&mut body, TAG_KEY, &envelope.key.to_wire_bytes());
        put_field(&mut body, TAG_METHOD, envelope.method.as_bytes());
        put_field(&mut body, TAG_KIND, &[envelope.kind.as_byte()]);
        put_field(&mut body, TAG_PAYLOAD_TYPE, name.as_bytes());
        put_field(&mut body, tag, &payload_bytes);

        Ok(encode_frame(&body)?)
    }

    /// Try to decode one envelope from the front of `buf`.
    ///
    /// Three-way outcome, matching how the connection driver reacts:
    ///
    /// - `Ok(None)`: no complete frame yet, read more
    /// - `Ok(Some((consumed, result)))`: a frame was consumed; `result` is the
    ///   envelope or the per-message error to log and drop
    /// - `Err(_)`: frame boundaries are lost, tear the connection down
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] only for framing-level corruption.
    pub fn try_decode<P: Payload>(
        &self,
        buf: &[u8],
    ) -> Result<Option<(usize, Result<Envelope<P>, DecodeError>)>, WireError> {
        match try_decode_frame(buf)? {
            None => Ok(None),
            Some((body, consumed)) => Ok(Some((consumed, self.decode_body(body)))),
        }
    }

    /// Decode an envelope from a complete, already unframed body.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing the first violation found; the
    /// caller drops the message.
    pub fn decode_body<P: Payload>(&self, body: &[u8]) -> Result<Envelope<P>, DecodeError> {
        let mut key: Option<CallId> = None;
        let mut method: Option<String> = None;
        let mut kind: Option<MessageKind> = None;
        let mut payload_type: Option<String> = None;
        let mut payload: Option<(u32, &[u8])> = None;

        let mut pos = 0;
        while pos < body.len() {
            let tag = read_varint(body, &mut pos)?;
            let len = read_varint(body, &mut pos)? as usize;
            let end = pos.checked_add(len).ok_or(DecodeError::Truncated)?;
            if end > body.len() {
                return Err(DecodeError::Truncated);
            }
            let value = &body[pos..end];
            pos = end;

            match tag {
                t if t == u64::from(TAG_KEY) => {
                    if key.is_some() {
                        return Err(DecodeError::DuplicateField { tag });
                    }
                    let bytes: &[u8; CallId::WIRE_LEN] = value
                        .try_into()
                        .map_err(|_| DecodeError::BadFieldLength { tag, len })?;
                    key = Some(CallId::from_wire_bytes(bytes));
                }
                t if t == u64::from(TAG_METHOD) => {
                    if method.is_some() {
                        return Err(DecodeError::DuplicateField { tag });
                    }
                    method = Some(decode_utf8(value, "method")?);
                }
                t if t == u64::from(TAG_KIND) => {
                    if kind.is_some() {
                        return Err(DecodeError::DuplicateField { tag });
                    }
                    if value.len() != 1 {
                        return Err(DecodeError::BadFieldLength { tag, len });
                    }
                    kind = Some(
                        MessageKind::from_byte(value[0])
                            .ok_or(DecodeError::InvalidKind { value: value[0] })?,
                    );
                }
                t if t == u64::from(TAG_PAYLOAD_TYPE) => {
                    if payload_type.is_some() {
                        return Err(DecodeError::DuplicateField { tag });
                    }
                    payload_type = Some(decode_utf8(value, "payload_type")?);
                }
                t => {
                    let slot = u32::try_from(t)
                        .ok()
                        .filter(|&s| s >= FIRST_PAYLOAD_TAG && self.layout.name_for(s).is_some())
                        .ok_or(DecodeError::UnknownTag { tag })?;
                    if payload.is_some() {
                        return Err(DecodeError::MultiplePayloads);
                    }
                    payload = Some((slot, value));
                }
            }
        }

        let key = key.ok_or(DecodeError::MissingField { field: "key" })?;
        let method = method.ok_or(DecodeError::MissingField { field: "method" })?;
        let kind = kind.ok_or(DecodeError::MissingField { field: "kind" })?;
        let payload_type = payload_type.ok_or(DecodeError::MissingField {
            field: "payload_type",
        })?;
        let (slot, payload_bytes) = payload.ok_or(DecodeError::MissingField { field: "payload" })?;

        let expected =
            self.layout
                .tag_for(&payload_type)
                .ok_or_else(|| DecodeError::UnknownPayloadType {
                    name: payload_type.clone(),
                })?;
        if expected != slot {
            return Err(DecodeError::SlotMismatch {
                expected,
                actual: slot,
            });
        }

        let envelope_body = if slot == self.layout.error_tag() {
            Err(self.codec.decode::<CallError>(payload_bytes)?)
        } else {
            Ok(P::decode_payload(&self.codec, &payload_type, payload_bytes)?)
        };

        Ok(Envelope {
            key,
            method,
            kind,
            body: envelope_body,
        })
    }
}

fn put_field(out: &mut Vec<u8>, tag: u32, value: &[u8]) {
    encode_varint(u64::from(tag), out);
    encode_varint(value.len() as u64, out);
    out.extend_from_slice(value);
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, DecodeError> {
    match decode_varint(&buf[*pos..]) {
        Ok(Some((value, len))) => {
            *pos += len;
            Ok(value)
        }
        Ok(None) => Err(DecodeError::Truncated),
        Err(_) => Err(DecodeError::BadVarint),
    }
}

fn decode_utf8(value: &[u8], field: &'static str) -> Result<String, DecodeError> {
    String::from_utf8(value.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { field })
}
