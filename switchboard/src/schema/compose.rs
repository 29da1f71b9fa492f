//! Envelope layout composition.
//!
//! Turns a [`ServiceDescriptor`] and a [`SchemaSet`] into the tag assignment
//! both sides of a connection use on the wire. Tags 1-4 are fixed by the
//! envelope contract; payload slots are assigned from 5 upward in discovery
//! order (descriptor declaration order, request before response, first
//! reference wins); the reserved error slot always comes last. Renumbering
//! breaks interoperability, which is why every input is walked in declaration
//! order and any ambiguity is a fatal error.

use std::collections::{HashMap, HashSet};

use super::descriptor::ServiceDescriptor;
use super::message::SchemaSet;

/// Wire tag of the correlation key field.
pub const TAG_KEY: u32 = 1;
/// Wire tag of the method name field.
pub const TAG_METHOD: u32 = 2;
/// Wire tag of the request/response discriminator field.
pub const TAG_KIND: u32 = 3;
/// Wire tag of the payload type name field.
pub const TAG_PAYLOAD_TYPE: u32 = 4;
/// First tag available for payload slots.
pub const FIRST_PAYLOAD_TAG: u32 = 5;

/// Name of the reserved error payload slot.
///
/// The dot keeps it out of the namespace of user schemas, which are Rust
/// type names.
pub const ERROR_SLOT: &str = "rpc.error";

/// Composition failures. All are fatal at startup: no node is built on a
/// layout that failed to compose.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    /// The descriptor references a schema name that is not declared.
    #[error("method '{method}' references undeclared schema '{schema}'")]
    UnknownSchema {
        /// The referencing method.
        method: String,
        /// The missing schema name.
        schema: String,
    },

    /// Two schemas share a name.
    #[error("duplicate schema name '{name}'")]
    DuplicateSchema {
        /// The duplicated name.
        name: String,
    },

    /// Two descriptor methods share a name.
    #[error("duplicate method name '{name}'")]
    DuplicateMethod {
        /// The duplicated name.
        name: String,
    },

    /// A schema uses the reserved error slot name.
    #[error("schema name '{name}' is reserved")]
    ReservedName {
        /// The offending name.
        name: String,
    },

    /// A schema declares the same field twice.
    #[error("schema '{schema}' declares field '{field}' twice")]
    DuplicateField {
        /// The schema with the duplicate.
        schema: String,
        /// The duplicated field name.
        field: String,
    },
}

/// Deterministic assignment of payload slot names to wire tags.
///
/// Produced by [`compose`]; identical inputs yield identical layouts in every
/// process, which is what lets two nodes decode each other's envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeLayout {
    /// Slot names in tag order, error slot last.
    slots: Vec<String>,
    by_name: HashMap<String, u32>,
    error_tag: u32,
}

impl EnvelopeLayout {
    /// The wire tag for a payload slot name, if declared.
    pub fn tag_for(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// The payload slot name for a wire tag, if assigned.
    pub fn name_for(&self, tag: u32) -> Option<&str> {
        if tag < FIRST_PAYLOAD_TAG {
            return None;
        }
        self.slots
            .get((tag - FIRST_PAYLOAD_TAG) as usize)
            .map(String::as_str)
    }

    /// The tag of the reserved error slot (always the highest).
    pub fn error_tag(&self) -> u32 {
        self.error_tag
    }

    /// Slot names with their tags, in tag order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, u32)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), FIRST_PAYLOAD_TAG + i as u32))
    }

    /// Number of payload slots, the reserved error slot included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Build the envelope layout for a service.
///
/// Walks the descriptor in declaration order and assigns one slot per
/// distinct referenced schema, then appends the reserved error slot.
///
/// # Errors
///
/// Returns a [`CompositionError`] if the inputs are inconsistent; see the
/// variant docs. Callers must treat any error as fatal.
pub fn compose(
    descriptor: &ServiceDescriptor,
    schemas: &SchemaSet,
) -> Result<EnvelopeLayout, CompositionError> {
    // Validate the schema set first: names unique, not reserved, fields unique.
    let mut seen_schemas: HashSet<&str> = HashSet::new();
    for schema in schemas.iter() {
        if schema.name() == ERROR_SLOT {
            return Err(CompositionError::ReservedName {
                name: schema.name().to_string(),
            });
        }
        if !seen_schemas.insert(schema.name()) {
            return Err(CompositionError::DuplicateSchema {
                name: schema.name().to_string(),
            });
        }
        let mut seen_fields: HashSet<&str> = HashSet::new();
        for (field, _) in schema.fields() {
            if !seen_fields.insert(field) {
                return Err(CompositionError::DuplicateField {
                    schema: schema.name().to_string(),
                    field: field.to_string(),
                });
            }
        }
    }

    let mut slots: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, u32> = HashMap::new();
    let mut seen_methods: HashSet<&str> = HashSet::new();

    for method in descriptor.iter() {
        if !seen_methods.insert(&method.name) {
            return Err(CompositionError::DuplicateMethod {
                name: method.name.clone(),
            });
        }
        for schema in [&method.request, &method.response] {
            if !schemas.contains(schema) {
                return Err(CompositionError::UnknownSchema {
                    method: method.name.clone(),
                    schema: schema.clone(),
                });
            }
            if !by_name.contains_key(schema.as_str()) {
                let tag = FIRST_PAYLOAD_TAG + slots.len() as u32;
                by_name.insert(schema.clone(), tag);
                slots.push(schema.clone());
            }
        }
    }

    let error_tag = FIRST_PAYLOAD_TAG + slots.len() as u32;
    by_name.insert(ERROR_SLOT.to_string(), error_tag);
    slots.push(ERROR_SLOT.to_string());

    Ok(EnvelopeLayout {
        slots,
        by_name,
        error_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, MessageSchema};

    fn sample_schemas() -> SchemaSet {
        SchemaSet::new()
            .with(MessageSchema::new("GreetRequest").field("name", FieldKind::Str))
            .with(MessageSchema::new("GreetReply").field("message", FieldKind::Str))
            .with(MessageSchema::new("Ack"))
    }

    #[test]
    fn assigns_tags_in_discovery_order() {
        let descriptor = ServiceDescriptor::new()
            .method("greet", "GreetRequest", "GreetReply")
            .method("nudge", "Ack", "Ack");

        let layout = compose(&descriptor, &sample_schemas()).expect("compose");

        assert_eq!(layout.tag_for("GreetRequest"), Some(5));
        assert_eq!(layout.tag_for("GreetReply"), Some(6));
        assert_eq!(layout.tag_for("Ack"), Some(7));
        assert_eq!(layout.tag_for(ERROR_SLOT), Some(8));
        assert_eq!(layout.error_tag(), 8);
        assert_eq!(layout.slot_count(), 4);
    }

    #[test]
    fn shared_schema_gets_one_slot() {
        // Ack appears as request and response of two methods; first
        // reference wins and later ones reuse the tag.
        let descriptor = ServiceDescriptor::new()
            .method("ping", "Ack", "Ack")
            .method("greet", "GreetRequest", "GreetReply");

        let layout = compose(&descriptor, &sample_schemas()).expect("compose");

        assert_eq!(layout.tag_for("Ack"), Some(5));
        assert_eq!(layout.tag_for("GreetRequest"), Some(6));
        assert_eq!(layout.tag_for("GreetReply"), Some(7));
    }

    #[test]
    fn composition_is_deterministic() {
        let descriptor = ServiceDescriptor::new()
            .method("greet", "GreetRequest", "GreetReply")
            .method("nudge", "Ack", "Ack");

        let a = compose(&descriptor, &sample_schemas()).expect("compose");
        let b = compose(&descriptor, &sample_schemas()).expect("compose");
        assert_eq!(a, b);
    }

    #[test]
    fn name_for_inverts_tag_for() {
        let descriptor = ServiceDescriptor::new().method("greet", "GreetRequest", "GreetReply");
        let layout = compose(&descriptor, &sample_schemas()).expect("compose");

        for (name, tag) in layout.slots() {
            assert_eq!(layout.name_for(tag), Some(name));
        }
        assert_eq!(layout.name_for(TAG_KEY), None);
        assert_eq!(layout.name_for(999), None);
    }

    #[test]
    fn undeclared_schema_is_fatal() {
        let descriptor = ServiceDescriptor::new().method("greet", "GreetRequest", "Missing");
        let err = compose(&descriptor, &sample_schemas()).expect_err("must fail");
        assert_eq!(
            err,
            CompositionError::UnknownSchema {
                method: "greet".to_string(),
                schema: "Missing".to_string()
            }
        );
    }

    #[test]
    fn duplicate_schema_is_fatal() {
        let schemas = sample_schemas().with(MessageSchema::new("Ack"));
        let descriptor = ServiceDescriptor::new().method("ping", "Ack", "Ack");
        let err = compose(&descriptor, &schemas).expect_err("must fail");
        assert!(matches!(err, CompositionError::DuplicateSchema { name } if name == "Ack"));
    }

    #[test]
    fn duplicate_method_is_fatal() {
        let descriptor = ServiceDescriptor::new()
            .method("ping", "Ack", "Ack")
            .method("ping", "Ack", "Ack");
        let err = compose(&descriptor, &sample_schemas()).expect_err("must fail");
        assert!(matches!(err, CompositionError::DuplicateMethod { name } if name == "ping"));
    }

    #[test]
    fn reserved_name_is_fatal() {
        let schemas = sample_schemas().with(MessageSchema::new(ERROR_SLOT));
        let descriptor = ServiceDescriptor::new();
        let err = compose(&descriptor, &schemas).expect_err("must fail");
        assert!(matches!(err, CompositionError::ReservedName { .. }));
    }

    #[test]
    fn duplicate_field_is_fatal() {
        let schemas = SchemaSet::new().with(
            MessageSchema::new("Odd")
                .field("x", FieldKind::U64)
                .field("x", FieldKind::Str),
        );
        let descriptor = ServiceDescriptor::new();
        let err = compose(&descriptor, &schemas).expect_err("must fail");
        match err {
            CompositionError::DuplicateField { schema, field } => {
                assert_eq!(schema, "Odd");
                assert_eq!(field, "x");
            }
            other => panic!("expected duplicate field error, got {other:?}"),
        }
    }

    #[test]
    fn empty_descriptor_still_gets_error_slot() {
        let layout = compose(&ServiceDescriptor::new(), &SchemaSet::new()).expect("compose");
        assert_eq!(layout.error_tag(), FIRST_PAYLOAD_TAG);
        assert_eq!(layout.slot_count(), 1);
    }
}
