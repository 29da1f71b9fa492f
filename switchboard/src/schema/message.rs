//! Message type definitions.

use crate::payload::Payload;

/// The type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// 64-bit float.
    F64,
    /// UTF-8 string.
    Str,
    /// Raw bytes.
    Bytes,
    /// Another named message schema.
    Nested(String),
    /// Zero or more values of an inner kind.
    Repeated(Box<FieldKind>),
}

/// A named, structured message type definition.
///
/// Immutable once loaded. The composer only consults schema *names* when
/// assigning wire tags; the field list documents the message shape and is
/// validated for duplicate field names at composition time.
///
/// # Examples
///
/// ```
/// use switchboard::{FieldKind, MessageSchema};
///
/// let schema = MessageSchema::new("GreetRequest")
///     .field("name", FieldKind::Str);
/// assert_eq!(schema.name(), "GreetRequest");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    name: String,
    fields: Vec<(String, FieldKind)>,
}

impl MessageSchema {
    /// Create a schema with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field. Declaration order is preserved.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push((name.into(), kind));
        self
    }

    /// The schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(n, k)| (n.as_str(), k))
    }
}

/// An ordered collection of message schemas.
///
/// Declaration order matters: it is the order the composer discovers schemas
/// in, which fixes wire tag assignment. Duplicate names are caught by
/// [`compose`](crate::schema::compose()), not on insertion.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: Vec<MessageSchema>,
}

impl SchemaSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a schema, preserving declaration order.
    pub fn with(mut self, schema: MessageSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Build a set of name-only schemas from a payload union's declared list.
    ///
    /// This is the usual path when messages are defined with
    /// [`rpc_schemas!`](crate::rpc_schemas): the enum already fixes the set
    /// and its order, so field-level metadata is redundant.
    pub fn from_payload<P: Payload>() -> Self {
        let mut set = Self::new();
        for name in P::SCHEMAS {
            set.schemas.push(MessageSchema::new(*name));
        }
        set
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Option<&MessageSchema> {
        self.schemas.iter().find(|s| s.name() == name)
    }

    /// Whether a schema with this name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate schemas in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageSchema> {
        self.schemas.iter()
    }

    /// Number of declared schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
