//! Service descriptions.

/// One method entry: name plus request and response schema names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    /// The method name callers and handlers use.
    pub name: String,
    /// Schema name of the request payload.
    pub request: String,
    /// Schema name of the response payload.
    pub response: String,
}

/// Mapping from method name to request/response schema names.
///
/// Immutable once loaded. Declaration order is significant: the composer
/// discovers payload schemas by walking methods in this order, so two nodes
/// must build their descriptors identically to interoperate.
///
/// # Examples
///
/// ```
/// use switchboard::ServiceDescriptor;
///
/// let descriptor = ServiceDescriptor::new()
///     .method("greet", "GreetRequest", "GreetReply");
/// assert_eq!(descriptor.get("greet").unwrap().response, "GreetReply");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    methods: Vec<MethodSpec>,
}

impl ServiceDescriptor {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a method. Duplicate names are rejected at composition time.
    pub fn method(
        mut self,
        name: impl Into<String>,
        request: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.methods.push(MethodSpec {
            name: name.into(),
            request: request.into(),
            response: response.into(),
        });
        self
    }

    /// Look up a method by name.
    pub fn get(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Iterate methods in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodSpec> {
        self.methods.iter()
    }

    /// Number of declared methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are declared.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
