use codegate_spectree::ExpectedSignature;

/// One piece of source text submitted for validation.
///
/// Immutable once built; the builder methods consume and return `self`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeUnit {
    source: String,
    signature: Option<ExpectedSignature>,
    node_id: Option<String>,
}

impl CodeUnit {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            signature: None,
            node_id: None,
        }
    }

    pub fn with_signature(mut self, signature: ExpectedSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Binds the unit to a spec-tree node, which enables the authorization gate.
    pub fn bound_to(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn signature(&self) -> Option<&ExpectedSignature> {
        self.signature.as_ref()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }
}
