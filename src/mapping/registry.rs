//! Type name to mapping context resolution

use crate::error::{PercolateError, Result};
use crate::mapping::MappingContext;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves the mapping context for a percolation request's document type
///
/// Configured once at wiring time; single-type deployments usually register a
/// default context and never name types explicitly.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    contexts: HashMap<String, Arc<MappingContext>>,
    default_context: Option<Arc<MappingContext>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose unregistered types fall back to `context`
    pub fn with_default(context: MappingContext) -> Self {
        Self {
            contexts: HashMap::new(),
            default_context: Some(Arc::new(context)),
        }
    }

    /// Register a context for a document type, replacing any prior one
    pub fn register(&mut self, doc_type: impl Into<String>, context: MappingContext) {
        let doc_type = doc_type.into();
        tracing::info!(doc_type = %doc_type, "Registered mapping context");
        self.contexts.insert(doc_type, Arc::new(context));
    }

    /// Set the fallback context for unregistered types
    pub fn set_default(&mut self, context: MappingContext) {
        self.default_context = Some(Arc::new(context));
    }

    /// Resolve the context for a document type
    ///
    /// Unknown types without a fallback are a parse error: the document
    /// cannot be materialized consistently with any stored query.
    pub fn context_for(&self, doc_type: &str) -> Result<Arc<MappingContext>> {
        self.contexts
            .get(doc_type)
            .or(self.default_context.as_ref())
            .cloned()
            .ok_or_else(|| {
                PercolateError::Parse(format!("no mapping context for type '{}'", doc_type))
            })
    }

    /// Number of explicitly registered types
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no types are registered and no default is set
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty() && self.default_context.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_context() -> MappingContext {
        MappingContext::builder().add_text_field("field2").build()
    }

    #[test]
    fn test_registered_type_resolves() {
        let mut registry = MappingRegistry::new();
        registry.register("type1", simple_context());

        assert!(registry.context_for("type1").is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let registry = MappingRegistry::new();
        let err = registry.context_for("nope").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_default_fallback() {
        let registry = MappingRegistry::with_default(simple_context());
        assert!(registry.context_for("anything").is_ok());
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_explicit_registration_beats_default() {
        let mut registry = MappingRegistry::with_default(simple_context());
        let specific = MappingContext::builder().add_i64_field("field1").build();
        registry.register("type1", specific);

        let resolved = registry.context_for("type1").unwrap();
        assert!(resolved.field("field1").is_some());
        assert!(resolved.field("field2").is_none());
    }
}
