//! Common fixtures for percolator integration tests

use percolator::config::{Config, ResourceConfig};
use percolator::mapping::{MappingContext, MappingRegistry};
use percolator::registry::Predicate;
use percolator::service::PercolatorService;
use std::sync::Arc;
use tantivy::query::TermQuery;
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

/// The mapping context every integration test percolates under: one numeric
/// and one full-text field, registered as type `type1`
pub fn alert_context() -> MappingContext {
    MappingContext::builder()
        .add_i64_field("field1")
        .add_text_field("field2")
        .build()
}

/// Build a service over [`alert_context`] with test-sized resources
pub fn test_service(resources: ResourceConfig) -> PercolatorService {
    let mut mappings = MappingRegistry::new();
    mappings.register("type1", alert_context());

    let config = Config {
        resources,
        queue_capacity: 256,
        ..Default::default()
    };

    PercolatorService::new(config, mappings).unwrap()
}

/// Default test resources: small pool, generous ceiling and timeout
pub fn test_resources() -> ResourceConfig {
    ResourceConfig {
        pool_size: 4,
        max_memory_bytes: 16 * 1024 * 1024,
        timeout_ms: 5_000,
    }
}

/// Compile a term predicate over a text field of [`alert_context`]
pub fn term_text(field: &str, value: &str) -> Predicate {
    let context = alert_context();
    Arc::new(TermQuery::new(
        Term::from_field_text(context.field(field).unwrap(), value),
        IndexRecordOption::Basic,
    ))
}

/// Compile a term predicate over an i64 field of [`alert_context`]
pub fn term_i64(field: &str, value: i64) -> Predicate {
    let context = alert_context();
    Arc::new(TermQuery::new(
        Term::from_field_i64(context.field(field).unwrap(), value),
        IndexRecordOption::Basic,
    ))
}
