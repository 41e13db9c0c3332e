//! Real-time reverse-search (percolation) engine
//!
//! Instead of running one query against many stored documents, the engine
//! holds a live, mutable set of named stored queries and, for each transient
//! incoming document, determines which stored queries match it. This powers
//! alerting/filtering pipelines where documents are evaluated against
//! subscriber-defined criteria before or instead of being indexed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           PercolatorService                      │
//! ├─────────────────────────────────────────────────┤
//! │  - add_query()      - remove_query()            │
//! │  - clear_queries()  - percolate()               │
//! │  - apply_settings() - subscribe_settings()      │
//! └─────────────────────────────────────────────────┘
//!         │               │                │
//!         ▼               ▼                ▼
//! ┌──────────────┐ ┌───────────────┐ ┌──────────────┐
//! │ QueryRegistry│ │ Document      │ │ Evaluation   │
//! │ (copy-on-    │ │ Materializer  │ │ Pool         │
//! │  write map)  │ │ (RAM index)   │ │ (workers +   │
//! └──────────────┘ └───────────────┘ │  memory +    │
//!         │               │          │  timeout)    │
//!         └───────┬───────┘          └──────────────┘
//!                 ▼
//!         ┌──────────────┐
//!         │ MatchEngine  │
//!         └──────────────┘
//! ```
//!
//! Queries arrive already compiled (tantivy [`Query`](tantivy::query::Query)
//! objects built against a [`mapping::MappingContext`] schema); the engine
//! materializes each incoming document through the same context, so stored
//! search and percolation agree on analysis. The evaluation pool's size,
//! memory ceiling, and per-call timeout are hot-reloadable while calls are in
//! flight.
//!
//! # Example
//!
//! ```no_run
//! use percolator::config::Config;
//! use percolator::mapping::{MappingContext, MappingRegistry};
//! use percolator::service::{PercolateRequest, PercolatorService};
//! use std::sync::Arc;
//! use tantivy::query::TermQuery;
//! use tantivy::schema::IndexRecordOption;
//! use tantivy::Term;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = MappingContext::builder()
//!         .add_text_field("message")
//!         .build();
//!     let field = context.field("message").unwrap();
//!
//!     let mut mappings = MappingRegistry::new();
//!     mappings.register("event", context);
//!
//!     let service = PercolatorService::new(Config::default(), mappings)?;
//!     service.add_query(
//!         "errors",
//!         Arc::new(TermQuery::new(
//!             Term::from_field_text(field, "error"),
//!             IndexRecordOption::Basic,
//!         )),
//!     );
//!
//!     let response = service
//!         .percolate(PercolateRequest::new(
//!             "event",
//!             r#"{"message": "disk error on node-3"}"#,
//!         ))
//!         .await?;
//!     println!("matched: {:?}", response.matches);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod service;

pub use config::{Config, ResourceConfig};
pub use document::{DocumentMaterializer, MaterializedDocument};
pub use engine::MatchEngine;
pub use error::{PercolateError, Result};
pub use mapping::{FieldKind, MappingContext, MappingContextBuilder, MappingRegistry};
pub use pool::{EvaluationPool, MemoryAccountant, MemoryReservation};
pub use registry::{Predicate, QueryEntry, QueryRegistry, RegistrySnapshot};
pub use service::{
    CallState, PercolateRequest, PercolateResponse, PercolatorService, ServiceStats,
};
