//! Mapping and analysis context for percolated documents
//!
//! The engine never owns field mappings: stored queries are compiled by the
//! host against a [`MappingContext`]'s schema, and incoming documents are
//! materialized through the same context, so tokenization and numeric encoding
//! agree on both sides. A [`MappingRegistry`] resolves the per-type context
//! for each percolation request.

mod context;
mod registry;

pub use context::{FieldKind, MappingContext, MappingContextBuilder};
pub use registry::MappingRegistry;
