//! Transient document materialization
//!
//! Each percolation call turns its raw payload into a single-document
//! in-RAM tantivy index, equivalent to what indexing the document would have
//! produced but never persisted and never visible outside the call. The
//! document carries its memory reservation, so the accounting is released
//! exactly when the evaluation that owns it finishes.

use crate::error::{PercolateError, Result};
use crate::mapping::MappingRegistry;
use crate::pool::MemoryReservation;
use serde_json::Value;
use std::sync::Arc;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher};

/// Writer heap for the one-document index; tantivy's floor, nothing more is
/// ever buffered
const SINGLE_DOC_WRITER_HEAP: usize = 15_000_000;

/// Builds transient searchable documents from raw payloads
pub struct DocumentMaterializer {
    mappings: Arc<MappingRegistry>,
}

impl DocumentMaterializer {
    pub fn new(mappings: MappingRegistry) -> Self {
        Self {
            mappings: Arc::new(mappings),
        }
    }

    /// The mapping registry this materializer resolves types against
    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    /// Materialize `source` under `doc_type`'s mapping context
    ///
    /// Payload rules: an optional `"doc"` envelope is unwrapped first; then a
    /// single-key object whose key equals the requested type is unwrapped. A
    /// wrapper key that does not match the requested type is not an error:
    /// the explicit type parameter wins and the object is indexed as plain
    /// fields.
    pub fn materialize(
        &self,
        doc_type: &str,
        source: &[u8],
        reservation: MemoryReservation,
    ) -> Result<MaterializedDocument> {
        let value: Value = serde_json::from_slice(source)?;
        let Value::Object(mut root) = value else {
            return Err(PercolateError::Parse(
                "document payload must be a JSON object".to_string(),
            ));
        };

        if let Some(envelope) = root.remove("doc") {
            let Value::Object(inner) = envelope else {
                return Err(PercolateError::Parse(
                    "'doc' envelope must contain an object".to_string(),
                ));
            };
            root = inner;
        }

        if root.len() == 1 {
            let wrapped_type = root.keys().next().cloned();
            if let Some(wrapped_type) = wrapped_type {
                if wrapped_type == doc_type {
                    if let Some(Value::Object(inner)) = root.remove(&wrapped_type) {
                        root = inner;
                    } else {
                        return Err(PercolateError::Parse(format!(
                            "type wrapper '{}' must contain an object",
                            wrapped_type
                        )));
                    }
                }
            }
        }

        let context = self.mappings.context_for(doc_type)?;
        let doc = context.build_document(&root)?;

        let index = Index::create_in_ram(context.schema().clone());
        let mut writer: IndexWriter = index.writer_with_num_threads(1, SINGLE_DOC_WRITER_HEAP)?;
        writer.add_document(doc)?;
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        tracing::debug!(
            doc_type = doc_type,
            source_bytes = source.len(),
            reserved_bytes = reservation.bytes(),
            "Materialized transient document"
        );

        Ok(MaterializedDocument {
            reader,
            doc_type: doc_type.to_string(),
            _reservation: reservation,
        })
    }
}

/// A transient, queryable single-document representation
///
/// Dropping the handle releases the in-RAM index and the memory reservation,
/// regardless of whether evaluation succeeded, failed, or was abandoned.
pub struct MaterializedDocument {
    reader: IndexReader,
    doc_type: String,
    _reservation: MemoryReservation,
}

impl std::fmt::Debug for MaterializedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterializedDocument")
            .field("doc_type", &self.doc_type)
            .field("_reservation", &self._reservation)
            .finish_non_exhaustive()
    }
}

impl MaterializedDocument {
    /// A searcher over the one-document index
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// The mapping context type this document was materialized under
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }
}
