//! Per-type field mapping compiled into a tantivy schema

use crate::error::{PercolateError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tantivy::schema::{Field, Schema, INDEXED, STRING, TEXT};
use tantivy::TantivyDocument;

/// How a mapped field is typed and analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Full-text, tokenized and lowercased by the default analyzer
    Text,
    /// Untokenized exact string
    Keyword,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
    /// 64-bit float
    F64,
    /// Boolean
    Bool,
    /// RFC 3339 timestamp or epoch milliseconds
    Date,
}

#[derive(Debug, Clone, Copy)]
struct MappedField {
    field: Field,
    kind: FieldKind,
}

/// An immutable analysis context shared by stored queries and transient
/// documents
///
/// Hosts compile predicates against [`MappingContext::schema`]; the
/// materializer calls [`MappingContext::build_document`] with the same
/// context, which is what keeps stored-search and percolation semantics
/// aligned.
pub struct MappingContext {
    schema: Schema,
    fields: HashMap<String, MappedField>,
}

impl MappingContext {
    /// Start building a context
    pub fn builder() -> MappingContextBuilder {
        MappingContextBuilder::new()
    }

    /// The tantivy schema stored queries must be compiled against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Resolve a mapped field handle by name
    pub fn field(&self, name: &str) -> Option<Field> {
        self.fields.get(name).map(|entry| entry.field)
    }

    /// Resolve the declared kind of a mapped field
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).map(|entry| entry.kind)
    }

    /// Number of mapped fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are mapped
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert a parsed JSON object into an indexable tantivy document
    ///
    /// Nested objects are flattened into dot-joined paths and arrays become
    /// multi-valued fields. Leaves without a mapping are skipped; a mapped
    /// leaf whose value cannot be coerced to the declared kind is a parse
    /// error.
    pub fn build_document(&self, source: &Map<String, Value>) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::new();
        self.add_object(&mut doc, None, source)?;
        Ok(doc)
    }

    fn add_object(
        &self,
        doc: &mut TantivyDocument,
        prefix: Option<&str>,
        object: &Map<String, Value>,
    ) -> Result<()> {
        for (key, value) in object {
            let path = match prefix {
                Some(prefix) => format!("{}.{}", prefix, key),
                None => key.clone(),
            };
            self.add_value(doc, &path, value)?;
        }
        Ok(())
    }

    fn add_value(&self, doc: &mut TantivyDocument, path: &str, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Object(object) => self.add_object(doc, Some(path), object),
            Value::Array(values) => {
                for value in values {
                    self.add_value(doc, path, value)?;
                }
                Ok(())
            }
            scalar => {
                let Some(entry) = self.fields.get(path) else {
                    tracing::debug!(field = path, "Skipping unmapped document field");
                    return Ok(());
                };
                self.add_scalar(doc, path, *entry, scalar)
            }
        }
    }

    fn add_scalar(
        &self,
        doc: &mut TantivyDocument,
        path: &str,
        entry: MappedField,
        value: &Value,
    ) -> Result<()> {
        match entry.kind {
            FieldKind::Text | FieldKind::Keyword => match value {
                Value::String(text) => doc.add_text(entry.field, text),
                Value::Number(number) => doc.add_text(entry.field, &number.to_string()),
                Value::Bool(flag) => doc.add_text(entry.field, if *flag { "true" } else { "false" }),
                other => return Err(mismatch(path, "string", other)),
            },
            FieldKind::I64 => {
                let parsed = match value {
                    Value::Number(number) => number.as_i64(),
                    Value::String(text) => text.parse::<i64>().ok(),
                    _ => None,
                };
                match parsed {
                    Some(parsed) => doc.add_i64(entry.field, parsed),
                    None => return Err(mismatch(path, "i64", value)),
                }
            }
            FieldKind::U64 => {
                let parsed = match value {
                    Value::Number(number) => number.as_u64(),
                    Value::String(text) => text.parse::<u64>().ok(),
                    _ => None,
                };
                match parsed {
                    Some(parsed) => doc.add_u64(entry.field, parsed),
                    None => return Err(mismatch(path, "u64", value)),
                }
            }
            FieldKind::F64 => {
                let parsed = match value {
                    Value::Number(number) => number.as_f64(),
                    Value::String(text) => text.parse::<f64>().ok(),
                    _ => None,
                };
                match parsed {
                    Some(parsed) => doc.add_f64(entry.field, parsed),
                    None => return Err(mismatch(path, "f64", value)),
                }
            }
            FieldKind::Bool => {
                let parsed = match value {
                    Value::Bool(flag) => Some(*flag),
                    Value::String(text) => match text.as_str() {
                        "true" => Some(true),
                        "false" => Some(false),
                        _ => None,
                    },
                    _ => None,
                };
                match parsed {
                    Some(parsed) => doc.add_bool(entry.field, parsed),
                    None => return Err(mismatch(path, "bool", value)),
                }
            }
            FieldKind::Date => {
                let millis = match value {
                    Value::String(text) => chrono::DateTime::parse_from_rfc3339(text)
                        .ok()
                        .map(|timestamp| timestamp.timestamp_millis()),
                    Value::Number(number) => number.as_i64(),
                    _ => None,
                };
                match millis {
                    Some(millis) => {
                        doc.add_date(entry.field, tantivy::DateTime::from_timestamp_millis(millis))
                    }
                    None => return Err(mismatch(path, "date", value)),
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MappingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingContext")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn mismatch(path: &str, expected: &str, value: &Value) -> PercolateError {
    PercolateError::Parse(format!(
        "field '{}' expects {} but got {}",
        path,
        expected,
        value_type(value)
    ))
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builder for [`MappingContext`]
pub struct MappingContextBuilder {
    declarations: Vec<(String, FieldKind)>,
}

impl MappingContextBuilder {
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// Declare a tokenized full-text field
    pub fn add_text_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::Text));
        self
    }

    /// Declare an untokenized exact-match string field
    pub fn add_keyword_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::Keyword));
        self
    }

    /// Declare a signed integer field
    pub fn add_i64_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::I64));
        self
    }

    /// Declare an unsigned integer field
    pub fn add_u64_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::U64));
        self
    }

    /// Declare a float field
    pub fn add_f64_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::F64));
        self
    }

    /// Declare a boolean field
    pub fn add_bool_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::Bool));
        self
    }

    /// Declare a date field
    pub fn add_date_field(mut self, name: impl Into<String>) -> Self {
        self.declarations.push((name.into(), FieldKind::Date));
        self
    }

    /// Compile the declarations into an immutable context
    pub fn build(self) -> MappingContext {
        let mut schema_builder = Schema::builder();
        let mut fields = HashMap::with_capacity(self.declarations.len());

        for (name, kind) in self.declarations {
            let field = match kind {
                FieldKind::Text => schema_builder.add_text_field(&name, TEXT),
                FieldKind::Keyword => schema_builder.add_text_field(&name, STRING),
                FieldKind::I64 => schema_builder.add_i64_field(&name, INDEXED),
                FieldKind::U64 => schema_builder.add_u64_field(&name, INDEXED),
                FieldKind::F64 => schema_builder.add_f64_field(&name, INDEXED),
                FieldKind::Bool => schema_builder.add_bool_field(&name, INDEXED),
                FieldKind::Date => schema_builder.add_date_field(&name, INDEXED),
            };
            fields.insert(name, MappedField { field, kind });
        }

        MappingContext {
            schema: schema_builder.build(),
            fields,
        }
    }
}

impl Default for MappingContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tantivy::schema::Value as _;

    fn test_context() -> MappingContext {
        MappingContext::builder()
            .add_i64_field("field1")
            .add_text_field("field2")
            .add_keyword_field("status")
            .add_bool_field("active")
            .add_f64_field("score")
            .add_date_field("seen_at")
            .build()
    }

    fn object(value: serde_json::Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_builder_declares_all_fields() {
        let context = test_context();
        assert_eq!(context.len(), 6);
        assert!(context.field("field1").is_some());
        assert_eq!(context.field_kind("field2"), Some(FieldKind::Text));
        assert!(context.field("missing").is_none());
    }

    #[test]
    fn test_build_document_scalars() {
        let context = test_context();
        let doc = context
            .build_document(&object(json!({
                "field1": 1,
                "field2": "value",
                "active": true,
                "score": 0.5,
            })))
            .unwrap();

        let field1 = context.field("field1").unwrap();
        let first = doc.get_first(field1).unwrap();
        assert_eq!(first.as_i64(), Some(1));
    }

    #[test]
    fn test_arrays_become_multivalued() {
        let context = test_context();
        let doc = context
            .build_document(&object(json!({"field2": ["one", "two"]})))
            .unwrap();

        let field2 = context.field("field2").unwrap();
        assert_eq!(doc.get_all(field2).count(), 2);
    }

    #[test]
    fn test_nested_objects_flatten_to_dotted_paths() {
        let context = MappingContext::builder()
            .add_text_field("meta.region")
            .build();

        let doc = context
            .build_document(&object(json!({"meta": {"region": "us-east"}})))
            .unwrap();

        let field = context.field("meta.region").unwrap();
        assert_eq!(doc.get_all(field).count(), 1);
    }

    #[test]
    fn test_unmapped_fields_skipped() {
        let context = test_context();
        let result = context.build_document(&object(json!({"unknown": "whatever"})));
        assert!(result.is_ok());
    }

    #[test]
    fn test_string_encoded_numbers_coerce() {
        let context = test_context();
        let doc = context
            .build_document(&object(json!({"field1": "42"})))
            .unwrap();

        let field1 = context.field("field1").unwrap();
        assert_eq!(doc.get_first(field1).unwrap().as_i64(), Some(42));
    }

    #[test]
    fn test_uncoercible_value_is_parse_error() {
        let context = test_context();
        let err = context
            .build_document(&object(json!({"field1": "not-a-number"})))
            .unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_null_values_skipped() {
        let context = test_context();
        let doc = context
            .build_document(&object(json!({"field2": null})))
            .unwrap();

        let field2 = context.field("field2").unwrap();
        assert_eq!(doc.get_all(field2).count(), 0);
    }

    #[test]
    fn test_date_accepts_rfc3339_and_epoch_millis() {
        let context = test_context();
        assert!(context
            .build_document(&object(json!({"seen_at": "2024-03-01T12:00:00Z"})))
            .is_ok());
        assert!(context
            .build_document(&object(json!({"seen_at": 1709294400000_i64})))
            .is_ok());
        assert!(context
            .build_document(&object(json!({"seen_at": "yesterday"})))
            .is_err());
    }
}
