//! Document and write-request types
//!
//! Defines the schema-light document map the policy evaluates and the write
//! request envelope the gateway receives from clients and replicators.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field names shared with the storage and replication layers
pub mod fields {
    pub const DOCUMENT_TYPE: &str = "documentType";
    pub const EMAIL: &str = "email";
    pub const CREATED_BY: &str = "createdBy";
    /// Reserved tombstone marker
    pub const DELETED: &str = "_deleted";
}

/// An untyped document body: field name to JSON value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tombstone body
    pub fn tombstone() -> Self {
        Self::new().with(fields::DELETED, true)
    }

    /// Builder pattern: set a field
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Set a field in place
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Raw field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field value if it is a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// The `documentType` value, if present
    pub fn document_type(&self) -> Option<&Value> {
        self.get(fields::DOCUMENT_TYPE)
    }

    /// Whether the body carries the reserved `_deleted: true` marker
    pub fn is_tombstone(&self) -> bool {
        matches!(self.0.get(fields::DELETED), Some(Value::Bool(true)))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the document has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Convert into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for Document {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Write operation proposed by a client or replicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOperation {
    /// Create or update a document
    Upsert,
    /// Delete a document (leaves a tombstone)
    Delete,
}

impl DocumentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for DocumentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata for tracking and observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique request identifier (UUIDv7 for time-ordering)
    pub request_id: Uuid,

    /// Timestamp when the write was received
    pub timestamp: DateTime<Utc>,

    /// Writer identifier (device, replicator or user)
    pub source: String,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Metadata {
    /// Create new metadata with current timestamp
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            source: source.into(),
            correlation_id: None,
        }
    }

    /// Builder pattern: set correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// A proposed document revision, as received by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Request metadata
    pub metadata: Metadata,

    /// Document ID
    pub doc_id: String,

    /// The proposed operation
    pub operation: DocumentOperation,

    /// Proposed body (a delete may still carry fields, e.g. `documentType`)
    #[serde(default)]
    pub body: Document,
}

impl WriteRequest {
    /// Create an upsert request
    pub fn upsert(doc_id: impl Into<String>, body: Document) -> Self {
        Self {
            metadata: Metadata::default(),
            doc_id: doc_id.into(),
            operation: DocumentOperation::Upsert,
            body,
        }
    }

    /// Create a delete request
    pub fn delete(doc_id: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::default(),
            doc_id: doc_id.into(),
            operation: DocumentOperation::Delete,
            body: Document::tombstone(),
        }
    }

    /// Builder: set metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this request deletes the document
    ///
    /// The explicit operation and the reserved tombstone marker are
    /// equivalent signals.
    pub fn is_delete(&self) -> bool {
        self.operation == DocumentOperation::Delete || self.body.is_tombstone()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_accessors() {
        let doc = Document::try_from(json!({
            "documentType": "report",
            "createdBy": "u1",
            "amount": 12.5
        }))
        .unwrap();

        assert_eq!(doc.get_str(fields::CREATED_BY), Some("u1"));
        assert_eq!(doc.get_str("amount"), None);
        assert_eq!(doc.document_type(), Some(&json!("report")));
        assert!(!doc.is_tombstone());
        assert!(Document::try_from(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_tombstone_marker_counts_as_delete() {
        let body = Document::new().with("documentType", "user").with("_deleted", true);
        let request = WriteRequest::upsert("user::a", body);
        assert!(request.is_delete());

        // Only a literal `true` marks a tombstone
        let body = Document::new().with("_deleted", "yes");
        assert!(!WriteRequest::upsert("user::a", body).is_delete());
        assert!(WriteRequest::delete("user::a").is_delete());
    }

    #[test]
    fn test_write_request_wire_format() {
        let request = WriteRequest::upsert(
            "report::1",
            Document::new().with("documentType", "report").with("createdBy", "u1"),
        )
        .with_metadata(Metadata::new("android-device-7").with_correlation_id("abc"));

        let bytes = request.to_bytes().unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire["operation"], "upsert");
        assert_eq!(wire["body"]["createdBy"], "u1");
        assert_eq!(wire["metadata"]["correlation_id"], "abc");

        let restored = WriteRequest::from_bytes(&bytes).unwrap();
        assert_eq!(restored.doc_id, "report::1");
        assert_eq!(restored.metadata.request_id, request.metadata.request_id);
    }
}
