//! Firestore REST API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

impl Value {
    /// Fields of a map value.
    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::MapValue(m) => m.fields.as_ref(),
            _ => None,
        }
    }

    pub fn map(fields: HashMap<String, Value>) -> Self {
        Value::MapValue(MapValue {
            fields: Some(fields),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document fields
    pub fields: Option<HashMap<String, Value>>,
    /// Create time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Update time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Document with a full resource name, as used inside commit writes.
    pub fn named(name: impl Into<String>, fields: HashMap<String, Value>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(fields)
        }
    }

    /// Last segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }
}

/// List documents response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    pub documents: Option<Vec<Document>>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// Commit Types (atomic writes with server-side transforms)
// ============================================================================

/// A single write operation in a commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    /// Update or insert a document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,

    /// Delete a document by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,

    /// Field mask for partial updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,

    /// Server-side transforms applied after the update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_transforms: Option<Vec<FieldTransform>>,

    /// Precondition for the write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

/// Document field mask for partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

/// Precondition for a write operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    /// Document must exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,

    /// Document must have this update time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Precondition {
    pub fn exists() -> Self {
        Self {
            exists: Some(true),
            update_time: None,
        }
    }
}

/// Server-side transform of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransform {
    pub field_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<Value>,
}

impl FieldTransform {
    /// Atomic integer increment of `field_path` by `by`. A missing field counts as 0.
    pub fn increment(field_path: impl Into<String>, by: u64) -> Self {
        Self {
            field_path: field_path.into(),
            increment: Some(by.to_firestore_value()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub writes: Vec<Write>,
}

/// Result of a single write in a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// Update time of the written document.
    pub update_time: Option<String>,
    /// Values produced by the write's transforms, in order.
    pub transform_results: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub write_results: Option<Vec<WriteResult>>,
    pub commit_time: Option<String>,
}

// ============================================================================
// Query Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    pub document: Option<Document>,
    pub read_time: Option<String>,
}

/// Subset of Firestore's structured query: one collection, equality filters, limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl StructuredQuery {
    /// `SELECT * FROM collection WHERE field == value LIMIT limit`.
    pub fn field_equals(collection: &str, field: &str, value: Value, limit: i32) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: collection.to_string(),
            }],
            filter: Some(Filter {
                field_filter: FieldFilter {
                    field: FieldReference {
                        field_path: field.to_string(),
                    },
                    op: "EQUAL".to_string(),
                    value,
                },
            }),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field_filter: FieldFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

/// Quote one field path segment. Segments that are not plain identifiers
/// (bucket keys such as `2025-01-02`) are wrapped in backticks.
pub fn quote_segment(segment: &str) -> String {
    let mut chars = segment.chars();
    let simple = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if simple {
        segment.to_string()
    } else {
        let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
        format!("`{}`", escaped)
    }
}

/// Join segments into a dotted field path, quoting as needed.
pub fn field_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| quote_segment(s.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Convert a Rust value to Firestore Value.
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.clone())
    }
}

impl ToFirestoreValue for &str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.to_string())
    }
}

impl ToFirestoreValue for i64 {
    fn to_firestore_value(&self) -> Value {
        Value::IntegerValue(self.to_string())
    }
}

impl ToFirestoreValue for u64 {
    fn to_firestore_value(&self) -> Value {
        Value::IntegerValue((*self).min(i64::MAX as u64).to_string())
    }
}

impl ToFirestoreValue for bool {
    fn to_firestore_value(&self) -> Value {
        Value::BooleanValue(*self)
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339())
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Option<T> {
    fn to_firestore_value(&self) -> Value {
        match self {
            Some(v) => v.to_firestore_value(),
            None => Value::NullValue(()),
        }
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for BTreeMap<String, T> {
    fn to_firestore_value(&self) -> Value {
        Value::map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_firestore_value()))
                .collect(),
        )
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Vec<T> {
    fn to_firestore_value(&self) -> Value {
        Value::ArrayValue(ArrayValue {
            values: Some(self.iter().map(ToFirestoreValue::to_firestore_value).collect()),
        })
    }
}

/// Convert Firestore Value to Rust type.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

impl FromFirestoreValue for String {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFirestoreValue for i64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntegerValue(s) => s.parse().ok(),
            Value::DoubleValue(f) => Some(*f as i64),
            _ => None,
        }
    }
}

impl FromFirestoreValue for u64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntegerValue(s) => s.parse::<i64>().ok().map(|n| n.max(0) as u64),
            Value::DoubleValue(f) => Some(f.max(0.0) as u64),
            _ => None,
        }
    }
}

impl FromFirestoreValue for bool {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.into()),
            _ => None,
        }
    }
}

/// Elements that fail to convert are skipped. An empty array arrives without `values`.
impl<T: FromFirestoreValue> FromFirestoreValue for Vec<T> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::ArrayValue(a) => Some(
                a.values
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(T::from_firestore_value)
                    .collect(),
            ),
            _ => None,
        }
    }
}
