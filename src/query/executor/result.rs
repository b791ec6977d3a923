// Query Result Implementation
//
// This module defines the values flowing through registers and the error
// type shared by every pipeline stage.

use std::fmt;

use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value stored in one register of a block.
///
/// Documents are represented as `Object` values with attribute order preserved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DataValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Array(Vec<DataValue>),
    Object(LinkedHashMap<String, DataValue>),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            DataValue::Object(attributes) => {
                write!(f, "{{")?;
                for (i, (key, value)) in attributes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\":{}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl DataValue {
    /// Build an object value from `(attribute, value)` pairs, keeping their order
    pub fn object<K, I>(attributes: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DataValue)>,
    {
        DataValue::Object(attributes.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get a top-level attribute of an object value
    pub fn get(&self, attribute: &str) -> Option<&DataValue> {
        match self {
            DataValue::Object(attributes) => attributes.get(attribute),
            _ => None,
        }
    }

    /// Resolve a dotted attribute path such as `address.city`.
    /// Returns `None` if any step is missing or not an object.
    pub fn get_path(&self, path: &str) -> Option<&DataValue> {
        path.split('.').try_fold(self, |current, step| current.get(step))
    }

    pub fn serialize_document(&self) -> QueryResult<Vec<u8>> {
        bincode::serialize(self).map_err(QueryError::from)
    }

    pub fn deserialize_document(bytes: &[u8]) -> QueryResult<DataValue> {
        bincode::deserialize(bytes).map_err(QueryError::from)
    }
}

/// Represents query execution error
#[derive(Error, Debug)]
pub enum QueryError {
    /// Error from storage layer, never retried inside the pipeline
    #[error("Storage error: {0}")]
    StorageError(String),
    /// Error during query execution
    #[error("Execution error: {0}")]
    ExecutionError(String),
    /// Error in data type handling
    #[error("Type error: {0}")]
    TypeError(String),
    /// Collection not found
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// Executor configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A stage broke the pull contract; the query must be aborted
    #[error("Contract violation: {0}")]
    ContractViolation(String),
    /// The query was aborted from outside
    #[error("Query killed")]
    Killed,
}

impl From<bincode::Error> for QueryError {
    fn from(err: bincode::Error) -> Self {
        QueryError::StorageError(format!("Document codec error: {}", err))
    }
}

impl QueryError {
    /// Whether this error indicates a programming error between stages
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueryError::ContractViolation(_))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> DataValue {
        DataValue::object([
            ("_key", DataValue::Text("1".to_string())),
            ("name", DataValue::Text("Alice".to_string())),
            (
                "address",
                DataValue::object([("city", DataValue::Text("Cologne".to_string()))]),
            ),
        ])
    }

    #[test]
    fn test_path_lookup() {
        let doc = sample_document();
        assert_eq!(doc.get("name"), Some(&DataValue::Text("Alice".to_string())));
        assert_eq!(
            doc.get_path("address.city"),
            Some(&DataValue::Text("Cologne".to_string()))
        );
        assert_eq!(doc.get_path("address.zip"), None);
        assert_eq!(doc.get_path("name.first"), None);
    }

    #[test]
    fn test_document_codec_keeps_attribute_order() {
        let doc = sample_document();
        let bytes = doc.serialize_document().unwrap();
        let decoded = DataValue::deserialize_document(&bytes).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(
            decoded.to_string(),
            r#"{"_key":"1","name":"Alice","address":{"city":"Cologne"}}"#
        );
    }

    #[test]
    fn test_corrupt_document_is_storage_error() {
        let err = DataValue::deserialize_document(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, QueryError::StorageError(_)));
        assert!(!err.is_fatal());
    }
}
