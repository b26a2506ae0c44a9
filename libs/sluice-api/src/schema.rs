use serde::{Deserialize, Serialize};

use crate::value::ColumnName;

/// Normalized type system every source maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    String,
    Number,
    Boolean,
    Date,
}

/// Where a column's logical type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Declared by source metadata, or read from a value shape that maps 1:1.
    Precise,
    /// Guessed; `LogicalType::String` when nothing matched.
    Inferred,
}

/// One column of the result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    pub confidence: Confidence,
}

impl ColumnDescriptor {
    pub fn precise(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            confidence: Confidence::Precise,
        }
    }

    /// Fallback for columns nothing could be said about.
    pub fn inferred_string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logical_type: LogicalType::String,
            confidence: Confidence::Inferred,
        }
    }
}

/// Column metadata declared by the store: name plus native type tag.
///
/// `type_tag` is `None` when the store names the column but not its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredColumn {
    pub name: ColumnName,
    pub type_tag: Option<String>,
}

impl DeclaredColumn {
    pub fn new(name: impl Into<ColumnName>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: Some(type_tag.into()),
        }
    }

    pub fn untyped(name: impl Into<ColumnName>) -> Self {
        Self {
            name: name.into(),
            type_tag: None,
        }
    }
}

/// Result-level metadata: schema plus total row count.
///
/// Computed once per query execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultMetadata {
    pub columns: Vec<ColumnDescriptor>,
    pub expected_row_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_serializes_lowercase_enums() {
        let col = ColumnDescriptor::precise("id", LogicalType::Number);
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "id", "logical_type": "number", "confidence": "precise"})
        );
    }

    #[test]
    fn inferred_string_fallback() {
        let col = ColumnDescriptor::inferred_string("payload");
        assert_eq!(col.logical_type, LogicalType::String);
        assert_eq!(col.confidence, Confidence::Inferred);
    }
}
