//! Source type tag → logical type.
//!
//! Total: unknown or absent tags map to `None`, which callers turn into
//! `String` with `Inferred` confidence. Never an error.

use sluice_api::{ColumnDescriptor, LogicalType, NativeValue};

/// Map a declared type tag to a logical type.
///
/// Matching is case-insensitive and ignores a parameter suffix, so
/// `STRING(MAX)` resolves like `STRING` and `ARRAY<INT64>` like `ARRAY`.
pub fn map_type(tag: Option<&str>) -> Option<LogicalType> {
    let tag = base_tag(tag?);
    match tag.as_str() {
        "BOOL" | "BOOLEAN" => Some(LogicalType::Boolean),

        "INT64" | "FLOAT32" | "FLOAT64" | "NUMERIC" => Some(LogicalType::Number),
        "INT" | "INTEGER" | "SMALLINT" | "BIGINT" | "TINYINT" | "BYTEINT" | "FLOAT" | "DECIMAL"
        | "BIGDECIMAL" | "BIGNUMERIC" => Some(LogicalType::Number),

        // BYTES values travel as base64 text.
        "STRING" | "BYTES" => Some(LogicalType::String),
        "VARCHAR" | "TEXT" | "TIME" | "GEOGRAPHY" | "INTERVAL" => Some(LogicalType::String),

        "TIMESTAMP" | "DATE" | "DATETIME" => Some(LogicalType::Date),

        // Composite types need a richer destination model.
        "STRUCT" | "ARRAY" | "JSON" => None,

        _ => None,
    }
}

/// Descriptor for a column declared by source metadata.
pub fn descriptor_for_tag(name: &str, tag: Option<&str>) -> ColumnDescriptor {
    match map_type(tag) {
        Some(logical_type) => ColumnDescriptor::precise(name, logical_type),
        None => ColumnDescriptor::inferred_string(name),
    }
}

/// Descriptor from a runtime value's shape, used when no metadata exists.
///
/// Plain scalars and date-like values map 1:1; object-like values go
/// through the tag table by their source label.
pub fn descriptor_for_value(name: &str, value: &NativeValue) -> ColumnDescriptor {
    let logical_type = match value {
        NativeValue::String(_) => Some(LogicalType::String),
        NativeValue::Number(_) => Some(LogicalType::Number),
        NativeValue::Bool(_) => Some(LogicalType::Boolean),
        NativeValue::Timestamp(_) | NativeValue::Date(_) => Some(LogicalType::Date),
        NativeValue::Null => None,
        other => map_type(other.source_label()),
    };
    match logical_type {
        Some(logical_type) => ColumnDescriptor::precise(name, logical_type),
        None => ColumnDescriptor::inferred_string(name),
    }
}

fn base_tag(tag: &str) -> String {
    let end = tag.find(['(', '<']).unwrap_or(tag.len());
    tag[..end].trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use sluice_api::{Confidence, WrappedNumber};

    #[test]
    fn documented_tags_resolve() {
        for (tag, expected) in [
            ("BOOL", LogicalType::Boolean),
            ("INT64", LogicalType::Number),
            ("FLOAT32", LogicalType::Number),
            ("FLOAT64", LogicalType::Number),
            ("NUMERIC", LogicalType::Number),
            ("STRING", LogicalType::String),
            ("BYTES", LogicalType::String),
            ("TIMESTAMP", LogicalType::Date),
            ("DATE", LogicalType::Date),
        ] {
            assert_eq!(map_type(Some(tag)), Some(expected), "mismatch for {tag}");
        }
    }

    #[test]
    fn aliases_resolve() {
        for (tag, expected) in [
            ("BOOLEAN", LogicalType::Boolean),
            ("BIGINT", LogicalType::Number),
            ("DECIMAL", LogicalType::Number),
            ("BIGNUMERIC", LogicalType::Number),
            ("VARCHAR", LogicalType::String),
            ("GEOGRAPHY", LogicalType::String),
            ("DATETIME", LogicalType::Date),
        ] {
            assert_eq!(map_type(Some(tag)), Some(expected), "mismatch for {tag}");
        }
    }

    #[test]
    fn composite_and_unknown_tags_are_unmapped() {
        for tag in ["STRUCT", "ARRAY", "JSON", "PROTO", "ENUM", "UUID", "", "whatever"] {
            assert_eq!(map_type(Some(tag)), None, "{tag} should be unmapped");
        }
        assert_eq!(map_type(None), None);
    }

    #[test]
    fn tags_are_case_insensitive_and_parameter_free() {
        assert_eq!(map_type(Some("int64")), Some(LogicalType::Number));
        assert_eq!(map_type(Some("STRING(MAX)")), Some(LogicalType::String));
        assert_eq!(map_type(Some("BYTES(1024)")), Some(LogicalType::String));
        assert_eq!(map_type(Some("ARRAY<INT64>")), None);
        assert_eq!(map_type(Some(" Timestamp ")), Some(LogicalType::Date));
    }

    #[test]
    fn declared_unknown_tag_degrades_to_inferred_string() {
        let col = descriptor_for_tag("payload", Some("JSON"));
        assert_eq!(col.logical_type, LogicalType::String);
        assert_eq!(col.confidence, Confidence::Inferred);

        let col = descriptor_for_tag("id", Some("INT64"));
        assert_eq!(col.logical_type, LogicalType::Number);
        assert_eq!(col.confidence, Confidence::Precise);
    }

    #[test]
    fn value_shapes_map_precisely() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        for (value, expected) in [
            (NativeValue::String("x".into()), LogicalType::String),
            (NativeValue::Number(1.5), LogicalType::Number),
            (NativeValue::Bool(true), LogicalType::Boolean),
            (NativeValue::Timestamp(ts), LogicalType::Date),
            (NativeValue::Date(date), LogicalType::Date),
            (NativeValue::Wrapped(WrappedNumber::Int64(7)), LogicalType::Number),
            (NativeValue::Wrapped(WrappedNumber::Numeric("1.1".into())), LogicalType::Number),
            (NativeValue::Bytes(vec![1, 2]), LogicalType::String),
        ] {
            let col = descriptor_for_value("c", &value);
            assert_eq!(col.logical_type, expected, "mismatch for {value:?}");
            assert_eq!(col.confidence, Confidence::Precise, "confidence for {value:?}");
        }
    }

    #[test]
    fn unmapped_value_shapes_fall_back() {
        for value in [
            NativeValue::Null,
            NativeValue::Array(vec![]),
            NativeValue::Struct(vec![]),
            NativeValue::Json(serde_json::json!({"a": 1})),
        ] {
            let col = descriptor_for_value("c", &value);
            assert_eq!(col, ColumnDescriptor::inferred_string("c"), "for {value:?}");
        }
    }
}
