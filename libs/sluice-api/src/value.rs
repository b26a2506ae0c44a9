use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Column name shared between all rows of one result.
pub type ColumnName = Arc<str>;

/// Source-native value, as a row source hands it over.
///
/// Closed set: every shape a source may produce has a variant here,
/// so coercion is an exhaustive match instead of runtime probing.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    /// Plain IEEE-754 double.
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// Calendar date without time zone.
    Date(NaiveDate),
    Bytes(Vec<u8>),
    /// Numeric kept wrapped to avoid precision loss in transit.
    Wrapped(WrappedNumber),
    Struct(Vec<(ColumnName, NativeValue)>),
    Array(Vec<NativeValue>),
    Json(serde_json::Value),
}

impl NativeValue {
    /// Source type label for object-like shapes.
    ///
    /// Scalars that map to a logical type on their own return `None`.
    pub fn source_label(&self) -> Option<&'static str> {
        match self {
            NativeValue::Wrapped(w) => Some(w.source_label()),
            NativeValue::Bytes(_) => Some("BYTES"),
            NativeValue::Struct(_) => Some("STRUCT"),
            NativeValue::Array(_) => Some("ARRAY"),
            NativeValue::Json(_) => Some("JSON"),
            NativeValue::Null
            | NativeValue::Bool(_)
            | NativeValue::Number(_)
            | NativeValue::String(_)
            | NativeValue::Timestamp(_)
            | NativeValue::Date(_) => None,
        }
    }
}

/// Numeric wrapper types.
#[derive(Debug, Clone, PartialEq)]
pub enum WrappedNumber {
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Decimal literal as sent by the store (e.g. `"12345.000000001"`).
    Numeric(String),
}

impl WrappedNumber {
    /// Reduce to a double.
    ///
    /// Lossy: integers beyond 2^53 and long decimals are rounded to the
    /// nearest representable double. `None` only when a `Numeric` literal
    /// does not parse.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            WrappedNumber::Int64(v) => Some(*v as f64),
            WrappedNumber::Float32(v) => Some(f64::from(*v)),
            WrappedNumber::Float64(v) => Some(*v),
            WrappedNumber::Numeric(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn source_label(&self) -> &'static str {
        match self {
            WrappedNumber::Int64(_) => "INT64",
            WrappedNumber::Float32(_) => "FLOAT32",
            WrappedNumber::Float64(_) => "FLOAT64",
            WrappedNumber::Numeric(_) => "NUMERIC",
        }
    }
}

/// One result row as produced by a row source.
///
/// Ordered by column position. Inserting a name twice replaces the
/// earlier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow(Vec<(ColumnName, NativeValue)>);

impl RawRow {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn insert(&mut self, name: impl Into<ColumnName>, value: NativeValue) {
        let name = name.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.0.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnName, &NativeValue)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for RawRow {
    type Item = (ColumnName, NativeValue);
    type IntoIter = std::vec::IntoIter<(ColumnName, NativeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<ColumnName>> FromIterator<(K, NativeValue)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, NativeValue)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Normalized, engine-agnostic scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    String(String),
    Number(f64),
    Bool(bool),
    /// RFC 3339 date-time in UTC (`...Z`).
    Date(String),
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScalarValue::String(s) | ScalarValue::Date(s) => serializer.serialize_str(s),
            ScalarValue::Number(n) => serializer.serialize_f64(*n),
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// Row after normalization: column name → scalar, in source column order.
///
/// Columns whose value could not be normalized are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRow(Vec<(ColumnName, ScalarValue)>);

impl NormalizedRow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Append a column. Callers guarantee names are unique (they come from a `RawRow`).
    pub fn push(&mut self, name: ColumnName, value: ScalarValue) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.0.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnName, &ScalarValue)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for NormalizedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(&**k, v)?;
        }
        map.end()
    }
}
