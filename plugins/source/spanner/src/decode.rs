//! Spanner wire values to `NativeValue`.
//!
//! The REST API encodes every value as JSON: 64-bit integers, numerics,
//! timestamps and dates as strings, bytes as base64, floats as numbers
//! or the strings `"NaN"`, `"Infinity"`, `"-Infinity"`.

use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use sluice_api::{ColumnName, NativeValue, SourceError, WrappedNumber};

use crate::wire::SpannerType;

pub(crate) fn decode_value(value: Value, ty: &SpannerType) -> Result<NativeValue, SourceError> {
    if value.is_null() {
        return Ok(NativeValue::Null);
    }
    match ty.code.as_str() {
        "BOOL" => match value {
            Value::Bool(b) => Ok(NativeValue::Bool(b)),
            other => Err(mismatch(ty, &other)),
        },
        "INT64" => {
            let s = expect_str(value, ty)?;
            s.parse::<i64>()
                .map(|n| NativeValue::Wrapped(WrappedNumber::Int64(n)))
                .map_err(|e| SourceError::protocol(format!("bad INT64 '{s}': {e}")))
        }
        "FLOAT64" => Ok(NativeValue::Wrapped(WrappedNumber::Float64(float(value, ty)?))),
        "FLOAT32" => Ok(NativeValue::Wrapped(WrappedNumber::Float32(
            float(value, ty)? as f32,
        ))),
        "NUMERIC" => Ok(NativeValue::Wrapped(WrappedNumber::Numeric(expect_str(
            value, ty,
        )?))),
        // ENUM arrives as the decimal enum number; the column is untyped text.
        "STRING" | "UUID" | "INTERVAL" | "ENUM" => Ok(NativeValue::String(expect_str(value, ty)?)),
        "BYTES" | "PROTO" => {
            let s = expect_str(value, ty)?;
            base64::engine::general_purpose::STANDARD
                .decode(s.as_bytes())
                .map(NativeValue::Bytes)
                .map_err(|e| SourceError::protocol(format!("bad base64 in {}: {e}", ty.code)))
        }
        "TIMESTAMP" => {
            let s = expect_str(value, ty)?;
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| NativeValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| SourceError::protocol(format!("bad TIMESTAMP '{s}': {e}")))
        }
        "DATE" => {
            let s = expect_str(value, ty)?;
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(NativeValue::Date)
                .map_err(|e| SourceError::protocol(format!("bad DATE '{s}': {e}")))
        }
        "JSON" => {
            let s = expect_str(value, ty)?;
            serde_json::from_str(&s)
                .map(NativeValue::Json)
                .map_err(|e| SourceError::protocol(format!("bad JSON value: {e}")))
        }
        "ARRAY" => {
            let Some(element) = ty.array_element_type.as_deref() else {
                return Err(SourceError::protocol("ARRAY type without element type"));
            };
            match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| decode_value(item, element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(NativeValue::Array),
                other => Err(mismatch(ty, &other)),
            }
        }
        "STRUCT" => {
            let fields = ty
                .struct_type
                .as_ref()
                .map(|s| s.fields.as_slice())
                .unwrap_or_default();
            match value {
                Value::Array(items) if items.len() == fields.len() => fields
                    .iter()
                    .zip(items)
                    .map(|(field, item)| {
                        decode_value(item, &field.field_type)
                            .map(|v| (ColumnName::from(field.name.as_str()), v))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(NativeValue::Struct),
                other => Err(mismatch(ty, &other)),
            }
        }
        // Newer type codes: keep text as text, anything else as JSON.
        _ => Ok(match value {
            Value::String(s) => NativeValue::String(s),
            other => NativeValue::Json(other),
        }),
    }
}

fn expect_str(value: Value, ty: &SpannerType) -> Result<String, SourceError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(mismatch(ty, &other)),
    }
}

fn float(value: Value, ty: &SpannerType) -> Result<f64, SourceError> {
    match &value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(ty, &value)),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => Err(mismatch(ty, &value)),
        },
        _ => Err(mismatch(ty, &value)),
    }
}

fn mismatch(ty: &SpannerType, value: &Value) -> SourceError {
    SourceError::protocol(format!("unexpected wire value {value} for {}", ty.code))
}
