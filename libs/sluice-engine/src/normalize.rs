//! Raw row → normalized row.
//!
//! Total: a value that matches no coercion rule is dropped from its row,
//! the rest of the row is kept.

use base64::Engine;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

use sluice_api::{NativeValue, NormalizedRow, RawRow, ScalarValue};

/// Normalize every column of a row. Uncoercible columns are omitted.
pub fn normalize(row: RawRow) -> NormalizedRow {
    let mut out = NormalizedRow::with_capacity(row.len());
    for (name, value) in row {
        match normalize_value(value) {
            Some(scalar) => out.push(name, scalar),
            None => tracing::trace!(column = %name, "value dropped during normalization"),
        }
    }
    out
}

/// Coerce one value, or `None` when no rule applies.
///
/// Explicit nulls are dropped like structs, arrays and JSON documents.
/// NaN and the infinities have no JSON number form and are dropped too,
/// as are instants whose year RFC 3339 cannot spell (before 0000, after 9999).
pub fn normalize_value(value: NativeValue) -> Option<ScalarValue> {
    match value {
        NativeValue::String(s) => Some(ScalarValue::String(s)),
        NativeValue::Bool(b) => Some(ScalarValue::Bool(b)),
        NativeValue::Number(n) => finite(n),
        NativeValue::Timestamp(ts) => timestamp_to_iso(&ts).map(ScalarValue::Date),
        NativeValue::Date(d) => date_to_iso(d).map(ScalarValue::Date),
        NativeValue::Bytes(bytes) => Some(ScalarValue::String(
            base64::engine::general_purpose::STANDARD.encode(bytes),
        )),
        NativeValue::Wrapped(w) => w.to_f64().and_then(finite),
        NativeValue::Null
        | NativeValue::Struct(_)
        | NativeValue::Array(_)
        | NativeValue::Json(_) => None,
    }
}

fn finite(n: f64) -> Option<ScalarValue> {
    n.is_finite().then_some(ScalarValue::Number(n))
}

/// RFC 3339 in UTC with only as many fractional digits as the instant needs.
///
/// `None` outside years 0000..=9999: chrono would write an expanded
/// `+10000-...` form that RFC 3339 parsers reject.
pub fn timestamp_to_iso(ts: &DateTime<Utc>) -> Option<String> {
    (0..=9999)
        .contains(&ts.year())
        .then(|| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Calendar date as midnight UTC of that day.
pub fn date_to_iso(date: NaiveDate) -> Option<String> {
    timestamp_to_iso(&date.and_time(chrono::NaiveTime::MIN).and_utc())
}
