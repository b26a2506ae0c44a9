//! Wire types of the Spanner REST API (`executeStreamingSql`).

use serde::Deserialize;

/// One element of the streamed JSON array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartialResultSet {
    /// Present on the first element only.
    #[serde(default)]
    pub metadata: Option<ResultSetMetadata>,
    /// Flat list of column values, row after row.
    #[serde(default)]
    pub values: Vec<serde_json::Value>,
    /// The last value is incomplete and continues in the next element.
    #[serde(default)]
    pub chunked_value: bool,
    /// Set when the server aborts the stream.
    #[serde(default)]
    pub error: Option<Status>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultSetMetadata {
    #[serde(default)]
    pub row_type: Option<StructType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StructType {
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Field {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: SpannerType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpannerType {
    pub code: String,
    #[serde(default)]
    pub array_element_type: Option<Box<SpannerType>>,
    #[serde(default)]
    pub struct_type: Option<StructType>,
}

/// `google.rpc.Status` as rendered in REST error bodies.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Status {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body of a non-2xx response: `{"error": {...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Status,
}

/// Response of `sessions.create`.
#[derive(Debug, Deserialize)]
pub(crate) struct Session {
    pub name: String,
}

/// Best-effort human message from an error response body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) if !b.error.message.is_empty() => b.error.message,
        Ok(b) => b.error.status.unwrap_or_else(|| body.trim().to_string()),
        // Some proxies wrap the error in a one-element array.
        Err(_) => match serde_json::from_str::<Vec<ErrorBody>>(body) {
            Ok(mut v) if !v.is_empty() => v.swap_remove(0).error.message,
            _ => body.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_partial_result_set() {
        let prs: PartialResultSet = serde_json::from_str(
            r#"{
              "metadata": {"rowType": {"fields": [
                {"name": "id", "type": {"code": "INT64"}},
                {"name": "tags", "type": {"code": "ARRAY", "arrayElementType": {"code": "STRING"}}}
              ]}},
              "values": ["1", ["a", "b"]],
              "resumeToken": "AAA="
            }"#,
        )
        .unwrap();
        let fields = prs.metadata.unwrap().row_type.unwrap().fields;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].field_type.code, "ARRAY");
        assert_eq!(
            fields[1].field_type.array_element_type.as_ref().unwrap().code,
            "STRING"
        );
        assert_eq!(prs.values.len(), 2);
        assert!(!prs.chunked_value);
    }

    #[test]
    fn extracts_google_error_message() {
        let body = r#"{"error": {"code": 404, "message": "Database not found: db1", "status": "NOT_FOUND"}}"#;
        assert_eq!(error_message(body), "Database not found: db1");
        let wrapped = format!("[{body}]");
        assert_eq!(error_message(&wrapped), "Database not found: db1");
        assert_eq!(error_message("upstream timeout\n"), "upstream timeout");
    }
}
