use serde::Deserialize;

use sluice_api::{ConfigParam, ConfigValues, ParamType, ParamValue};

use crate::error::EngineError;
use crate::query::DEFAULT_BATCH_SIZE;

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SluiceConfig {
    /// Rows per emitted batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Connection parameters, validated against the resolver's declarations.
    #[serde(default)]
    pub connection: Option<serde_json::Value>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl SluiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        let config: SluiceConfig =
            toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.batch_size == 0 {
            return Err(EngineError::InvalidBatchSize);
        }
        Ok(config)
    }

    /// Validate the `connection` table against `params`.
    pub fn connection_values(&self, params: &[ConfigParam]) -> Result<ConfigValues, EngineError> {
        build_connection_config(self.connection.as_ref(), params)
    }
}

/// Check a raw `connection` record against the resolver's declarations
/// and produce the typed values it will connect with.
///
/// Undeclared keys are an error. Absent keys take their default; an absent
/// required key without one is an error. An absent record counts as empty.
pub fn build_connection_config(
    config: Option<&serde_json::Value>,
    params: &[ConfigParam],
) -> Result<ConfigValues, EngineError> {
    let empty = serde_json::Map::new();
    let table = match config {
        None => &empty,
        Some(serde_json::Value::Object(table)) => table,
        Some(other) => {
            return Err(EngineError::Config(format!(
                "connection must be a table, got {}",
                json_kind(other)
            )));
        }
    };

    if let Some(key) = table.keys().find(|k| !params.iter().any(|p| &p.name == *k)) {
        return Err(EngineError::Config(format!("unknown parameter '{key}'")));
    }

    params.iter().try_fold(ConfigValues::new(), |values, param| {
        let value = match (table.get(&param.name), &param.default) {
            (Some(raw), _) => coerce(param, raw)?,
            (None, Some(default)) => default.clone(),
            (None, None) if param.required => {
                return Err(EngineError::Config(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
            (None, None) => return Ok(values),
        };
        Ok(values.with(param.name.as_str(), value))
    })
}

/// TOML and JSON scalars into the declared type. Integers may be quoted,
/// strings may be written as numbers or booleans.
fn coerce(param: &ConfigParam, raw: &serde_json::Value) -> Result<ParamValue, EngineError> {
    use serde_json::Value;

    let value = match (param.param_type, raw) {
        (ParamType::U64, Value::Number(n)) => n.as_u64().map(ParamValue::U64),
        (ParamType::U64, Value::String(s)) => s.trim().parse().ok().map(ParamValue::U64),
        (ParamType::Str, Value::String(s)) => Some(ParamValue::Str(s.clone())),
        (ParamType::Str, Value::Number(n)) => Some(ParamValue::Str(n.to_string())),
        (ParamType::Str, Value::Bool(b)) => Some(ParamValue::Str(b.to_string())),
        _ => None,
    };
    value.ok_or_else(|| {
        EngineError::Config(format!(
            "parameter '{}': expected {}, got {raw}",
            param.name,
            param.param_type.expected()
        ))
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a table",
    }
}
