/// Parameter type for connection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    U64,
    Str,
}

impl ParamType {
    /// What a raw value must look like, for error messages.
    pub fn expected(self) -> &'static str {
        match self {
            ParamType::U64 => "a non-negative integer",
            ParamType::Str => "a string",
        }
    }
}

/// Declaration of a single connection parameter.
///
/// Resolvers export these via `ConnectionResolver::config_params()`.
/// The engine validates the raw config record against them BEFORE connecting.
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<ParamValue>,
    pub description: String,
}

impl ConfigParam {
    /// Required parameter without a default.
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default: None,
            description: description.to_string(),
        }
    }

    /// Optional parameter. `default` is applied when the key is absent.
    pub fn optional(
        name: &str,
        param_type: ParamType,
        default: Option<ParamValue>,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            default,
            description: description.to_string(),
        }
    }
}

/// Typed config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    U64(u64),
    Str(String),
}

/// Validated connection parameters, passed to the resolver at connect time.
///
/// The engine builds this from the config source (TOML table, JSON, ...)
/// after validating against the resolver's `ConfigParam` declarations.
/// Resolvers read values via typed getters.
#[derive(Debug, Clone, Default)]
pub struct ConfigValues {
    entries: Vec<(String, ParamValue)>,
}

impl ConfigValues {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == &name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Builder form of `set`.
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.get(name) {
            Some(ParamValue::U64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ParamValue::Str(v)) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_entry() {
        let mut values = ConfigValues::new();
        values.set("host", ParamValue::Str("a".into()));
        values.set("host", ParamValue::Str("b".into()));
        assert_eq!(values.get_str("host"), Some("b"));
    }

    #[test]
    fn getters_reject_mismatched_types() {
        let values = ConfigValues::new()
            .with("port", ParamValue::U64(9020))
            .with("host", ParamValue::Str("9020".into()));
        assert_eq!(values.get_u64("port"), Some(9020));
        assert_eq!(values.get_str("port"), None);
        assert_eq!(values.get_u64("host"), None);
        assert_eq!(values.get_str("host"), Some("9020"));
        assert_eq!(values.get_str("missing"), None);
    }
}
