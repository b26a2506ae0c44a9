use sluice_api::{ErrorKind, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    QueryExecution(String),

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// Context is prepended to the message of message-carrying variants.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::Connection(msg) => EngineError::Connection(format!("{ctx}: {msg}")),
            EngineError::QueryExecution(msg) => {
                EngineError::QueryExecution(format!("{ctx}: {msg}"))
            }
            other => other,
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn reason(&self) -> String {
        match self {
            EngineError::Config(msg)
            | EngineError::Connection(msg)
            | EngineError::QueryExecution(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        match e.kind {
            ErrorKind::Config => EngineError::Config(e.message),
            ErrorKind::Connection => EngineError::Connection(e.message),
            ErrorKind::Query | ErrorKind::Protocol => EngineError::QueryExecution(e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_map_by_kind() {
        assert!(matches!(
            EngineError::from(SourceError::connection("refused")),
            EngineError::Connection(m) if m == "refused"
        ));
        assert!(matches!(
            EngineError::from(SourceError::protocol("bad frame")),
            EngineError::QueryExecution(_)
        ));
        assert!(matches!(
            EngineError::from(SourceError::config("no token")),
            EngineError::Config(_)
        ));
    }

    #[test]
    fn reason_strips_variant_prefix() {
        let err = EngineError::QueryExecution("Table not found: users".into());
        assert_eq!(err.to_string(), "query failed: Table not found: users");
        assert_eq!(err.reason(), "Table not found: users");
    }
}
