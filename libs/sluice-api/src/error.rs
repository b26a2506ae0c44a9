use std::fmt;

/// Error kind for source errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection parameters are invalid or unsupported.
    Config,
    /// The store could not be reached or refused the credentials.
    Connection,
    /// The store rejected or aborted the query.
    Query,
    /// The store answered with something the source could not decode.
    Protocol,
}

/// Source error returned by all `RowSource`, `Connection` and resolver methods.
#[derive(Debug, Clone)]
pub struct SourceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, message: msg.into() }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Query, message: msg.into() }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Protocol, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → SourceError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::connection(e.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = SourceError::query("table not found").with_context("run 'q1'");
        assert_eq!(err.kind, ErrorKind::Query);
        assert_eq!(err.message, "run 'q1': table not found");
    }

    #[test]
    fn json_errors_are_protocol_errors() {
        let err: SourceError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Protocol);
    }
}
