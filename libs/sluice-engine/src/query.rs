use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};

use sluice_api::{ConfigValues, ConnectionResolver, ErrorKind, SourceError};

use crate::batch::{BatchStream, run};
use crate::error::EngineError;

/// Rows per batch when the caller does not choose.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Trivial query used to check a connection.
pub const CHECK_QUERY: &str = "SELECT 1";

/// Run `query` against the store described by `config`.
///
/// Connection failures surface as `EngineError::Connection`, a rejected
/// query as `EngineError::QueryExecution`. Errors after the first row
/// arrive on the returned stream instead.
pub async fn execute(
    resolver: &dyn ConnectionResolver,
    query: &str,
    config: &ConfigValues,
    batch_size: usize,
) -> Result<BatchStream, EngineError> {
    if batch_size == 0 {
        return Err(EngineError::InvalidBatchSize);
    }

    let connection = resolver
        .connect(config)
        .await
        .map_err(connect_error)
        .map_err(|e| e.with_context(resolver.name()))?;
    tracing::debug!(store = resolver.name(), "connection established");

    let source = connection.query(query).await.map_err(EngineError::from)?;
    tracing::info!(store = resolver.name(), batch_size, "query started");

    run(source, batch_size)
}

/// Anything that goes wrong while connecting is a connection problem,
/// except for config the resolver refused outright.
fn connect_error(e: SourceError) -> EngineError {
    match e.kind {
        ErrorKind::Config => EngineError::Config(e.message),
        _ => EngineError::Connection(e.message),
    }
}

/// Outcome of a connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    Failed { reason: String },
}

impl ConnectionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConnectionStatus::Ok)
    }
}

/// `true` on success, `{"reason": "..."}` otherwise.
impl Serialize for ConnectionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConnectionStatus::Ok => serializer.serialize_bool(true),
            ConnectionStatus::Failed { reason } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("reason", reason)?;
                map.end()
            }
        }
    }
}

/// Issue the check query and drain it. Never fails; problems become a reason.
pub async fn test_connection(
    resolver: &dyn ConnectionResolver,
    config: &ConfigValues,
) -> ConnectionStatus {
    match check(resolver, config).await {
        Ok(()) => ConnectionStatus::Ok,
        Err(e) => {
            let reason = e.reason();
            tracing::warn!(store = resolver.name(), %reason, "connection test failed");
            ConnectionStatus::Failed {
                reason: if reason.is_empty() {
                    "Unknown connection error".to_string()
                } else {
                    reason
                },
            }
        }
    }
}

async fn check(resolver: &dyn ConnectionResolver, config: &ConfigValues) -> Result<(), EngineError> {
    let mut stream = execute(resolver, CHECK_QUERY, config, 1).await?;
    while let Some(batch) = stream.next_batch().await {
        batch?;
    }
    Ok(())
}

/// Only `.sql` files are runnable queries; anything else is skipped.
pub fn is_query_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "sql")
}
