use std::future::Future;
use std::pin::Pin;

use crate::config::{ConfigParam, ConfigValues};
use crate::error::SourceError;
use crate::schema::DeclaredColumn;
use crate::value::RawRow;

/// Incremental cursor over one query result.
///
/// Owned exclusively by one pipeline run. The pipeline pulls with
/// `next_row()` until `Ok(None)` or an error, and always calls `close()`
/// afterwards, also when the caller abandons the result early.
pub trait RowSource: Send {
    /// Declared column metadata, if the store supplied it.
    ///
    /// May start returning `Some` only after the first `next_row()`.
    fn columns(&self) -> Option<&[DeclaredColumn]> {
        None
    }

    /// Total row count, if the store knows it without enumerating rows.
    fn row_count_hint(&self) -> Option<u64> {
        None
    }

    /// Next row. `Ok(None)` = end of result.
    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RawRow>, SourceError>> + Send + '_>>;

    /// Release the underlying cursor / session. Must be idempotent.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Authenticated handle able to run queries.
pub trait Connection: Send + Sync {
    /// Start a query and return its row source.
    fn query<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RowSource>, SourceError>> + Send + 'a>>;
}

/// Turns a validated config record into a `Connection`.
///
/// The engine doesn't enumerate or know concrete stores.
/// For the engine, a store is just this trait.
pub trait ConnectionResolver: Send + Sync {
    /// Short store name for logs (`"spanner"`, `"memory"`).
    fn name(&self) -> &str;

    /// Parameters accepted in the `connection` config table.
    fn config_params(&self) -> Vec<ConfigParam>;

    /// Establish an authenticated connection.
    fn connect<'a>(
        &'a self,
        config: &'a ConfigValues,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, SourceError>> + Send + 'a>>;
}
