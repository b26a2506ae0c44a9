use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};

use sluice_api::{
    ConfigParam, ConfigValues, Connection, ConnectionResolver, DeclaredColumn, NativeValue,
    ParamType, ParamValue, RawRow, RowSource, SourceError, WrappedNumber,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryTable: one canned query result
// ═══════════════════════════════════════════════════════════════

/// Canned result for one query text.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    columns: Option<Vec<DeclaredColumn>>,
    rows: Vec<RawRow>,
    report_row_count: bool,
    columns_after_first_row: bool,
    fail_after: Option<(usize, String)>,
}

impl MemoryTable {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Declare column metadata.
    pub fn with_columns(mut self, columns: Vec<DeclaredColumn>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Declared metadata becomes visible only after the first row is pulled.
    pub fn columns_after_first_row(mut self) -> Self {
        self.columns_after_first_row = true;
        self
    }

    /// Report the row count up front.
    pub fn with_row_count(mut self) -> Self {
        self.report_row_count = true;
        self
    }

    /// Fail with a query error after yielding `rows` rows.
    pub fn fail_after(mut self, rows: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((rows, message.into()));
        self
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySource
// ═══════════════════════════════════════════════════════════════

/// Row source over an in-memory table.
pub struct MemorySource {
    columns: Option<Vec<DeclaredColumn>>,
    columns_visible: bool,
    rows: VecDeque<RawRow>,
    row_count: Option<u64>,
    fail_after: Option<(usize, String)>,
    row_delay: Duration,
    pulled: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MemorySource {
    pub fn new(table: MemoryTable) -> Self {
        Self {
            columns_visible: !table.columns_after_first_row,
            columns: table.columns,
            row_count: table.report_row_count.then_some(table.rows.len() as u64),
            rows: table.rows.into(),
            fail_after: table.fail_after,
            row_delay: Duration::ZERO,
            pulled: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = delay;
        self
    }

    /// Number of rows handed out so far.
    pub fn pulled_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pulled)
    }

    /// Set once `close()` ran.
    pub fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl RowSource for MemorySource {
    fn columns(&self) -> Option<&[DeclaredColumn]> {
        if self.columns_visible {
            self.columns.as_deref()
        } else {
            None
        }
    }

    fn row_count_hint(&self) -> Option<u64> {
        self.row_count
    }

    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RawRow>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(SourceError::query("row source already closed"));
            }
            if !self.row_delay.is_zero() {
                tokio::time::sleep(self.row_delay).await;
            }
            let pulled = self.pulled.load(Ordering::Acquire);
            if let Some((limit, message)) = &self.fail_after {
                if pulled >= *limit {
                    return Err(SourceError::query(message.clone()));
                }
            }
            let row = self.rows.pop_front();
            if row.is_some() {
                self.pulled.fetch_add(1, Ordering::AcqRel);
                self.columns_visible = true;
            }
            Ok(row)
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.rows.clear();
            self.closed.store(true, Ordering::Release);
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryResolver / MemoryConnection
// ═══════════════════════════════════════════════════════════════

/// Resolver serving canned tables keyed by exact query text.
///
/// `SELECT 1` is always answered, so connection checks succeed.
#[derive(Clone, Default)]
pub struct MemoryResolver {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
    unreachable: Option<String>,
    closed_sources: Arc<AtomicUsize>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver whose every connection attempt fails with `reason`.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            unreachable: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn register(&self, query: impl Into<String>, table: MemoryTable) {
        let mut guard = match self.tables.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory table registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.insert(query.into(), table);
    }

    /// Number of sources opened through this resolver that have been closed.
    pub fn closed_sources(&self) -> usize {
        self.closed_sources.load(Ordering::Acquire)
    }

    /// Resolver preloaded with a small `people` table covering every value shape.
    pub fn demo() -> Self {
        let resolver = Self::new();
        resolver.register(DEMO_QUERY, demo_table());
        resolver
    }

    fn lookup(&self, query: &str) -> Option<MemoryTable> {
        let guard = match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory table registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.get(query.trim()).cloned()
    }
}

/// Query text answered by [`MemoryResolver::demo`].
pub const DEMO_QUERY: &str = "SELECT * FROM people";

impl ConnectionResolver for MemoryResolver {
    fn name(&self) -> &str {
        "memory"
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        vec![ConfigParam::optional(
            "row_delay_ms",
            ParamType::U64,
            Some(ParamValue::U64(0)),
            "Artificial delay before each row, in milliseconds",
        )]
    }

    fn connect<'a>(
        &'a self,
        config: &'a ConfigValues,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(reason) = &self.unreachable {
                return Err(SourceError::connection(reason.clone()));
            }
            let row_delay = Duration::from_millis(config.get_u64("row_delay_ms").unwrap_or(0));
            Ok(Box::new(MemoryConnection {
                resolver: self.clone(),
                row_delay,
            }) as Box<dyn Connection>)
        })
    }
}

struct MemoryConnection {
    resolver: MemoryResolver,
    row_delay: Duration,
}

impl Connection for MemoryConnection {
    fn query<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RowSource>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let table = match self.resolver.lookup(sql) {
                Some(table) => table,
                None if sql.trim().eq_ignore_ascii_case("SELECT 1") => {
                    MemoryTable::new(vec![std::iter::once((
                        "",
                        NativeValue::Wrapped(WrappedNumber::Int64(1)),
                    ))
                    .collect()])
                    .with_columns(vec![DeclaredColumn::new("", "INT64")])
                }
                None => return Err(SourceError::query(format!("no table registered for query: {sql}"))),
            };
            let source = MemorySource::new(table).with_row_delay(self.row_delay);
            Ok(Box::new(TrackedSource {
                inner: source,
                closed_sources: Arc::clone(&self.resolver.closed_sources),
                counted: false,
            }) as Box<dyn RowSource>)
        })
    }
}

/// Counts closes on the resolver so callers can observe cleanup.
struct TrackedSource {
    inner: MemorySource,
    closed_sources: Arc<AtomicUsize>,
    counted: bool,
}

impl RowSource for TrackedSource {
    fn columns(&self) -> Option<&[DeclaredColumn]> {
        self.inner.columns()
    }

    fn row_count_hint(&self) -> Option<u64> {
        self.inner.row_count_hint()
    }

    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RawRow>, SourceError>> + Send + '_>> {
        self.inner.next_row()
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.inner.close().await;
            if !self.counted {
                self.counted = true;
                self.closed_sources.fetch_add(1, Ordering::AcqRel);
            }
        })
    }
}

fn demo_table() -> MemoryTable {
    let row = |id: i64, name: &str, active: bool, score: &str, joined: (i32, u32, u32)| -> RawRow {
        [
            ("id", NativeValue::Wrapped(WrappedNumber::Int64(id))),
            ("name", NativeValue::String(name.to_string())),
            ("active", NativeValue::Bool(active)),
            ("score", NativeValue::Wrapped(WrappedNumber::Numeric(score.to_string()))),
            (
                "joined",
                NaiveDate::from_ymd_opt(joined.0, joined.1, joined.2)
                    .map_or(NativeValue::Null, NativeValue::Date),
            ),
            (
                "updated_at",
                Utc.timestamp_opt(1_700_000_000 + id * 3600, 0)
                    .single()
                    .map_or(NativeValue::Null, NativeValue::Timestamp),
            ),
            ("avatar", NativeValue::Bytes(name.as_bytes().to_vec())),
            (
                "tags",
                NativeValue::Array(vec![NativeValue::String("pioneer".to_string())]),
            ),
        ]
        .into_iter()
        .collect()
    };

    MemoryTable::new(vec![
        row(1, "Ada", true, "99.5", (1815, 12, 10)),
        row(2, "Grace", false, "97.25", (1906, 12, 9)),
        row(3, "Edsger", true, "88", (1930, 5, 11)),
    ])
    .with_columns(vec![
        DeclaredColumn::new("id", "INT64"),
        DeclaredColumn::new("name", "STRING"),
        DeclaredColumn::new("active", "BOOL"),
        DeclaredColumn::new("score", "NUMERIC"),
        DeclaredColumn::new("joined", "DATE"),
        DeclaredColumn::new("updated_at", "TIMESTAMP"),
        DeclaredColumn::new("avatar", "BYTES"),
        DeclaredColumn::new("tags", "ARRAY"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<RawRow> {
        (0..n)
            .map(|i| std::iter::once(("n", NativeValue::Number(i as f64))).collect())
            .collect()
    }

    #[tokio::test]
    async fn yields_rows_in_order_then_none() {
        let mut source = MemorySource::new(MemoryTable::new(rows(2)));
        let first = source.next_row().await.unwrap().unwrap();
        assert_eq!(first.get("n"), Some(&NativeValue::Number(0.0)));
        assert!(source.next_row().await.unwrap().is_some());
        assert!(source.next_row().await.unwrap().is_none());
        assert_eq!(source.pulled_handle().load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn fails_after_configured_rows() {
        let mut source = MemorySource::new(MemoryTable::new(rows(5)).fail_after(1, "boom"));
        assert!(source.next_row().await.unwrap().is_some());
        let err = source.next_row().await.unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn late_columns_show_up_after_first_row() {
        let table = MemoryTable::new(rows(1))
            .with_columns(vec![DeclaredColumn::new("n", "FLOAT64")])
            .columns_after_first_row();
        let mut source = MemorySource::new(table);
        assert!(source.columns().is_none());
        source.next_row().await.unwrap();
        assert_eq!(source.columns().map(<[_]>::len), Some(1));
    }

    #[tokio::test]
    async fn resolver_answers_select_one_and_rejects_unknown_queries() {
        let resolver = MemoryResolver::new();
        let conn = resolver.connect(&ConfigValues::new()).await.unwrap();
        let mut check = conn.query("select 1").await.unwrap();
        assert!(check.next_row().await.unwrap().is_some());
        check.close().await;
        assert_eq!(resolver.closed_sources(), 1);

        let err = conn.query("SELECT * FROM nowhere").await.err().unwrap();
        assert_eq!(err.kind, sluice_api::ErrorKind::Query);
    }

    #[tokio::test]
    async fn unreachable_resolver_fails_to_connect() {
        let resolver = MemoryResolver::unreachable("connection refused");
        let err = resolver.connect(&ConfigValues::new()).await.err().unwrap();
        assert_eq!(err.kind, sluice_api::ErrorKind::Connection);
    }
}
