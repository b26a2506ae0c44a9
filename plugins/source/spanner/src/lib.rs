//! Cloud Spanner row source over the Spanner REST API.
//!
//! A connection owns one REST client and an idle session created at
//! connect time, which doubles as the credential check. Each query runs
//! `executeStreamingSql` on its own session and reads the streamed
//! `PartialResultSet` array incrementally, so rows reach the pipeline
//! while the server is still sending.

mod auth;
mod client;
mod config;
mod decode;
mod retry;
mod stream;
mod wire;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use sluice_api::{
    ColumnName, ConfigParam, ConfigValues, Connection, ConnectionResolver, DeclaredColumn, RawRow,
    RowSource, SourceError,
};

use crate::client::SpannerClient;
use crate::stream::{ArrayReader, Frame, RowAssembler};
use crate::wire::PartialResultSet;

pub use crate::config::{Authenticator, ServiceAccount, SpannerConfig};
pub use crate::retry::RetryPolicy;

// ═══════════════════════════════════════════════════════════════
//  Resolver
// ═══════════════════════════════════════════════════════════════

/// Resolver for the `spanner` store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpannerResolver;

impl SpannerResolver {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionResolver for SpannerResolver {
    fn name(&self) -> &str {
        "spanner"
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        config::config_params()
    }

    fn connect<'a>(
        &'a self,
        config: &'a ConfigValues,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let config = SpannerConfig::from_values(config)?;
            let client = SpannerClient::connect(&config).await?;
            let session = client.create_session().await?;
            tracing::info!(
                database = client.database_path(),
                authenticator = ?config.authenticator,
                location = %config.location,
                "connected to Spanner"
            );
            Ok(Box::new(SpannerConnection {
                client: Arc::new(client),
                idle_session: Mutex::new(Some(session)),
            }) as Box<dyn Connection>)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Connection
// ═══════════════════════════════════════════════════════════════

struct SpannerConnection {
    client: Arc<SpannerClient>,
    /// Session created at connect time, handed to the first query.
    idle_session: Mutex<Option<String>>,
}

impl SpannerConnection {
    fn take_idle_session(&self) -> Option<String> {
        let mut guard = match self.idle_session.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("Spanner idle session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.take()
    }
}

impl Connection for SpannerConnection {
    fn query<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RowSource>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let session = match self.take_idle_session() {
                Some(s) => s,
                None => self.client.create_session().await?,
            };
            let source = SpannerSource::start(Arc::clone(&self.client), session, sql).await?;
            Ok(Box::new(source) as Box<dyn RowSource>)
        })
    }
}

impl Drop for SpannerConnection {
    fn drop(&mut self) {
        let idle = match self.idle_session.get_mut() {
            Ok(s) => s.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // Unused sessions would otherwise linger until the server expires them.
        if let (Some(session), Ok(handle)) = (idle, tokio::runtime::Handle::try_current()) {
            let client = Arc::clone(&self.client);
            handle.spawn(async move {
                if let Err(e) = client.delete_session(&session).await {
                    tracing::debug!(error = %e, "failed to delete idle Spanner session");
                }
            });
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Row source
// ═══════════════════════════════════════════════════════════════

/// Cursor over one `executeStreamingSql` response.
struct SpannerSource {
    client: Arc<SpannerClient>,
    /// `None` once closed.
    session: Option<String>,
    response: Option<reqwest::Response>,
    reader: ArrayReader,
    assembler: RowAssembler,
    columns: Vec<DeclaredColumn>,
    finished: bool,
}

impl SpannerSource {
    /// Send the query and read up to the result metadata.
    ///
    /// On failure the session is deleted before the error is returned.
    async fn start(
        client: Arc<SpannerClient>,
        session: String,
        sql: &str,
    ) -> Result<Self, SourceError> {
        let mut source = Self {
            client,
            session: Some(session),
            response: None,
            reader: ArrayReader::new(),
            assembler: RowAssembler::new(Vec::new()),
            columns: Vec::new(),
            finished: false,
        };
        match source.prime(sql).await {
            Ok(()) => Ok(source),
            Err(e) => {
                source.release().await;
                Err(e)
            }
        }
    }

    async fn prime(&mut self, sql: &str) -> Result<(), SourceError> {
        let session = self.session.clone().unwrap_or_default();
        self.response = Some(self.client.execute_streaming_sql(&session, sql).await?);

        let first = loop {
            match self.reader.next::<PartialResultSet>()? {
                Frame::Item(prs) => break prs,
                Frame::End => {
                    return Err(SourceError::protocol("empty result stream without metadata"));
                }
                Frame::NeedMore => {
                    if !self.fill().await? {
                        return Err(SourceError::protocol(
                            "result stream ended before metadata",
                        ));
                    }
                }
            }
        };
        if let Some(status) = &first.error {
            return Err(stream_error(status));
        }
        let fields: Vec<_> = first
            .metadata
            .as_ref()
            .and_then(|m| m.row_type.as_ref())
            .map(|row_type| {
                row_type
                    .fields
                    .iter()
                    .map(|f| (ColumnName::from(f.name.as_str()), f.field_type.clone()))
                    .collect()
            })
            .ok_or_else(|| SourceError::protocol("first result set carries no row type"))?;
        self.assembler = RowAssembler::new(fields);
        self.columns = self.assembler.declared_columns();
        tracing::debug!(columns = self.columns.len(), "Spanner result metadata received");
        self.accept(first)
    }

    /// Read one more body chunk. `false` at end of body.
    async fn fill(&mut self) -> Result<bool, SourceError> {
        let Some(response) = self.response.as_mut() else {
            return Ok(false);
        };
        match response.chunk().await {
            Ok(Some(bytes)) => {
                self.reader.push(&bytes);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(SourceError::query(format!("reading result stream: {e}"))),
        }
    }

    fn accept(&mut self, prs: PartialResultSet) -> Result<(), SourceError> {
        if let Some(status) = &prs.error {
            return Err(stream_error(status));
        }
        self.assembler.push(prs)
    }

    async fn pull(&mut self) -> Result<Option<RawRow>, SourceError> {
        if self.session.is_none() {
            return Err(SourceError::query("row source already closed"));
        }
        loop {
            if let Some(row) = self.assembler.next_row()? {
                return Ok(Some(row));
            }
            if self.finished {
                if self.assembler.has_leftover() {
                    return Err(SourceError::protocol("result stream ended mid-row"));
                }
                return Ok(None);
            }
            match self.reader.next::<PartialResultSet>()? {
                Frame::Item(prs) => self.accept(prs)?,
                Frame::End => {
                    self.finished = true;
                    self.response = None;
                }
                Frame::NeedMore => {
                    if !self.fill().await? {
                        return Err(SourceError::protocol("result stream truncated"));
                    }
                }
            }
        }
    }

    async fn release(&mut self) {
        self.response = None;
        if let Some(session) = self.session.take() {
            if let Err(e) = self.client.delete_session(&session).await {
                tracing::warn!(session = %session, error = %e, "failed to delete Spanner session");
            }
        }
    }
}

fn stream_error(status: &wire::Status) -> SourceError {
    if status.message.is_empty() {
        SourceError::query(format!(
            "query aborted by server (code {})",
            status.code.unwrap_or_default()
        ))
    } else {
        SourceError::query(status.message.clone())
    }
}

impl RowSource for SpannerSource {
    fn columns(&self) -> Option<&[DeclaredColumn]> {
        Some(&self.columns)
    }

    fn next_row(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RawRow>, SourceError>> + Send + '_>> {
        Box::pin(self.pull())
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.release())
    }
}
