use reqwest::{RequestBuilder, Response, StatusCode};

use sluice_api::SourceError;

use crate::auth::access_token;
use crate::config::SpannerConfig;
use crate::retry::{self, RetryPolicy};
use crate::wire::{Session, error_message};

/// Which call a failed response belongs to; decides the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Session,
    Query,
}

/// Thin REST client bound to one database.
#[derive(Debug)]
pub(crate) struct SpannerClient {
    http: reqwest::Client,
    base_url: String,
    database_path: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl SpannerClient {
    pub async fn connect(config: &SpannerConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SourceError::config(format!("HTTP client: {e}")))?;
        let token = access_token(config, &http).await?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            database_path: config.database_path(),
            token,
            retry: config.retry,
        })
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send with retries on transient failures. Only the status line has
    /// been read when this returns.
    async fn send<F>(&self, call: &str, build: F) -> Result<Response, SourceError>
    where
        F: Fn() -> RequestBuilder,
    {
        retry::send(&self.retry, call, || self.authorized(build()))
            .await
            .map_err(|e| SourceError::connection(format!("Spanner request: {e}")))
    }

    /// Create a session; returns its full resource name.
    pub async fn create_session(&self) -> Result<String, SourceError> {
        let url = format!("{}/v1/{}/sessions", self.base_url, self.database_path);
        let body = serde_json::json!({});
        let resp = self
            .send("sessions.create", || self.http.post(&url).json(&body))
            .await?;
        let resp = check(resp, Stage::Session).await?;
        let session: Session = resp
            .json()
            .await
            .map_err(|e| SourceError::protocol(format!("session response: {e}")))?;
        tracing::debug!(session = %session.name, "Spanner session created");
        Ok(session.name)
    }

    /// Start a streaming query. The body is left unread; once this returns
    /// nothing is retried.
    pub async fn execute_streaming_sql(
        &self,
        session: &str,
        sql: &str,
    ) -> Result<Response, SourceError> {
        let url = format!("{}/v1/{session}:executeStreamingSql", self.base_url);
        let body = serde_json::json!({ "sql": sql });
        let resp = self
            .send("executeStreamingSql", || self.http.post(&url).json(&body))
            .await?;
        check(resp, Stage::Query).await
    }

    pub async fn delete_session(&self, session: &str) -> Result<(), SourceError> {
        let url = format!("{}/v1/{session}", self.base_url);
        let resp = self.send("sessions.delete", || self.http.delete(&url)).await?;
        check(resp, Stage::Session).await?;
        tracing::debug!(session, "Spanner session deleted");
        Ok(())
    }
}

async fn check(resp: Response, stage: Stage) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body);
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        message
    };
    Err(classify(status, stage, message))
}

fn classify(status: StatusCode, stage: Stage, message: String) -> SourceError {
    match (stage, status) {
        (_, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => SourceError::connection(message),
        (Stage::Session, _) => SourceError::connection(message),
        (Stage::Query, StatusCode::SERVICE_UNAVAILABLE) => SourceError::connection(message),
        (Stage::Query, _) => SourceError::query(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_api::ErrorKind;

    #[test]
    fn auth_failures_are_connection_errors_at_any_stage() {
        for stage in [Stage::Session, Stage::Query] {
            let err = classify(StatusCode::UNAUTHORIZED, stage, "denied".into());
            assert_eq!(err.kind, ErrorKind::Connection);
        }
    }

    #[test]
    fn rejected_sql_is_a_query_error() {
        let err = classify(StatusCode::BAD_REQUEST, Stage::Query, "Table not found: x".into());
        assert_eq!(err.kind, ErrorKind::Query);
        assert_eq!(err.message, "Table not found: x");
    }

    #[test]
    fn missing_database_is_a_connection_error() {
        let err = classify(StatusCode::NOT_FOUND, Stage::Session, "Database not found".into());
        assert_eq!(err.kind, ErrorKind::Connection);
    }
}
