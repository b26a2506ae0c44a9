//! Bearer tokens for the Spanner REST API.
//!
//! A service-account key is turned into a short-lived access token with the
//! OAuth 2.0 JWT bearer grant: sign an assertion with the account's RSA key,
//! post it to the token endpoint, read back `access_token`.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use serde::{Deserialize, Serialize};

use sluice_api::SourceError;

use crate::config::{Authenticator, ServiceAccount, SpannerConfig};
use crate::retry;

const SPANNER_SCOPE: &str = "https://www.googleapis.com/auth/spanner.data";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Key files and env vars often carry the PEM with literal `\n` sequences.
pub(crate) fn unescape_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n").trim().to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

/// RS256-signed assertion for `account`, valid for one hour from `now`.
pub(crate) fn signed_assertion(
    account: &ServiceAccount,
    token_uri: &str,
    now: u64,
) -> Result<String, SourceError> {
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
        .map_err(|e| SourceError::config(format!("private_key is not an RSA PEM key: {e}")))?;
    let claims = AssertionClaims {
        iss: account.client_email.clone(),
        scope: SPANNER_SCOPE.to_string(),
        aud: token_uri.to_string(),
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| SourceError::config(format!("failed to sign service account assertion: {e}")))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

async fn exchange(
    http: &reqwest::Client,
    config: &SpannerConfig,
    account: &ServiceAccount,
) -> Result<String, SourceError> {
    let assertion = signed_assertion(account, &config.token_uri, get_current_timestamp())?;
    let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
    let resp = retry::send(&config.retry, "token", || http.post(&config.token_uri).form(&form))
        .await
        .map_err(|e| SourceError::connection(format!("token request: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let err: TokenError = serde_json::from_str(&body).unwrap_or_default();
        let reason = match (err.error.as_str(), err.error_description.as_str()) {
            ("", "") => format!("HTTP {status}"),
            (code, "") => code.to_string(),
            (_, description) => description.to_string(),
        };
        return Err(SourceError::connection(format!(
            "service account token exchange failed: {reason}"
        )));
    }
    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| SourceError::protocol(format!("token response: {e}")))?;
    tracing::debug!(client_email = %account.client_email, "service account token issued");
    Ok(token.access_token)
}

async fn gcloud_token() -> Result<String, SourceError> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SourceError::connection(format!("failed to run gcloud: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::connection(format!(
            "gcloud auth print-access-token failed: {}",
            stderr.trim()
        )));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(SourceError::connection("gcloud printed an empty access token"));
    }
    Ok(token)
}

/// Bearer token for the configured authenticator; `None` for the emulator.
pub(crate) async fn access_token(
    config: &SpannerConfig,
    http: &reqwest::Client,
) -> Result<Option<String>, SourceError> {
    match config.authenticator {
        Authenticator::Emulator => Ok(None),
        Authenticator::OAuth => Ok(config.token.clone()),
        Authenticator::GcloudCli => gcloud_token().await.map(Some),
        Authenticator::ServiceAccount => {
            let account = config.service_account.as_ref().ok_or_else(|| {
                SourceError::config("authenticator 'service-account' requires 'private_key'")
            })?;
            exchange(http, config, account).await.map(Some)
        }
    }
}
