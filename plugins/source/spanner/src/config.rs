use std::time::Duration;

use sluice_api::{ConfigParam, ConfigValues, ParamType, ParamValue, SourceError};

use crate::auth::unescape_private_key;
use crate::retry::RetryPolicy;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com";
pub(crate) const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_EMULATOR_HOST: &str = "localhost";
const DEFAULT_EMULATOR_PORT: u64 = 9020;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RETRIES: u64 = 10;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_LOCATION: &str = "US";

/// How the connector obtains credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticator {
    /// Service-account key exchanged for an access token (JWT bearer grant).
    ServiceAccount,
    /// Access token printed by `gcloud auth print-access-token`.
    GcloudCli,
    /// Caller-supplied OAuth access token.
    OAuth,
    /// Local emulator, plain HTTP, no credentials.
    Emulator,
}

impl Authenticator {
    fn parse(s: &str) -> Result<Self, SourceError> {
        match s {
            "service-account" => Ok(Self::ServiceAccount),
            "gcloud-cli" => Ok(Self::GcloudCli),
            "oauth" => Ok(Self::OAuth),
            "emulator" => Ok(Self::Emulator),
            other => Err(SourceError::config(format!(
                "unknown authenticator '{other}', \
                 expected 'service-account', 'gcloud-cli', 'oauth' or 'emulator'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannerConfig {
    pub project_id: String,
    pub instance_id: String,
    pub database_id: String,
    pub authenticator: Authenticator,
    pub token: Option<String>,
    pub service_account: Option<ServiceAccount>,
    pub token_uri: String,
    pub emulator_host: String,
    pub emulator_port: u16,
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    /// Accepted for existing connection files; REST routing goes by instance.
    pub location: String,
}

/// Credentials from a service-account key file.
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    /// PEM with real newlines.
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub(crate) fn config_params() -> Vec<ConfigParam> {
    vec![
        ConfigParam::required("project_id", ParamType::Str, "Google Cloud project id"),
        ConfigParam::required("instance_id", ParamType::Str, "Spanner instance id"),
        ConfigParam::required("database_id", ParamType::Str, "Spanner database id"),
        ConfigParam::optional(
            "authenticator",
            ParamType::Str,
            Some(ParamValue::Str("service-account".into())),
            "service-account | gcloud-cli | oauth | emulator",
        ),
        ConfigParam::optional(
            "client_email",
            ParamType::Str,
            None,
            "Service account email (service-account)",
        ),
        ConfigParam::optional(
            "private_key",
            ParamType::Str,
            None,
            "Service account PEM key; escaped \\n sequences are accepted (service-account)",
        ),
        ConfigParam::optional(
            "token_uri",
            ParamType::Str,
            Some(ParamValue::Str(DEFAULT_TOKEN_URI.into())),
            "OAuth token endpoint (service-account)",
        ),
        ConfigParam::optional("token", ParamType::Str, None, "OAuth access token (oauth)"),
        ConfigParam::optional(
            "emulator_host",
            ParamType::Str,
            Some(ParamValue::Str(DEFAULT_EMULATOR_HOST.into())),
            "Emulator REST host (emulator)",
        ),
        ConfigParam::optional(
            "emulator_port",
            ParamType::U64,
            Some(ParamValue::U64(DEFAULT_EMULATOR_PORT)),
            "Emulator REST port (emulator)",
        ),
        ConfigParam::optional(
            "endpoint",
            ParamType::Str,
            Some(ParamValue::Str(DEFAULT_ENDPOINT.into())),
            "Spanner REST endpoint",
        ),
        ConfigParam::optional(
            "connect_timeout_secs",
            ParamType::U64,
            Some(ParamValue::U64(DEFAULT_CONNECT_TIMEOUT_SECS)),
            "TCP connect timeout in seconds",
        ),
        ConfigParam::optional(
            "max_retries",
            ParamType::U64,
            Some(ParamValue::U64(DEFAULT_MAX_RETRIES)),
            "Retries for transient failures before the result stream starts",
        ),
        ConfigParam::optional(
            "retry_base_delay_ms",
            ParamType::U64,
            Some(ParamValue::U64(DEFAULT_RETRY_BASE_DELAY_MS)),
            "First retry delay in milliseconds, doubled per attempt",
        ),
        ConfigParam::optional(
            "location",
            ParamType::Str,
            Some(ParamValue::Str(DEFAULT_LOCATION.into())),
            "Instance location, informational",
        ),
    ]
}

impl SpannerConfig {
    pub fn from_values(values: &ConfigValues) -> Result<Self, SourceError> {
        let required = |name: &str| {
            values
                .get_str(name)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| SourceError::config(format!("'{name}' is required")))
        };
        let project_id = required("project_id")?;
        let instance_id = required("instance_id")?;
        let database_id = required("database_id")?;
        let non_empty = |name: &str| {
            values
                .get_str(name)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let authenticator =
            Authenticator::parse(values.get_str("authenticator").unwrap_or("service-account"))?;
        let token = non_empty("token");
        if authenticator == Authenticator::OAuth && token.is_none() {
            return Err(SourceError::config("authenticator 'oauth' requires 'token'"));
        }
        let service_account = match authenticator {
            Authenticator::ServiceAccount => {
                let client_email = non_empty("client_email").ok_or_else(|| {
                    SourceError::config("authenticator 'service-account' requires 'client_email'")
                })?;
                let private_key = values
                    .get_str("private_key")
                    .map(unescape_private_key)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        SourceError::config("authenticator 'service-account' requires 'private_key'")
                    })?;
                Some(ServiceAccount {
                    client_email,
                    private_key,
                })
            }
            _ => None,
        };
        let emulator_port = values.get_u64("emulator_port").unwrap_or(DEFAULT_EMULATOR_PORT);
        let emulator_port = u16::try_from(emulator_port)
            .map_err(|_| SourceError::config(format!("emulator_port {emulator_port} out of range")))?;
        let max_retries = values.get_u64("max_retries").unwrap_or(DEFAULT_MAX_RETRIES);
        let max_retries = u32::try_from(max_retries)
            .map_err(|_| SourceError::config(format!("max_retries {max_retries} out of range")))?;
        let retry = RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(
                values
                    .get_u64("retry_base_delay_ms")
                    .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
        };

        Ok(Self {
            project_id,
            instance_id,
            database_id,
            authenticator,
            token,
            service_account,
            token_uri: values
                .get_str("token_uri")
                .unwrap_or(DEFAULT_TOKEN_URI)
                .to_string(),
            emulator_host: values
                .get_str("emulator_host")
                .unwrap_or(DEFAULT_EMULATOR_HOST)
                .to_string(),
            emulator_port,
            endpoint: values
                .get_str("endpoint")
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            connect_timeout: Duration::from_secs(
                values
                    .get_u64("connect_timeout_secs")
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            retry,
            location: values.get_str("location").unwrap_or(DEFAULT_LOCATION).to_string(),
        })
    }

    /// `projects/{p}/instances/{i}/databases/{d}`
    pub fn database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project_id, self.instance_id, self.database_id
        )
    }

    /// Scheme and authority every request URL starts with.
    pub fn base_url(&self) -> String {
        match self.authenticator {
            Authenticator::Emulator => format!("http://{}:{}", self.emulator_host, self.emulator_port),
            Authenticator::ServiceAccount | Authenticator::GcloudCli | Authenticator::OAuth => {
                self.endpoint.clone()
            }
        }
    }
}
