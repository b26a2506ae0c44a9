//! Bounded retry with exponential backoff for REST calls made before any
//! result data has been read. A call whose response body is already being
//! streamed is never retried.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

const MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): base, 2x base, 4x base, ...
    pub(crate) fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }
}

fn transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn transient_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Send the request built by `build`, rebuilding and resending it while the
/// outcome is transient and retries remain. The last outcome is returned
/// as-is for the caller to classify.
pub(crate) async fn send<F>(
    policy: &RetryPolicy,
    call: &str,
    build: F,
) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut retry = 0;
    loop {
        let outcome = build().send().await;
        let transient = match &outcome {
            Ok(resp) => transient_status(resp.status()),
            Err(e) => transient_error(e),
        };
        if !transient || retry >= policy.max_retries {
            return outcome;
        }

        retry += 1;
        let delay = policy.delay(retry);
        match &outcome {
            Ok(resp) => tracing::warn!(
                call,
                retry,
                status = %resp.status(),
                delay_ms = delay.as_millis() as u64,
                "transient Spanner response, retrying"
            ),
            Err(e) => tracing::warn!(
                call,
                retry,
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "Spanner request failed, retrying"
            ),
        }
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(7), MAX_DELAY);
        assert_eq!(policy.delay(40), MAX_DELAY);
    }

    #[test]
    fn only_overload_and_gateway_statuses_are_transient() {
        assert!(transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!transient_status(StatusCode::BAD_REQUEST));
        assert!(!transient_status(StatusCode::UNAUTHORIZED));
        assert!(!transient_status(StatusCode::NOT_FOUND));
    }
}
