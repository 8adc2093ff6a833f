//! Deadline-aware HTTP GET with bounded exponential backoff.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::time::Instant;
use tracing::warn;

use crate::traits::FetchError;

const USER_AGENT: &str = concat!("courtside/", env!("CARGO_PKG_VERSION"));
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Response body plus the declared content type.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedBody {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("text/html"))
            || self.body.trim_start().starts_with('<')
    }
}

/// Shared HTTP client (connection pooling) with retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        })
    }

    /// Override the retry policy. `max_attempts` is clamped to at least 1.
    pub fn with_retry(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    /// GET `url` and return its body.
    ///
    /// Transport errors and 5xx responses are retried with doubling backoff,
    /// up to the attempt limit. 4xx responses fail immediately. Each attempt
    /// is bounded by the time left until `deadline`, and no backoff sleep
    /// extends past it.
    pub async fn get_text(&self, url: &str, deadline: Instant) -> Result<FetchedBody, FetchError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::DeadlineExceeded);
            }

            let result = self
                .client
                .get(url)
                .header(ACCEPT, "application/json, text/html, */*")
                .timeout(remaining)
                .send()
                .await;

            let err = match result {
                Ok(resp) if resp.status().is_server_error() => FetchError::Status {
                    status: resp.status().as_u16(),
                    url: url.to_string(),
                },
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(FetchError::Status {
                        status: resp.status().as_u16(),
                        url: url.to_string(),
                    });
                }
                Ok(resp) => {
                    let content_type = resp
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = resp.text().await?;
                    return Ok(FetchedBody { content_type, body });
                }
                Err(e) => FetchError::Http(e),
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }
            if Instant::now() + backoff >= deadline {
                warn!(attempt, url, error = %err, "no time left before deadline, giving up");
                return Err(err);
            }

            warn!(
                attempt,
                url,
                error = %err,
                backoff_ms = backoff.as_millis() as u64,
                "HTTP request failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_detection_uses_header_or_body() {
        let by_header = FetchedBody {
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: "{}".to_string(),
        };
        let by_body = FetchedBody {
            content_type: Some("application/json".to_string()),
            body: "  <!DOCTYPE html><html></html>".to_string(),
        };
        let json = FetchedBody {
            content_type: Some("application/json".to_string()),
            body: r#"{"success":true}"#.to_string(),
        };
        assert!(by_header.is_html());
        assert!(by_body.is_html());
        assert!(!json.is_html());
    }

    #[test]
    fn retry_attempts_clamped() {
        let client = HttpClient::new()
            .unwrap()
            .with_retry(0, Duration::from_millis(1));
        assert_eq!(client.max_attempts, 1);
    }
}
