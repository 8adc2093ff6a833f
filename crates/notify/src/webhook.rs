//! Generic HTTP webhook notifier.
//!
//! Delivers notifications as JSON payloads to a configured webhook URL
//! with optional custom headers.

use std::collections::HashMap;
use std::time::Duration;

use crate::traits::{Notification, Notifier, NotifyError};

/// Upper bound on one webhook request, so a hung endpoint cannot stall the
/// dispatcher.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each notification as JSON to a configured endpoint.
///
/// Environment variable references (`${VAR_NAME}`) in the URL and header
/// values are resolved at construction time.
#[derive(Debug)]
pub struct WebhookNotifier {
    /// Target URL (env vars already resolved).
    url: String,
    headers: HashMap<String, String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier.
    ///
    /// Missing env vars referenced in `url` or `headers` produce a
    /// [`NotifyError::Config`] error.
    pub fn new(url: &str, headers: HashMap<String, String>) -> Result<Self, NotifyError> {
        Self::with_timeout(url, headers, WEBHOOK_TIMEOUT)
    }

    fn with_timeout(
        url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(url)?;
        if !resolved_url.starts_with("http://") && !resolved_url.starts_with("https://") {
            return Err(NotifyError::Config(format!(
                "webhook URL must be http(s): {resolved_url}"
            )));
        }

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        Ok(Self {
            url: resolved_url,
            headers: resolved_headers,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(notification);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
