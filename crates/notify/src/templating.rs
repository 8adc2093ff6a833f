//! Minijinja rendering of alert messages.
//!
//! Subject and body are arbitrary template strings, validated once when the
//! renderer is built. A fresh [`minijinja::Environment`] is created per
//! render call.

use courtside_core::Alert;

use crate::traits::{Notification, NotifyError};

pub const DEFAULT_SUBJECT_TEMPLATE: &str =
    "{{ location }}: {{ in_use }}/{{ capacity }} courts in use";

pub const DEFAULT_BODY_TEMPLATE: &str = "Usage reached your threshold of {{ threshold }}. \
{{ details }}. {{ available }} free \
{%- if availability_pct is not none %} ({{ availability_pct | round(0) }}% open){% endif %} \
as of {{ retrieved_at }}.";

/// Values exposed to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    pub subscriber_id: String,
    pub threshold: i64,
    pub location: String,
    pub in_use: i64,
    pub capacity: i64,
    pub available: i64,
    pub availability_pct: Option<f64>,
    pub details: String,
    /// RFC 3339.
    pub retrieved_at: String,
}

impl From<&Alert> for AlertContext {
    fn from(alert: &Alert) -> Self {
        let snap = &alert.snapshot;
        Self {
            subscriber_id: alert.subscriber_id.clone(),
            threshold: alert.threshold,
            location: snap.location.clone(),
            in_use: snap.in_use,
            capacity: snap.capacity,
            available: snap.available(),
            availability_pct: snap.availability_pct(),
            details: snap.details.clone(),
            retrieved_at: snap.retrieved_at.to_rfc3339(),
        }
    }
}

/// Renders alerts into notifications.
#[derive(Debug, Clone)]
pub struct AlertRenderer {
    subject: String,
    body: String,
}

impl AlertRenderer {
    /// Build a renderer from custom templates, checking their syntax.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Result<Self, NotifyError> {
        let renderer = Self {
            subject: subject.into(),
            body: body.into(),
        };
        renderer.validate(&renderer.subject)?;
        renderer.validate(&renderer.body)?;
        Ok(renderer)
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env
    }

    fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    pub fn render_str(
        &self,
        template_str: &str,
        ctx: &AlertContext,
    ) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    pub fn render(&self, alert: &Alert) -> Result<Notification, NotifyError> {
        let ctx = AlertContext::from(alert);
        let subject = self.render_str(&self.subject, &ctx)?;
        let body = self.render_str(&self.body, &ctx)?;
        Ok(Notification::new(subject, body, alert.clone()))
    }
}

impl Default for AlertRenderer {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}
