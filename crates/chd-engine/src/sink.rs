//! Notification boundary.
//!
//! Delivery is fire-and-forget from the engine's perspective: the fire
//! transition has already happened when `deliver` is called, a delivery
//! failure is logged and never retried here, and the rule stays `Fired`.
//! Retry/backoff is the receiving front-end's concern.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use chd_schemas::AlertNotification;

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum SinkError {
    /// Network / transport failure reaching the sink.
    Transport(String),
    /// The sink answered with a non-success status.
    Status { code: u16 },
    /// The sink was constructed with unusable parameters.
    Config(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Transport(msg) => write!(f, "sink transport error: {msg}"),
            SinkError::Status { code } => write!(f, "sink rejected delivery with status {code}"),
            SinkError::Config(msg) => write!(f, "sink config error: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

// ---------------------------------------------------------------------------
// NotificationSink trait
// ---------------------------------------------------------------------------

/// Fired-alert delivery contract. One call per fired rule, ever.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, note: &AlertNotification) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Log-only sink, used when no webhook is configured. Never fails.
#[derive(Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn deliver(&self, note: &AlertNotification) -> Result<(), SinkError> {
        info!(
            user_id = note.user_id,
            asset = %note.asset,
            direction = note.direction.as_str(),
            target_price_micros = note.target_price_micros,
            actual_price_micros = note.actual_price_micros,
            "alert fired"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebhookSink
// ---------------------------------------------------------------------------

/// POSTs the JSON payload to the front-end's webhook endpoint.
#[derive(Debug)]
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(SinkError::Config("webhook url must not be empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Config(format!("http client: {e}")))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, note: &AlertNotification) -> Result<(), SinkError> {
        let resp = self
            .http
            .post(&self.url)
            .json(note)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                code: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chd_schemas::{AssetId, Direction};
    use chrono::Utc;

    #[tokio::test]
    async fn tracing_sink_always_accepts() {
        let note = AlertNotification {
            user_id: 7,
            asset: AssetId::new("bitcoin").unwrap(),
            direction: Direction::Below,
            target_price_micros: 60_000_000_000,
            actual_price_micros: 59_000_000_000,
            fired_at: Utc::now(),
        };
        assert!(TracingSink.deliver(&note).await.is_ok());
    }

    #[test]
    fn webhook_sink_rejects_empty_url() {
        let err = WebhookSink::new("  ", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }
}
