//! Provider boundary: request/response types, error taxonomy, and the
//! [`PriceSource`] trait. No concrete provider, no HTTP, no caching here.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use chd_schemas::{AssetId, Currency, PriceSnapshot};

// ---------------------------------------------------------------------------
// Fetch request / result
// ---------------------------------------------------------------------------

/// One batched quote request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Distinct asset ids to resolve. Order is not significant.
    pub assets: Vec<AssetId>,
    /// Target quote currency for threshold comparison and valuation.
    pub currency: Currency,
}

/// Outcome of a batched fetch: the snapshots that resolved plus the ids
/// that did not (unknown, delisted, or malformed in the response).
#[derive(Debug, Clone, Default)]
pub struct QuoteBatch {
    pub snapshots: Vec<PriceSnapshot>,
    pub failed: Vec<AssetId>,
}

impl QuoteBatch {
    /// `true` when every requested id resolved.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors a [`PriceSource`] implementation may return for a whole call.
///
/// Per-id resolution failures are **not** errors — they come back in
/// [`QuoteBatch::failed`].
#[derive(Debug, Clone)]
pub enum SourceError {
    /// Network / transport failure (timeout, refused, TLS, ...).
    Transport(String),
    /// The upstream API answered with a non-success status.
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The provider asked us to back off. Callers must extend their next
    /// poll delay instead of retrying immediately.
    RateLimited { retry_after: Option<Duration> },
    /// The source was constructed with unusable parameters.
    Config(String),
}

impl SourceError {
    /// Whether an immediate bounded retry inside the adapter is appropriate.
    /// Rate limiting is explicitly not retryable — it is a backpressure
    /// signal for the scheduler.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "transport error: {msg}"),
            SourceError::Api { status, message } => {
                write!(f, "provider api error status={status}: {message}")
            }
            SourceError::Decode(msg) => write!(f, "decode error: {msg}"),
            SourceError::RateLimited { retry_after: Some(d) } => {
                write!(f, "rate limited, retry after {}s", d.as_secs())
            }
            SourceError::RateLimited { retry_after: None } => write!(f, "rate limited"),
            SourceError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// PriceSource trait
// ---------------------------------------------------------------------------

/// Upstream quote provider contract.
///
/// Object-safe so callers can hold an `Arc<dyn PriceSource>`; `Send + Sync`
/// so one source is shared between the scheduler task and request handlers.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Human-readable name identifying this source (e.g. `"coingecko"`).
    fn name(&self) -> &'static str;

    /// Resolve current prices for the requested ids.
    ///
    /// Implementations chunk to provider page sizes, bound retries, and
    /// tolerate unknown ids (reported via [`QuoteBatch::failed`]).
    async fn fetch_prices(&self, req: &FetchRequest) -> Result<QuoteBatch, SourceError>;

    /// Resolve a single asset; `Ok(None)` means the provider does not know
    /// the id. Used by validation paths before accepting user input.
    async fn fetch_single(
        &self,
        asset: &AssetId,
        currency: Currency,
    ) -> Result<Option<PriceSnapshot>, SourceError> {
        let req = FetchRequest {
            assets: vec![asset.clone()],
            currency,
        };
        let batch = self.fetch_prices(&req).await?;
        Ok(batch.snapshots.into_iter().find(|s| &s.asset == asset))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
