//! CoinGecko-style `simple/price` provider.
//!
//! Request shape: `GET {base}/simple/price?ids=a,b&vs_currencies=usd,eur,rub
//! &include_24hr_change=true`. The response maps asset id → currency → value,
//! with `"{cur}_24h_change"` carrying the 24h percentage when available.
//!
//! Behavior at this boundary:
//! - requests are chunked to [`GeckoSource::page_size`] ids;
//! - transport and 5xx failures get a bounded retry with exponential
//!   backoff, then that chunk's ids land in [`QuoteBatch::failed`];
//! - HTTP 429 aborts the whole call with [`SourceError::RateLimited`]
//!   (honoring `Retry-After`) so the scheduler can back off;
//! - ids absent from the response body, or carrying null/negative/
//!   non-representable values, land in `failed` — never priced as zero.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use chd_schemas::{price_to_micros, AssetId, Currency, PriceSnapshot};

use crate::provider::{FetchRequest, PriceSource, QuoteBatch, SourceError};

/// All quote currencies requested from the provider; the engine compares in
/// one of them but the front-end renders the rest.
const VS_CURRENCIES: &str = "usd,eur,rub";

/// Default ids per request; public CoinGecko handles 50 comfortably.
const DEFAULT_PAGE_SIZE: usize = 50;

/// Default total attempts per chunk (first try + one retry).
const DEFAULT_ATTEMPTS: u32 = 2;

/// Default first-retry backoff; doubles per attempt.
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// GeckoSource
// ---------------------------------------------------------------------------

pub struct GeckoSource {
    http: reqwest::Client,
    base_url: String,
    page_size: usize,
    attempts: u32,
    backoff_base: Duration,
}

impl GeckoSource {
    /// Build a source against `base_url` (no trailing slash) with a
    /// per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            attempts: DEFAULT_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// One HTTP round-trip for a chunk of ids. No retries here. The payload
    /// carries every supported currency, so no per-currency requests.
    async fn request_chunk(&self, ids: &[AssetId]) -> Result<RawPriceMap, SourceError> {
        let joined = ids
            .iter()
            .map(AssetId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/price", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("ids", joined.as_str()),
                ("vs_currencies", VS_CURRENCIES),
                ("include_24hr_change", "true"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SourceError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        resp.json::<RawPriceMap>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    /// Chunk round-trip with bounded retry on retryable failures.
    async fn request_chunk_with_retry(&self, ids: &[AssetId]) -> Result<RawPriceMap, SourceError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.request_chunk(ids).await {
                Ok(raw) => return Ok(raw),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let backoff = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Raw response body: asset id → field → value. The 24h-change fields may be
/// null for thinly traded assets, hence `Option<f64>`.
type RawPriceMap = HashMap<String, HashMap<String, Option<f64>>>;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}

/// Convert one response entry to a snapshot. `None` when the target currency
/// is missing, null, negative, or not representable in micros.
fn entry_to_snapshot(
    asset: &AssetId,
    fields: &HashMap<String, Option<f64>>,
    currency: Currency,
) -> Option<PriceSnapshot> {
    let price = (*fields.get(currency.as_str())?)?;
    if price < 0.0 {
        return None;
    }
    let price_micros = price_to_micros(price).ok()?;

    let change_key = format!("{}_24h_change", currency.as_str());
    let change_24h_bp = fields
        .get(&change_key)
        .copied()
        .flatten()
        .filter(|pct| pct.is_finite())
        .map(|pct| (pct * 100.0).round() as i64);

    Some(PriceSnapshot {
        asset: asset.clone(),
        price_micros,
        currency,
        change_24h_bp,
        fetched_at: Utc::now(),
    })
}

#[async_trait]
impl PriceSource for GeckoSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch_prices(&self, req: &FetchRequest) -> Result<QuoteBatch, SourceError> {
        let mut batch = QuoteBatch::default();

        for chunk in req.assets.chunks(self.page_size) {
            let raw = match self.request_chunk_with_retry(chunk).await {
                Ok(raw) => raw,
                // Backpressure: stop hammering the provider; the caller
                // decides how long to stay away.
                Err(err @ SourceError::RateLimited { .. }) => return Err(err),
                // Chunk-level failure after retries: these ids are
                // unresolved this round, other chunks still proceed.
                Err(_) => {
                    batch.failed.extend(chunk.iter().cloned());
                    continue;
                }
            };

            for asset in chunk {
                match raw
                    .get(asset.as_str())
                    .and_then(|fields| entry_to_snapshot(asset, fields, req.currency))
                {
                    Some(snapshot) => batch.snapshots.push(snapshot),
                    None => batch.failed.push(asset.clone()),
                }
            }
        }

        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// Tests (httpmock — no real network)
// ---------------------------------------------------------------------------
