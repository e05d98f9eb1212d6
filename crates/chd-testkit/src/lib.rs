//! chd-testkit
//!
//! In-process test doubles for the engine's two external boundaries, plus
//! small builders shared by the scenario tests:
//!
//! - [`ScriptedSource`] — a [`PriceSource`] backed by a mutable price map,
//!   with an optional queue of scripted call outcomes (rate limit,
//!   transport failure) and a call counter
//! - [`RecordingSink`] — a [`NotificationSink`] that captures every
//!   delivery and can be switched to fail
//! - [`handles`] — fresh engine wiring (empty stores, 60s-TTL cache)
//!
//! Everything here is pure in-process; no network, no sleeps.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chd_alerts::AlertStore;
use chd_cache::PriceCache;
use chd_engine::{EngineHandles, NotificationSink, SinkError};
use chd_md::{FetchRequest, PriceSource, QuoteBatch, SourceError};
use chd_portfolio::PortfolioStore;
use chd_schemas::{AlertNotification, AssetId, Currency, PriceSnapshot};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Shorthand for a normalized asset id in tests.
pub fn asset(s: &str) -> AssetId {
    AssetId::new(s).expect("test asset id")
}

/// A USD snapshot at `price_micros`, fetched at `fetched_at`.
pub fn snapshot(id: &str, price_micros: i64, fetched_at: DateTime<Utc>) -> PriceSnapshot {
    PriceSnapshot {
        asset: asset(id),
        price_micros,
        currency: Currency::Usd,
        change_24h_bp: None,
        fetched_at,
    }
}

/// Fresh engine wiring over empty stores and a 60s-TTL cache.
pub fn handles(source: Arc<ScriptedSource>, sink: Arc<RecordingSink>) -> EngineHandles {
    EngineHandles {
        source,
        cache: PriceCache::new(Duration::from_secs(60)),
        alerts: Arc::new(AlertStore::new()),
        portfolio: Arc::new(PortfolioStore::new()),
        sink,
        currency: Currency::Usd,
    }
}

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

enum ScriptedOutcome {
    RateLimited(Option<Duration>),
    TransportError,
}

/// Programmable price source.
///
/// Each `fetch_prices` call first consumes a scripted outcome if one is
/// queued; otherwise it resolves requested ids against the price map —
/// known ids become snapshots stamped `Utc::now()`, unknown ids land in
/// `failed`.
#[derive(Default)]
pub struct ScriptedSource {
    prices: Mutex<HashMap<AssetId, i64>>,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source pre-loaded with `(id, price_micros)` pairs.
    pub fn with_prices(prices: &[(&str, i64)]) -> Self {
        let source = Self::new();
        for (id, price_micros) in prices {
            source.set_price(id, *price_micros);
        }
        source
    }

    pub fn set_price(&self, id: &str, price_micros: i64) {
        self.prices
            .lock()
            .unwrap()
            .insert(asset(id), price_micros);
    }

    pub fn clear_price(&self, id: &str) {
        self.prices.lock().unwrap().remove(&asset(id));
    }

    /// Queue a rate-limit answer for the next call.
    pub fn push_rate_limited(&self, retry_after: Option<Duration>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::RateLimited(retry_after));
    }

    /// Queue a transport failure for the next call.
    pub fn push_transport_error(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::TransportError);
    }

    /// Number of `fetch_prices` calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_prices(&self, req: &FetchRequest) -> Result<QuoteBatch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return match outcome {
                ScriptedOutcome::RateLimited(retry_after) => {
                    Err(SourceError::RateLimited { retry_after })
                }
                ScriptedOutcome::TransportError => {
                    Err(SourceError::Transport("scripted failure".into()))
                }
            };
        }

        let prices = self.prices.lock().unwrap();
        let mut batch = QuoteBatch::default();
        for id in &req.assets {
            match prices.get(id) {
                Some(price_micros) => {
                    batch
                        .snapshots
                        .push(snapshot(id.as_str(), *price_micros, Utc::now()));
                }
                None => batch.failed.push(id.clone()),
            }
        }
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Captures every delivery; optionally fails them all (after recording, so
/// tests can still count attempts).
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<AlertNotification>>,
    fail_all: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    pub fn delivered(&self) -> Vec<AlertNotification> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, note: &AlertNotification) -> Result<(), SinkError> {
        self.delivered.lock().unwrap().push(note.clone());
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(SinkError::Status { code: 500 });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
