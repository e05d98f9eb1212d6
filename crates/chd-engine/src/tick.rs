//! One scheduler tick: collect → fetch → evaluate.
//!
//! A tick is an explicit [`TickContext`] built from scratch each round and
//! summarized into a [`TickReport`] — there is no shared mutable tick state,
//! so ticks are independently testable and two overlapping ticks can only
//! interact through the stores' compare-and-swap transitions.
//!
//! Failure isolation: one asset's missing price, or one rule's failed
//! delivery, never aborts evaluation of the rest of the pass.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use chd_alerts::{rule_triggers, AlertStore, FireOutcome};
use chd_cache::PriceCache;
use chd_md::{FetchRequest, PriceSource, SourceError};
use chd_portfolio::PortfolioStore;
use chd_schemas::{AlertNotification, AssetId, Currency};

use crate::sink::NotificationSink;

// ---------------------------------------------------------------------------
// EngineHandles
// ---------------------------------------------------------------------------

/// Everything a tick touches. Cloning is cheap (Arc bumps) — the scheduler
/// task and the daemon's request handlers share the same underlying state.
#[derive(Clone)]
pub struct EngineHandles {
    pub source: Arc<dyn PriceSource>,
    pub cache: PriceCache,
    pub alerts: Arc<AlertStore>,
    pub portfolio: Arc<PortfolioStore>,
    pub sink: Arc<dyn NotificationSink>,
    pub currency: Currency,
}

// ---------------------------------------------------------------------------
// TickContext / TickReport
// ---------------------------------------------------------------------------

/// Working state of one tick, created at tick start and dropped at the end.
struct TickContext {
    seq: u64,
    started_at: DateTime<Utc>,
    assets: BTreeSet<AssetId>,
    cache_misses: Vec<AssetId>,
    fetched: usize,
    unresolved: Vec<AssetId>,
    fired: usize,
    skipped_no_price: usize,
    delivery_failures: usize,
    rate_limited: bool,
    retry_after_ms: Option<u64>,
}

/// Serializable tick summary, surfaced on the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub seq: u64,
    pub started_at: DateTime<Utc>,
    /// Distinct assets referenced by active alerts ∪ holdings.
    pub assets: usize,
    pub cache_misses: usize,
    /// Snapshots fetched and cached this tick.
    pub fetched: usize,
    /// Ids the provider could not resolve this tick (not cached, not zero).
    pub unresolved: Vec<AssetId>,
    pub fired: usize,
    /// Active rules skipped because no fresh price was available.
    pub skipped_no_price: usize,
    pub delivery_failures: usize,
    pub rate_limited: bool,
    pub retry_after_ms: Option<u64>,
}

impl TickContext {
    fn new(seq: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            seq,
            started_at,
            assets: BTreeSet::new(),
            cache_misses: Vec::new(),
            fetched: 0,
            unresolved: Vec::new(),
            fired: 0,
            skipped_no_price: 0,
            delivery_failures: 0,
            rate_limited: false,
            retry_after_ms: None,
        }
    }

    fn into_report(self) -> TickReport {
        TickReport {
            seq: self.seq,
            started_at: self.started_at,
            assets: self.assets.len(),
            cache_misses: self.cache_misses.len(),
            fetched: self.fetched,
            unresolved: self.unresolved,
            fired: self.fired,
            skipped_no_price: self.skipped_no_price,
            delivery_failures: self.delivery_failures,
            rate_limited: self.rate_limited,
            retry_after_ms: self.retry_after_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// run_tick
// ---------------------------------------------------------------------------

/// Execute one tick as of `now`.
///
/// Phases:
/// 1. **Collecting** — distinct assets from active alerts ∪ holdings.
/// 2. **Fetching** — one batched provider call for cache misses only.
///    Rate limiting aborts the fetch (the report tells the scheduler to
///    back off); any other fetch failure degrades to cached data.
/// 3. **Evaluating** — per active rule, compare against the freshest
///    cached snapshot; winners CAS to `Fired` and get one notification.
pub async fn run_tick(handles: &EngineHandles, seq: u64, now: DateTime<Utc>) -> TickReport {
    let mut ctx = TickContext::new(seq, now);

    // -- Collecting
    ctx.assets = handles.alerts.referenced_assets();
    ctx.assets.extend(handles.portfolio.referenced_assets());

    ctx.cache_misses = ctx
        .assets
        .iter()
        .filter(|a| handles.cache.get(a, now).is_none())
        .cloned()
        .collect();

    // -- Fetching (cache misses only, one batched call)
    if !ctx.cache_misses.is_empty() {
        let req = FetchRequest {
            assets: ctx.cache_misses.clone(),
            currency: handles.currency,
        };
        match handles.source.fetch_prices(&req).await {
            Ok(batch) => {
                ctx.fetched = batch.snapshots.len();
                for snapshot in batch.snapshots {
                    handles.cache.put(snapshot);
                }
                ctx.unresolved = batch.failed;
            }
            Err(SourceError::RateLimited { retry_after }) => {
                ctx.rate_limited = true;
                ctx.retry_after_ms = retry_after.map(|d| d.as_millis() as u64);
                ctx.unresolved = ctx.cache_misses.clone();
                warn!(seq, "provider rate limited; evaluating with cached data");
            }
            Err(err) => {
                ctx.unresolved = ctx.cache_misses.clone();
                warn!(seq, error = %err, "price fetch failed; evaluating with cached data");
            }
        }
    }

    // -- Evaluating
    let assets: Vec<AssetId> = ctx.assets.iter().cloned().collect();
    for asset in &assets {
        let rules = handles.alerts.list_active(asset);
        if rules.is_empty() {
            continue; // held-only asset, nothing to evaluate
        }

        let Some(snapshot) = handles.cache.get(asset, now) else {
            // No fresh price this tick — these rules wait for the next one.
            ctx.skipped_no_price += rules.len();
            continue;
        };

        for rule in rules {
            if !rule_triggers(&rule, snapshot.price_micros) {
                continue;
            }
            match handles.alerts.try_fire(rule.id, now) {
                FireOutcome::Fired(fired) => {
                    ctx.fired += 1;
                    let note = AlertNotification {
                        user_id: fired.user_id,
                        asset: fired.asset.clone(),
                        direction: fired.direction,
                        target_price_micros: fired.target_price_micros,
                        actual_price_micros: snapshot.price_micros,
                        fired_at: now,
                    };
                    // Fire-and-forget: the rule is already Fired; a failed
                    // delivery is the sink's problem, never a resend.
                    if let Err(err) = handles.sink.deliver(&note).await {
                        ctx.delivery_failures += 1;
                        warn!(rule_id = %fired.id, error = %err, "notification delivery failed");
                    }
                }
                // Lost the race to another tick or a cancellation — correct
                // either way, nothing to deliver.
                FireOutcome::AlreadyTransitioned | FireOutcome::NotFound => {}
            }
        }
    }

    debug!(
        seq,
        assets = ctx.assets.len(),
        fetched = ctx.fetched,
        fired = ctx.fired,
        "tick complete"
    );
    ctx.into_report()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
