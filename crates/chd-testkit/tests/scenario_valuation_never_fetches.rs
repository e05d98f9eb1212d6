//! Scenario: Valuation Never Blocks On A Fetch
//!
//! # Invariant under test
//! Portfolio valuation is computed from cached snapshots only. Assets with
//! no fresh snapshot appear in `missing` — valued at nothing, not at zero —
//! and the provider is never called on the read path, no matter how stale
//! the cache is.

use std::sync::Arc;

use chrono::{Duration, Utc};

use chd_portfolio::value_holdings;
use chd_schemas::MICROS_PER_UNIT;
use chd_testkit::{asset, handles, snapshot, RecordingSink, ScriptedSource};

const M: i64 = MICROS_PER_UNIT;

#[tokio::test]
async fn missing_price_is_reported_and_no_fetch_happens() {
    let source = Arc::new(ScriptedSource::with_prices(&[
        ("btc-test", 60_000 * M),
        ("eth-test", 2_500 * M),
    ]));
    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), sink);
    let now = Utc::now();

    h.portfolio.add(7, asset("btc-test"), M / 2).unwrap();
    h.portfolio.add(7, asset("eth-test"), 4 * M).unwrap();

    // Only btc is cached.
    h.cache.put(snapshot("btc-test", 60_000 * M, now));

    let valuation = value_holdings(7, &h.portfolio.holdings(7), &h.cache, now);

    assert_eq!(valuation.lines.len(), 1);
    assert_eq!(valuation.total_micros, 30_000 * M);
    assert_eq!(valuation.missing, vec![asset("eth-test")]);
    assert_eq!(source.calls(), 0, "valuation must never call the provider");
}

#[tokio::test]
async fn fully_stale_cache_values_nothing_but_still_does_not_fetch() {
    let source = Arc::new(ScriptedSource::with_prices(&[("btc-test", 60_000 * M)]));
    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), sink);
    let now = Utc::now();

    h.portfolio.add(7, asset("btc-test"), M).unwrap();
    // Cached long ago — expired relative to `now`.
    h.cache
        .put(snapshot("btc-test", 60_000 * M, now - Duration::seconds(120)));

    let valuation = value_holdings(7, &h.portfolio.holdings(7), &h.cache, now);

    assert!(valuation.lines.is_empty());
    assert_eq!(valuation.total_micros, 0);
    assert_eq!(valuation.missing, vec![asset("btc-test")]);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn valuation_updates_after_a_tick_refreshes_the_cache() {
    let source = Arc::new(ScriptedSource::with_prices(&[("btc-test", 61_000 * M)]));
    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), sink);
    let now = Utc::now();

    h.portfolio.add(7, asset("btc-test"), M).unwrap();

    let before = value_holdings(7, &h.portfolio.holdings(7), &h.cache, now);
    assert_eq!(before.missing.len(), 1);

    chd_engine::run_tick(&h, 1, now).await;

    let after = value_holdings(7, &h.portfolio.holdings(7), &h.cache, Utc::now());
    assert!(after.missing.is_empty());
    assert_eq!(after.total_micros, 61_000 * M);
}
