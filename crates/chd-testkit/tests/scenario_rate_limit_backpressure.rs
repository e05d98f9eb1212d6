//! Scenario: Rate Limit Is Backpressure, Not Retry
//!
//! # Invariant under test
//! A rate-limited provider response never triggers an immediate refetch.
//! The tick degrades to whatever is cached, reports the rate limit (with
//! the provider's requested delay) upward for the scheduler's backoff, and
//! the next healthy tick recovers normally. Rate limiting is invisible to
//! users — rules and valuations just run on slightly staler data.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use chd_engine::run_tick;
use chd_schemas::{Direction, MICROS_PER_UNIT};
use chd_testkit::{asset, handles, snapshot, RecordingSink, ScriptedSource};

const M: i64 = MICROS_PER_UNIT;

#[tokio::test]
async fn rate_limited_tick_degrades_to_cache_and_reports_upward() {
    let source = Arc::new(ScriptedSource::with_prices(&[("btc-test", 59_000 * M)]));
    source.push_rate_limited(Some(Duration::from_secs(45)));

    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), Arc::clone(&sink));
    let now = Utc::now();

    // One asset cached pre-tick, one that would need fetching.
    h.cache.put(snapshot("btc-test", 59_000 * M, now));
    h.alerts
        .create(7, asset("btc-test"), Direction::Below, 60_000 * M, now)
        .unwrap();
    h.alerts
        .create(7, asset("eth-test"), Direction::Above, 1_000 * M, now)
        .unwrap();

    let report = run_tick(&h, 1, now).await;

    assert!(report.rate_limited);
    assert_eq!(report.retry_after_ms, Some(45_000));
    assert_eq!(source.calls(), 1, "exactly one provider call, no retry");
    assert_eq!(report.fired, 1, "cached asset still evaluates");
    assert_eq!(report.skipped_no_price, 1, "uncached asset waits");
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn next_healthy_tick_recovers() {
    let source = Arc::new(ScriptedSource::with_prices(&[("eth-test", 2_000 * M)]));
    source.push_rate_limited(None);

    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), Arc::clone(&sink));
    let now = Utc::now();

    h.alerts
        .create(7, asset("eth-test"), Direction::Above, 1_500 * M, now)
        .unwrap();

    let report = run_tick(&h, 1, now).await;
    assert!(report.rate_limited);
    assert_eq!(report.fired, 0);

    let report = run_tick(&h, 2, Utc::now()).await;
    assert!(!report.rate_limited);
    assert_eq!(report.fired, 1);
    assert_eq!(sink.count(), 1);
}
