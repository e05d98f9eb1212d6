//! Scenario: Partial Provider Batch Is Isolated
//!
//! # Invariant under test
//! When the provider resolves only part of a batch (8 of 10 ids), the two
//! missing ids are neither cached as price zero nor allowed to disturb the
//! other eight: their rules are skipped for the tick, everyone else's
//! rules evaluate normally, and the unresolved ids are refetched next tick.

use std::sync::Arc;

use chrono::Utc;

use chd_engine::run_tick;
use chd_schemas::{Direction, MICROS_PER_UNIT};
use chd_testkit::{asset, handles, RecordingSink, ScriptedSource};

const M: i64 = MICROS_PER_UNIT;

#[tokio::test]
async fn eight_of_ten_ids_resolve_and_evaluate() {
    let source = Arc::new(ScriptedSource::new());
    for i in 0..8 {
        source.set_price(&format!("coin{i}"), 100 * M);
    }
    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), Arc::clone(&sink));
    let now = Utc::now();

    // Ten alerts, all would trigger at 100; two assets are unknown upstream.
    for i in 0..8 {
        h.alerts
            .create(7, asset(&format!("coin{i}")), Direction::Above, 50 * M, now)
            .unwrap();
    }
    h.alerts
        .create(7, asset("ghost-a"), Direction::Above, 50 * M, now)
        .unwrap();
    h.alerts
        .create(8, asset("ghost-b"), Direction::Below, 50 * M, now)
        .unwrap();

    let report = run_tick(&h, 1, now).await;

    assert_eq!(report.assets, 10);
    assert_eq!(report.fetched, 8);
    assert_eq!(report.unresolved.len(), 2);
    assert_eq!(report.fired, 8, "resolved assets' alerts all evaluated");
    assert_eq!(report.skipped_no_price, 2, "unresolved assets' rules skipped");
    assert_eq!(sink.count(), 8);

    // Missing ids were never cached — a zero price would have fired ghost-b.
    assert!(h.cache.get(&asset("ghost-a"), now).is_none());
    assert!(h.cache.get(&asset("ghost-b"), now).is_none());
}

#[tokio::test]
async fn unresolved_ids_recover_on_a_later_tick() {
    let source = Arc::new(ScriptedSource::with_prices(&[("solid", 100 * M)]));
    let sink = Arc::new(RecordingSink::new());
    let h = handles(Arc::clone(&source), Arc::clone(&sink));
    let now = Utc::now();

    h.alerts
        .create(7, asset("solid"), Direction::Above, 50 * M, now)
        .unwrap();
    h.alerts
        .create(7, asset("flaky"), Direction::Above, 50 * M, now)
        .unwrap();

    let report = run_tick(&h, 1, now).await;
    assert_eq!(report.fired, 1);
    assert_eq!(report.skipped_no_price, 1);

    // The asset starts resolving (listing went live, typo fixed upstream...).
    source.set_price("flaky", 60 * M);

    let report = run_tick(&h, 2, Utc::now()).await;
    assert_eq!(report.fired, 1, "recovered asset's alert fires");
    assert_eq!(report.skipped_no_price, 0);
    assert_eq!(sink.count(), 2);
}
