//! Scenario: Cancel / Fire Race Is Deterministic
//!
//! # Invariant under test
//! A user cancelling an alert mid-tick races with evaluation through the
//! rule's compare-and-swap. Both orderings are valid, the outcome is
//! decided entirely by transition order, and the losing side is a clean
//! no-op — never a partial state, never a notification for a cancelled
//! rule, never an un-cancellation of a fired one.

use std::sync::Arc;

use chrono::Utc;

use chd_alerts::CancelOutcome;
use chd_engine::run_tick;
use chd_schemas::{AlertState, Direction, MICROS_PER_UNIT};
use chd_testkit::{asset, handles, RecordingSink, ScriptedSource};

const M: i64 = MICROS_PER_UNIT;

// ---------------------------------------------------------------------------
// 1. Cancel lands first: the tick must not notify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_tick_means_no_notification() {
    let source = Arc::new(ScriptedSource::with_prices(&[("btc-test", 59_000 * M)]));
    let sink = Arc::new(RecordingSink::new());
    let h = handles(source, Arc::clone(&sink));
    let now = Utc::now();

    let rule = h
        .alerts
        .create(7, asset("btc-test"), Direction::Below, 60_000 * M, now)
        .unwrap();

    assert_eq!(h.alerts.cancel(rule.id, 7), CancelOutcome::Cancelled);

    let report = run_tick(&h, 1, now).await;
    assert_eq!(report.fired, 0);
    assert_eq!(sink.count(), 0);
    assert_eq!(h.alerts.get(rule.id).unwrap().state, AlertState::Cancelled);
}

// ---------------------------------------------------------------------------
// 2. Fire lands first: the late cancel is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fired_before_cancel_means_cancel_is_a_no_op() {
    let source = Arc::new(ScriptedSource::with_prices(&[("btc-test", 59_000 * M)]));
    let sink = Arc::new(RecordingSink::new());
    let h = handles(source, Arc::clone(&sink));
    let now = Utc::now();

    let rule = h
        .alerts
        .create(7, asset("btc-test"), Direction::Below, 60_000 * M, now)
        .unwrap();

    let report = run_tick(&h, 1, now).await;
    assert_eq!(report.fired, 1);

    assert_eq!(
        h.alerts.cancel(rule.id, 7),
        CancelOutcome::AlreadyTransitioned,
        "a fired rule cannot be cancelled"
    );
    assert_eq!(h.alerts.get(rule.id).unwrap().state, AlertState::Fired);
    assert_eq!(sink.count(), 1);
}

// ---------------------------------------------------------------------------
// 3. Race both ways under load: state is always terminal, exactly one side wins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn racing_cancel_and_tick_always_settle_terminal_and_consistent() {
    for round in 0..32 {
        let source = Arc::new(ScriptedSource::with_prices(&[("btc-test", 59_000 * M)]));
        let sink = Arc::new(RecordingSink::new());
        let h = handles(source, Arc::clone(&sink));
        let now = Utc::now();

        let rule = h
            .alerts
            .create(7, asset("btc-test"), Direction::Below, 60_000 * M, now)
            .unwrap();

        let alerts = Arc::clone(&h.alerts);
        let cancel_task = tokio::spawn(async move { alerts.cancel(rule.id, 7) });
        let tick_task = run_tick(&h, 1, now);

        let (cancel_outcome, report) = tokio::join!(cancel_task, tick_task);
        let cancel_outcome = cancel_outcome.unwrap();

        let final_state = h.alerts.get(rule.id).unwrap().state;
        assert!(final_state.is_terminal(), "round {round}: state must be terminal");

        match final_state {
            AlertState::Fired => {
                assert_eq!(cancel_outcome, CancelOutcome::AlreadyTransitioned);
                assert_eq!(report.fired, 1);
                assert_eq!(sink.count(), 1, "round {round}");
            }
            AlertState::Cancelled => {
                assert_eq!(cancel_outcome, CancelOutcome::Cancelled);
                assert_eq!(report.fired, 0);
                assert_eq!(sink.count(), 0, "round {round}");
            }
            AlertState::Active => unreachable!(),
        }
    }
}
