//! The recurring tick loop.
//!
//! # Timing rules
//! - Fixed period (`poll_interval`), driven by [`tokio::time::interval`]
//!   with [`MissedTickBehavior::Skip`]: when a tick's work overruns the
//!   period the next tick is skipped, never queued — no backlog can form.
//!   Each overrun is reported once (log + counter).
//! - Every tick runs under `tick_timeout`, so one hung provider call cannot
//!   delay the next scheduling decision. Aborting a tick mid-flight is safe:
//!   every mutation it performs (cache put, fire CAS) is an atomic
//!   single-key operation.
//! - A rate-limited fetch extends the *next* tick by a penalty that doubles
//!   per consecutive rate limit (honoring the provider's `Retry-After` as
//!   the base) up to `poll_interval × rate_limit_backoff_cap`, and resets
//!   after the first clean tick.
//!
//! The loop holds no user-facing state; everything observable lives in the
//! shared [`SchedulerStatus`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, warn};

use crate::tick::{run_tick, EngineHandles, TickReport};

// ---------------------------------------------------------------------------
// Config / status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Upper bound on one tick's fetch + evaluate work.
    pub tick_timeout: Duration,
    /// Rate-limit penalty ceiling, as a multiple of `poll_interval`.
    pub rate_limit_backoff_cap: u32,
}

impl SchedulerConfig {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            tick_timeout: poll_interval,
            rate_limit_backoff_cap: 8,
        }
    }

    pub fn with_tick_timeout(mut self, tick_timeout: Duration) -> Self {
        self.tick_timeout = tick_timeout;
        self
    }

    pub fn with_rate_limit_backoff_cap(mut self, cap: u32) -> Self {
        self.rate_limit_backoff_cap = cap;
        self
    }
}

/// Live scheduler counters, shared with the daemon's status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub ticks_completed: u64,
    pub ticks_overrun: u64,
    pub ticks_timed_out: u64,
    pub consecutive_rate_limits: u32,
    /// Extra delay applied before the next tick, 0 when healthy.
    pub current_penalty_ms: u64,
    pub last_tick: Option<TickReport>,
}

// ---------------------------------------------------------------------------
// Penalty policy
// ---------------------------------------------------------------------------

/// Compute the extra delay after the `consecutive`-th rate limit in a row
/// (1-based). Doubles per repeat, starting from the provider's `Retry-After`
/// when given, else one poll interval; capped at `poll_interval × cap`.
fn rate_limit_penalty(
    consecutive: u32,
    retry_after: Option<Duration>,
    poll_interval: Duration,
    cap: u32,
) -> Duration {
    let base = retry_after.unwrap_or(poll_interval);
    let doubled = base.saturating_mul(2u32.saturating_pow(consecutive.saturating_sub(1)));
    doubled.min(poll_interval.saturating_mul(cap.max(1)))
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    handles: EngineHandles,
    cfg: SchedulerConfig,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl Scheduler {
    pub fn new(handles: EngineHandles, cfg: SchedulerConfig) -> Self {
        Self {
            handles,
            cfg,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
        }
    }

    /// Shared status handle; clone before [`Scheduler::spawn`] consumes self.
    pub fn status_handle(&self) -> Arc<RwLock<SchedulerStatus>> {
        Arc::clone(&self.status)
    }

    /// Run the loop on the current runtime until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.cfg.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut seq: u64 = 0;
        let mut penalty = Duration::ZERO;

        loop {
            interval.tick().await;

            // Backpressure from the previous tick's rate limit: push this
            // tick past its nominal slot instead of hammering the provider.
            if !penalty.is_zero() {
                tokio::time::sleep(penalty).await;
            }

            seq += 1;
            let work_started = tokio::time::Instant::now();

            match tokio::time::timeout(
                self.cfg.tick_timeout,
                run_tick(&self.handles, seq, Utc::now()),
            )
            .await
            {
                Ok(report) => {
                    penalty = self.after_tick(&report).await;
                }
                Err(_) => {
                    error!(seq, timeout_ms = self.cfg.tick_timeout.as_millis() as u64,
                        "tick timed out; resuming on next tick");
                    let mut status = self.status.write().await;
                    status.ticks_timed_out += 1;
                }
            }

            if work_started.elapsed() > self.cfg.poll_interval {
                warn!(seq, "tick overrun; next tick will be skipped");
                let mut status = self.status.write().await;
                status.ticks_overrun += 1;
            }
        }
    }

    /// Record the report and derive the next penalty.
    async fn after_tick(&self, report: &TickReport) -> Duration {
        let mut status = self.status.write().await;
        status.ticks_completed += 1;

        let penalty = if report.rate_limited {
            status.consecutive_rate_limits += 1;
            rate_limit_penalty(
                status.consecutive_rate_limits,
                report.retry_after_ms.map(Duration::from_millis),
                self.cfg.poll_interval,
                self.cfg.rate_limit_backoff_cap,
            )
        } else {
            status.consecutive_rate_limits = 0;
            Duration::ZERO
        };

        status.current_penalty_ms = penalty.as_millis() as u64;
        status.last_tick = Some(report.clone());
        penalty
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
