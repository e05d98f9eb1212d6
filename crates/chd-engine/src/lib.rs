//! chd-engine
//!
//! The driving loop. On a fixed tick the scheduler collects every asset
//! referenced by an active alert or a holding, refreshes cache misses with
//! one batched provider call, evaluates alert rules against the updated
//! cache, fires winners exactly once, and pushes notifications to the sink.
//!
//! The scheduler owns no user-facing state — all effects go through the
//! alert store, the price cache and the notification sink — which makes it
//! restart-safe: a new process resumes polling with a cold cache, and the
//! stores' terminal `Fired` markers prevent re-notification.

pub mod scheduler;
pub mod sink;
pub mod tick;

pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStatus};
pub use sink::{NotificationSink, SinkError, TracingSink, WebhookSink};
pub use tick::{run_tick, EngineHandles, TickReport};
