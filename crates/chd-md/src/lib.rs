//! chd-md
//!
//! Market-data boundary: the engine's only network dependency.
//!
//! This crate owns the [`PriceSource`] trait and the concrete HTTP provider
//! ([`GeckoSource`]). It does **not** cache: callers fetch quote batches and
//! hand the snapshots to the price cache.
//!
//! Partial failure is a first-class outcome: a [`QuoteBatch`] carries the
//! snapshots that resolved *and* the ids that did not. A missing id is never
//! a zero price and never fails the rest of the batch.

pub mod gecko;
pub mod provider;

pub use gecko::GeckoSource;
pub use provider::{FetchRequest, PriceSource, QuoteBatch, SourceError};
