//! chd-alerts
//!
//! Alert rules and their evaluation:
//! - [`AlertStore`] — rules keyed by id, with compare-and-swap lifecycle
//!   transitions (`Active → Fired`, `Active → Cancelled`); the losing side
//!   of any race is a no-op outcome, never a partial state
//! - [`eval`] — pure threshold comparison, boundary inclusive
//!
//! Fired and cancelled rules are retained for history. Re-arming a fired
//! rule is not a thing — users create a new rule.

pub mod eval;
mod store;

pub use eval::{rule_triggers, should_fire};
pub use store::{AlertError, AlertStore, CancelOutcome, FireOutcome};
