//! chd-portfolio
//!
//! User-facing money state:
//! - [`BalanceLedger`] — append-only balance event log per user, idempotent
//!   on entry id, with an incremental balance projection that is always
//!   reconcilable against a full replay of the log
//! - [`PortfolioStore`] — holdings (asset, quantity) per user with
//!   merge-add / clamp-remove semantics
//! - valuation — Σ(quantity × freshest cached price), never fetching
//!
//! Each user's state lives under one sharded-map entry, so mutations are
//! atomic per user and a slow valuation read of one user never blocks
//! another user's append.

mod holdings;
mod ledger;
mod valuation;

pub use holdings::{HoldingError, PortfolioStore};
pub use ledger::{AppendOutcome, BalanceLedger, LedgerError};
pub use valuation::{value_holdings, PortfolioValuation, ValuationLine};
