//! chd-schemas
//!
//! Shared data model for the CoinHerald engine:
//! - `AssetId` — case-normalized provider asset identifier
//! - `PriceSnapshot` — immutable point-in-time price record
//! - `AlertRule` — one-shot threshold alert with an explicit state machine
//! - `LedgerEntry` — append-only balance event with an idempotency key
//! - `AlertNotification` — payload handed to the notification boundary
//!
//! All prices, quantities and cash amounts are `i64` integer micros
//! (1 unit = 1_000_000 micros). `f64` exists only at wire boundaries via
//! the checked conversions in [`price`].

mod alert;
mod asset;
mod entry;
mod snapshot;

pub mod price;

pub use alert::{AlertNotification, AlertRule, AlertState, Direction};
pub use asset::{AssetId, Currency, InvalidAssetId};
pub use entry::{EntryKind, LedgerEntry};
pub use price::{micros_to_price, price_to_micros, PricingError, MICROS_PER_UNIT};
pub use snapshot::PriceSnapshot;

/// Numeric user identifier, as issued by the conversational front-end.
pub type UserId = i64;
