//! Request / response DTOs for the daemon's HTTP surface.
//!
//! Prices and quantities arrive as JSON numbers (units) and are converted
//! to micros exactly once, at this boundary. Responses carry micros — the
//! front-end owns rendering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chd_engine::SchedulerStatus;
use chd_schemas::{Direction, EntryKind, UserId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub user_id: UserId,
    /// Provider id or ticker code (`"bitcoin"`, `"BTC"`).
    pub asset: String,
    pub direction: Direction,
    /// Target price in units of the engine currency.
    pub target_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct CancelAlertRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioAddRequest {
    pub user_id: UserId,
    pub asset: String,
    /// Quantity in whole units (e.g. 0.5 BTC).
    pub qty: f64,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRemoveRequest {
    pub user_id: UserId,
    pub asset: String,
    /// Omitted = drop the whole position.
    pub qty: Option<f64>,
}

/// Inbound ledger-credit event from the payment gateway.
///
/// `entry_id` is the gateway's idempotency key; replays must not
/// double-apply. Amounts are integer micros — gateways deal in integer
/// minor units, so no float conversion on this path.
#[derive(Debug, Deserialize)]
pub struct LedgerCreditRequest {
    pub entry_id: String,
    pub user_id: UserId,
    pub amount_micros: i64,
    pub kind: EntryKind,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub scheduler: SchedulerStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct CancelAlertResponse {
    pub id: Uuid,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct HoldingResponse {
    pub user_id: UserId,
    pub asset: String,
    pub qty_micros: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance_micros: i64,
    pub entry_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CreditResponse {
    pub entry_id: String,
    /// `true` when this entry id had already been applied (idempotent
    /// replay); the balance reflects the single original application.
    pub duplicate: bool,
    pub balance_micros: i64,
}
