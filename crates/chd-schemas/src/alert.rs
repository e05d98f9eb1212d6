use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::AssetId;
use crate::UserId;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which side of the target price triggers the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" => Some(Direction::Above),
            "below" => Some(Direction::Below),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AlertState
// ---------------------------------------------------------------------------

/// Lifecycle state of an alert rule.
///
/// Legal transitions: `Active → Fired` (exactly once, by evaluation) and
/// `Active → Cancelled` (by the owning user). Both are terminal; a rule is
/// never reactivated — re-arming means creating a new rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Active,
    Fired,
    Cancelled,
}

impl AlertState {
    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fired | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// AlertRule
// ---------------------------------------------------------------------------

/// A one-shot threshold alert owned by a user.
///
/// Fired and cancelled rules are retained for history; only the store is
/// allowed to change `state` (compare-and-swap on `Active`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub user_id: UserId,
    pub asset: AssetId,
    pub direction: Direction,
    pub target_price_micros: i64,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    pub fn is_active(&self) -> bool {
        self.state == AlertState::Active
    }
}

// ---------------------------------------------------------------------------
// AlertNotification
// ---------------------------------------------------------------------------

/// Payload pushed to the notification boundary when a rule fires.
///
/// One notification per fired rule, ever. Delivery failure does not re-arm
/// the rule and does not produce a resend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub user_id: UserId,
    pub asset: AssetId,
    pub direction: Direction,
    pub target_price_micros: i64,
    pub actual_price_micros: i64,
    pub fired_at: DateTime<Utc>,
}
