use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Kind of a balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Debit,
    Refund,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Debit => "debit",
            EntryKind::Refund => "refund",
        }
    }
}

/// One append-only ledger event.
///
/// `id` is the caller-supplied idempotency key (e.g. the payment gateway's
/// transaction id): replaying an id already in the log is a no-op. Amounts
/// are signed micros; deposits/refunds are positive, debits negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: UserId,
    pub amount_micros: i64,
    pub kind: EntryKind,
    pub recorded_at: DateTime<Utc>,
}
