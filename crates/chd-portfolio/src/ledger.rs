//! Append-only balance ledger.
//!
//! # Invariants
//! - The entry log is the source of truth; the per-user balance is an
//!   incrementally maintained projection and must always equal the signed
//!   sum of the log ([`BalanceLedger::verify_integrity`]).
//! - Entry ids are idempotency keys: an id already in a user's log makes
//!   `append` a reported no-op ([`AppendOutcome::Duplicate`]), so a payment
//!   webhook retried twice never double-credits.
//! - A debit that would drive the balance negative is rejected **before**
//!   anything is recorded; the log never contains an overdraw.
//! - Entries are never mutated or deleted.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;

use chd_schemas::{EntryKind, LedgerEntry, UserId};

// ---------------------------------------------------------------------------
// Errors / outcomes
// ---------------------------------------------------------------------------

/// All invariant violations `append` can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Entry id must be non-empty — it is the idempotency key.
    EmptyEntryId,
    /// Zero-amount entries are meaningless and rejected.
    ZeroAmount,
    /// Amount sign must match the kind: deposits/refunds positive, debits
    /// negative.
    KindAmountMismatch { kind: EntryKind, amount_micros: i64 },
    /// The debit would drive the balance below zero; nothing was recorded.
    InsufficientBalance { balance_micros: i64, debit_micros: i64 },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEntryId => write!(f, "ledger invariant: entry id must not be empty"),
            Self::ZeroAmount => write!(f, "ledger invariant: amount must be non-zero"),
            Self::KindAmountMismatch { kind, amount_micros } => write!(
                f,
                "ledger invariant: {} amount has wrong sign: {amount_micros}",
                kind.as_str()
            ),
            Self::InsufficientBalance {
                balance_micros,
                debit_micros,
            } => write!(
                f,
                "insufficient balance: have {balance_micros}, debit {debit_micros}"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Result of a successful `append` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was recorded; `balance_micros` is the post-append balance.
    Applied { balance_micros: i64 },
    /// The entry id was already in the log — idempotent no-op.
    Duplicate,
}

// ---------------------------------------------------------------------------
// BalanceLedger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct UserLedger {
    entries: Vec<LedgerEntry>,
    seen_ids: HashSet<String>,
    balance_micros: i64,
}

/// Concurrent per-user ledger store. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct BalanceLedger {
    users: DashMap<UserId, UserLedger>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a balance event.
    ///
    /// Validation happens before any mutation; on `Err` the log and
    /// projection are untouched. The whole read-check-write runs under the
    /// user's map entry, so concurrent appends for one user serialize and
    /// appends for different users do not contend.
    pub fn append(&self, entry: LedgerEntry) -> Result<AppendOutcome, LedgerError> {
        Self::validate(&entry)?;

        let mut user = self.users.entry(entry.user_id).or_default();

        if user.seen_ids.contains(&entry.id) {
            return Ok(AppendOutcome::Duplicate);
        }

        if entry.kind == EntryKind::Debit {
            let after = user.balance_micros.saturating_add(entry.amount_micros);
            if after < 0 {
                return Err(LedgerError::InsufficientBalance {
                    balance_micros: user.balance_micros,
                    debit_micros: entry.amount_micros,
                });
            }
        }

        user.balance_micros = user.balance_micros.saturating_add(entry.amount_micros);
        user.seen_ids.insert(entry.id.clone());
        user.entries.push(entry);

        Ok(AppendOutcome::Applied {
            balance_micros: user.balance_micros,
        })
    }

    /// Current balance projection; 0 for a user with no entries.
    pub fn balance(&self, user_id: UserId) -> i64 {
        self.users
            .get(&user_id)
            .map(|u| u.balance_micros)
            .unwrap_or(0)
    }

    /// Number of accepted entries for a user.
    pub fn entry_count(&self, user_id: UserId) -> usize {
        self.users.get(&user_id).map(|u| u.entries.len()).unwrap_or(0)
    }

    /// Cloned entry log for audit / history views.
    pub fn entries(&self, user_id: UserId) -> Vec<LedgerEntry> {
        self.users
            .get(&user_id)
            .map(|u| u.entries.clone())
            .unwrap_or_default()
    }

    /// Balance recomputed from the log — the ground truth.
    ///
    /// O(n) replay; for startup verification, audits and tests, not for the
    /// hot read path.
    pub fn replayed_balance(&self, user_id: UserId) -> i64 {
        self.users
            .get(&user_id)
            .map(|u| {
                u.entries
                    .iter()
                    .fold(0i64, |acc, e| acc.saturating_add(e.amount_micros))
            })
            .unwrap_or(0)
    }

    /// `true` when the incremental projection equals the replayed sum.
    pub fn verify_integrity(&self, user_id: UserId) -> bool {
        self.balance(user_id) == self.replayed_balance(user_id)
    }

    fn validate(entry: &LedgerEntry) -> Result<(), LedgerError> {
        if entry.id.trim().is_empty() {
            return Err(LedgerError::EmptyEntryId);
        }
        if entry.amount_micros == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let sign_ok = match entry.kind {
            EntryKind::Deposit | EntryKind::Refund => entry.amount_micros > 0,
            EntryKind::Debit => entry.amount_micros < 0,
        };
        if !sign_ok {
            return Err(LedgerError::KindAmountMismatch {
                kind: entry.kind,
                amount_micros: entry.amount_micros,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
