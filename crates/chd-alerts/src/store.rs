//! Rule store with compare-and-swap lifecycle transitions.
//!
//! # Invariants
//! 1. **Legal transitions only.** `Active → Fired` and `Active → Cancelled`;
//!    both terminal. A transition attempt on a non-`Active` rule returns
//!    `AlreadyTransitioned` — a no-op, not an error — so overlapping
//!    evaluation ticks and a racing user cancellation serialize to exactly
//!    one winner.
//! 2. **Exactly one fire.** Only the caller that receives
//!    [`FireOutcome::Fired`] may emit the notification for that rule.
//! 3. **Retention.** Rules are never deleted; history stays queryable.
//!
//! Each transition runs under the rule's sharded-map entry, which makes the
//! check-then-set atomic per rule without a store-wide lock.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use chd_schemas::{AlertRule, AlertState, AssetId, Direction, UserId};

// ---------------------------------------------------------------------------
// Errors / outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    /// Target price must be strictly positive.
    NonPositiveTarget { target_price_micros: i64 },
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveTarget { target_price_micros } => {
                write!(f, "alert target must be > 0, got {target_price_micros}")
            }
        }
    }
}

impl std::error::Error for AlertError {}

/// Result of a fire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// This caller won the transition; the returned rule carries the
    /// `Fired` state and `fired_at`. Exactly one caller ever gets this.
    Fired(AlertRule),
    /// The rule had already fired or been cancelled — nothing to do.
    AlreadyTransitioned,
    NotFound,
}

/// Result of a cancel attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The rule had already fired or been cancelled — nothing to do.
    AlreadyTransitioned,
    /// Unknown id, or a rule owned by a different user.
    NotFound,
}

// ---------------------------------------------------------------------------
// AlertStore
// ---------------------------------------------------------------------------

/// Concurrent rule store. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct AlertStore {
    rules: DashMap<Uuid, AlertRule>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new `Active` rule, returning it.
    pub fn create(
        &self,
        user_id: UserId,
        asset: AssetId,
        direction: Direction,
        target_price_micros: i64,
        created_at: DateTime<Utc>,
    ) -> Result<AlertRule, AlertError> {
        if target_price_micros <= 0 {
            return Err(AlertError::NonPositiveTarget { target_price_micros });
        }
        let rule = AlertRule {
            id: Uuid::new_v4(),
            user_id,
            asset,
            direction,
            target_price_micros,
            state: AlertState::Active,
            created_at,
            fired_at: None,
        };
        self.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Insert a pre-built rule (restore/replay paths).
    pub fn insert(&self, rule: AlertRule) {
        self.rules.insert(rule.id, rule);
    }

    pub fn get(&self, id: Uuid) -> Option<AlertRule> {
        self.rules.get(&id).map(|r| r.value().clone())
    }

    /// Active rules watching `asset`.
    pub fn list_active(&self, asset: &AssetId) -> Vec<AlertRule> {
        self.rules
            .iter()
            .filter(|r| r.is_active() && &r.asset == asset)
            .map(|r| r.value().clone())
            .collect()
    }

    /// All of a user's rules, newest first — history included.
    pub fn list_for_user(&self, user_id: UserId) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self
            .rules
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rules
    }

    /// Distinct assets referenced by at least one active rule — the
    /// scheduler unions this with held assets to build its fetch set.
    pub fn referenced_assets(&self) -> BTreeSet<AssetId> {
        self.rules
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.asset.clone())
            .collect()
    }

    /// Compare-and-swap `Active → Fired`.
    ///
    /// The winning call gets the fired rule back; every other call — a
    /// second overlapping tick, a replay, anything after a cancellation —
    /// gets `AlreadyTransitioned`.
    pub fn try_fire(&self, id: Uuid, fired_at: DateTime<Utc>) -> FireOutcome {
        let Some(mut rule) = self.rules.get_mut(&id) else {
            return FireOutcome::NotFound;
        };
        if rule.state != AlertState::Active {
            return FireOutcome::AlreadyTransitioned;
        }
        rule.state = AlertState::Fired;
        rule.fired_at = Some(fired_at);
        FireOutcome::Fired(rule.clone())
    }

    /// Compare-and-swap `Active → Cancelled`, restricted to the owner.
    pub fn cancel(&self, id: Uuid, user_id: UserId) -> CancelOutcome {
        let Some(mut rule) = self.rules.get_mut(&id) else {
            return CancelOutcome::NotFound;
        };
        if rule.user_id != user_id {
            // Do not reveal other users' rule ids.
            return CancelOutcome::NotFound;
        }
        if rule.state != AlertState::Active {
            return CancelOutcome::AlreadyTransitioned;
        }
        rule.state = AlertState::Cancelled;
        CancelOutcome::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chd_schemas::MICROS_PER_UNIT;

    const M: i64 = MICROS_PER_UNIT;

    fn asset(s: &str) -> AssetId {
        AssetId::new(s).unwrap()
    }

    fn store_with_rule(direction: Direction, target_units: i64) -> (AlertStore, Uuid) {
        let store = AlertStore::new();
        let rule = store
            .create(7, asset("bitcoin"), direction, target_units * M, Utc::now())
            .unwrap();
        (store, rule.id)
    }

    // --- Creation ---

    #[test]
    fn create_stores_an_active_rule() {
        let (store, id) = store_with_rule(Direction::Above, 60_000);
        let rule = store.get(id).unwrap();
        assert_eq!(rule.state, AlertState::Active);
        assert!(rule.fired_at.is_none());
    }

    #[test]
    fn non_positive_target_is_rejected() {
        let store = AlertStore::new();
        let err = store
            .create(7, asset("bitcoin"), Direction::Above, 0, Utc::now())
            .unwrap_err();
        assert_eq!(err, AlertError::NonPositiveTarget { target_price_micros: 0 });
    }

    // --- Fire transition ---

    #[test]
    fn first_fire_wins_second_is_a_no_op() {
        let (store, id) = store_with_rule(Direction::Below, 60_000);
        let now = Utc::now();

        let first = store.try_fire(id, now);
        assert!(matches!(first, FireOutcome::Fired(_)));

        let second = store.try_fire(id, now);
        assert_eq!(second, FireOutcome::AlreadyTransitioned);

        let rule = store.get(id).unwrap();
        assert_eq!(rule.state, AlertState::Fired);
        assert_eq!(rule.fired_at, Some(now));
    }

    #[test]
    fn fired_rule_carries_fired_state_in_outcome() {
        let (store, id) = store_with_rule(Direction::Above, 100);
        let now = Utc::now();
        match store.try_fire(id, now) {
            FireOutcome::Fired(rule) => {
                assert_eq!(rule.state, AlertState::Fired);
                assert_eq!(rule.fired_at, Some(now));
            }
            other => panic!("expected Fired, got {other:?}"),
        }
    }

    #[test]
    fn fire_unknown_rule_is_not_found() {
        let store = AlertStore::new();
        assert_eq!(store.try_fire(Uuid::new_v4(), Utc::now()), FireOutcome::NotFound);
    }

    // --- Cancel transition ---

    #[test]
    fn cancel_active_rule_succeeds_once() {
        let (store, id) = store_with_rule(Direction::Above, 100);
        assert_eq!(store.cancel(id, 7), CancelOutcome::Cancelled);
        assert_eq!(store.cancel(id, 7), CancelOutcome::AlreadyTransitioned);
        assert_eq!(store.get(id).unwrap().state, AlertState::Cancelled);
    }

    #[test]
    fn cancel_by_non_owner_is_not_found() {
        let (store, id) = store_with_rule(Direction::Above, 100);
        assert_eq!(store.cancel(id, 999), CancelOutcome::NotFound);
        assert!(store.get(id).unwrap().is_active());
    }

    #[test]
    fn fire_after_cancel_is_a_no_op_and_vice_versa() {
        let (store, id) = store_with_rule(Direction::Above, 100);
        store.cancel(id, 7);
        assert_eq!(store.try_fire(id, Utc::now()), FireOutcome::AlreadyTransitioned);
        assert_eq!(store.get(id).unwrap().state, AlertState::Cancelled);

        let (store, id) = store_with_rule(Direction::Above, 100);
        store.try_fire(id, Utc::now());
        assert_eq!(store.cancel(id, 7), CancelOutcome::AlreadyTransitioned);
        assert_eq!(store.get(id).unwrap().state, AlertState::Fired);
    }

    // --- Listing / indexing ---

    #[test]
    fn list_active_filters_state_and_asset() {
        let store = AlertStore::new();
        let now = Utc::now();
        let a = store
            .create(7, asset("bitcoin"), Direction::Above, 100 * M, now)
            .unwrap();
        store
            .create(7, asset("ethereum"), Direction::Above, 100 * M, now)
            .unwrap();
        let c = store
            .create(8, asset("bitcoin"), Direction::Below, 50 * M, now)
            .unwrap();

        store.try_fire(a.id, now);

        let active = store.list_active(&asset("bitcoin"));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, c.id);
    }

    #[test]
    fn referenced_assets_ignores_terminal_rules() {
        let store = AlertStore::new();
        let now = Utc::now();
        let a = store
            .create(7, asset("bitcoin"), Direction::Above, 100 * M, now)
            .unwrap();
        store
            .create(7, asset("ethereum"), Direction::Below, 10 * M, now)
            .unwrap();
        store.try_fire(a.id, now);

        let assets = store.referenced_assets();
        assert_eq!(assets.len(), 1);
        assert!(assets.contains(&asset("ethereum")));
    }

    #[test]
    fn list_for_user_includes_history_newest_first() {
        let store = AlertStore::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);
        let old = store
            .create(7, asset("bitcoin"), Direction::Above, 100 * M, t0)
            .unwrap();
        let new = store
            .create(7, asset("ethereum"), Direction::Below, 10 * M, t1)
            .unwrap();
        store.try_fire(old.id, t1);

        let rules = store.list_for_user(7);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, new.id);
        assert_eq!(rules[1].state, AlertState::Fired);
    }
}
