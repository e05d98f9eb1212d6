//! Holdings store: (user, asset) → quantity in micros.
//!
//! Quantity 0 is equivalent to absence — rows are dropped when a removal
//! reaches zero, and a user with no rows is dropped entirely, so
//! `referenced_assets` never reports dead symbols to the scheduler.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use dashmap::DashMap;

use chd_schemas::{AssetId, UserId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldingError {
    /// Add/remove quantities must be strictly positive.
    NonPositiveQty { qty_micros: i64 },
    /// Removal asked for more than is held; nothing was changed.
    Insufficient {
        held_micros: i64,
        requested_micros: i64,
    },
}

impl fmt::Display for HoldingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveQty { qty_micros } => {
                write!(f, "holding quantity must be > 0, got {qty_micros}")
            }
            Self::Insufficient {
                held_micros,
                requested_micros,
            } => write!(
                f,
                "insufficient holding: have {held_micros}, remove {requested_micros}"
            ),
        }
    }
}

impl std::error::Error for HoldingError {}

// ---------------------------------------------------------------------------
// PortfolioStore
// ---------------------------------------------------------------------------

/// Concurrent holdings store. One map entry per user, so edits are atomic
/// per user and independent across users.
#[derive(Default)]
pub struct PortfolioStore {
    users: DashMap<UserId, BTreeMap<AssetId, i64>>,
}

impl PortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge-add: repeated adds for the same (user, asset) accumulate.
    /// Returns the quantity held after the merge.
    pub fn add(
        &self,
        user_id: UserId,
        asset: AssetId,
        qty_micros: i64,
    ) -> Result<i64, HoldingError> {
        if qty_micros <= 0 {
            return Err(HoldingError::NonPositiveQty { qty_micros });
        }
        let mut user = self.users.entry(user_id).or_default();
        let slot = user.entry(asset).or_insert(0);
        *slot = slot.saturating_add(qty_micros);
        Ok(*slot)
    }

    /// Remove up to the held quantity; removal clamps at zero (a row that
    /// reaches zero is dropped) and fails without change when more is
    /// requested than held. Returns the quantity remaining.
    pub fn remove(
        &self,
        user_id: UserId,
        asset: &AssetId,
        qty_micros: i64,
    ) -> Result<i64, HoldingError> {
        if qty_micros <= 0 {
            return Err(HoldingError::NonPositiveQty { qty_micros });
        }

        let remaining;
        let user_empty_after;
        {
            let Some(mut user) = self.users.get_mut(&user_id) else {
                return Err(HoldingError::Insufficient {
                    held_micros: 0,
                    requested_micros: qty_micros,
                });
            };
            let held = user.get(asset).copied().unwrap_or(0);
            if held < qty_micros {
                return Err(HoldingError::Insufficient {
                    held_micros: held,
                    requested_micros: qty_micros,
                });
            }
            remaining = held - qty_micros;
            if remaining == 0 {
                user.remove(asset);
            } else {
                user.insert(asset.clone(), remaining);
            }
            user_empty_after = user.is_empty();
        }
        if user_empty_after {
            // re-check under the entry lock; a concurrent add wins
            self.users.remove_if(&user_id, |_, m| m.is_empty());
        }
        Ok(remaining)
    }

    /// Drop the whole position. Returns the quantity that was held.
    pub fn remove_all(&self, user_id: UserId, asset: &AssetId) -> i64 {
        let removed;
        let user_empty_after;
        {
            let Some(mut user) = self.users.get_mut(&user_id) else {
                return 0;
            };
            removed = user.remove(asset).unwrap_or(0);
            user_empty_after = user.is_empty();
        }
        if user_empty_after {
            self.users.remove_if(&user_id, |_, m| m.is_empty());
        }
        removed
    }

    /// Quantity held, 0 when absent.
    pub fn qty(&self, user_id: UserId, asset: &AssetId) -> i64 {
        self.users
            .get(&user_id)
            .and_then(|u| u.get(asset).copied())
            .unwrap_or(0)
    }

    /// Snapshot of one user's holdings (sorted by asset id).
    pub fn holdings(&self, user_id: UserId) -> BTreeMap<AssetId, i64> {
        self.users
            .get(&user_id)
            .map(|u| u.value().clone())
            .unwrap_or_default()
    }

    /// Every asset held by anyone — the scheduler unions this with alert
    /// assets to build its per-tick fetch set.
    pub fn referenced_assets(&self) -> BTreeSet<AssetId> {
        let mut out = BTreeSet::new();
        for user in self.users.iter() {
            out.extend(user.value().keys().cloned());
        }
        out
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

    #[test]
    fn add_merges_quantities() {
        let store = PortfolioStore::new();
        store.add(7, asset("bitcoin"), M / 2).unwrap();
        let total = store.add(7, asset("bitcoin"), M / 2).unwrap();
        assert_eq!(total, M);
        assert_eq!(store.qty(7, &asset("bitcoin")), M);
    }

    #[test]
    fn non_positive_add_is_rejected() {
        let store = PortfolioStore::new();
        assert!(store.add(7, asset("bitcoin"), 0).is_err());
        assert!(store.add(7, asset("bitcoin"), -1).is_err());
    }

    #[test]
    fn remove_partial_leaves_remainder() {
        let store = PortfolioStore::new();
        store.add(7, asset("bitcoin"), 3 * M).unwrap();
        let remaining = store.remove(7, &asset("bitcoin"), M).unwrap();
        assert_eq!(remaining, 2 * M);
    }

    #[test]
    fn remove_to_zero_drops_the_row() {
        let store = PortfolioStore::new();
        store.add(7, asset("bitcoin"), M).unwrap();
        let remaining = store.remove(7, &asset("bitcoin"), M).unwrap();
        assert_eq!(remaining, 0);
        assert!(store.holdings(7).is_empty());
        assert!(store.referenced_assets().is_empty());
    }

    #[test]
    fn remove_more_than_held_fails_without_change() {
        let store = PortfolioStore::new();
        store.add(7, asset("bitcoin"), M).unwrap();
        let err = store.remove(7, &asset("bitcoin"), 2 * M).unwrap_err();
        assert_eq!(
            err,
            HoldingError::Insufficient {
                held_micros: M,
                requested_micros: 2 * M,
            }
        );
        assert_eq!(store.qty(7, &asset("bitcoin")), M);
    }

    #[test]
    fn remove_from_unknown_user_is_insufficient() {
        let store = PortfolioStore::new();
        assert!(store.remove(99, &asset("bitcoin"), M).is_err());
    }

    #[test]
    fn remove_all_returns_held_quantity() {
        let store = PortfolioStore::new();
        store.add(7, asset("bitcoin"), 5 * M).unwrap();
        assert_eq!(store.remove_all(7, &asset("bitcoin")), 5 * M);
        assert_eq!(store.remove_all(7, &asset("bitcoin")), 0);
    }

    #[test]
    fn referenced_assets_unions_across_users() {
        let store = PortfolioStore::new();
        store.add(7, asset("bitcoin"), M).unwrap();
        store.add(8, asset("ethereum"), M).unwrap();
        store.add(8, asset("bitcoin"), M).unwrap();

        let assets = store.referenced_assets();
        assert_eq!(assets.len(), 2);
        assert!(assets.contains(&asset("bitcoin")));
        assert!(assets.contains(&asset("ethereum")));
    }

    #[test]
    fn holdings_snapshot_is_sorted_and_detached() {
        let store = PortfolioStore::new();
        store.add(7, asset("ethereum"), M).unwrap();
        store.add(7, asset("bitcoin"), M).unwrap();

        let snap = store.holdings(7);
        let keys: Vec<&str> = snap.keys().map(|a| a.as_str()).collect();
        assert_eq!(keys, vec!["bitcoin", "ethereum"]);

        // mutating the store afterwards does not affect the snapshot
        store.remove_all(7, &asset("bitcoin"));
        assert_eq!(snap.len(), 2);
    }
}
