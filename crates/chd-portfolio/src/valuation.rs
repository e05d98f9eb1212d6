//! Portfolio valuation: Σ(quantity × freshest cached price) per user.
//!
//! Valuation is derived, never stored, and never blocks on a live fetch —
//! assets without a fresh snapshot are listed in `missing` and excluded
//! from the total (a missing price is not a zero price).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use chd_cache::PriceCache;
use chd_schemas::{AssetId, UserId, MICROS_PER_UNIT};

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

/// value = qty × price, both in micros, result in micros of cash.
fn position_value_micros(qty_micros: i64, price_micros: i64) -> i64 {
    let product = (qty_micros as i128) * (price_micros as i128) / (MICROS_PER_UNIT as i128);
    i128_to_i64_clamp(product)
}

/// One valued position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationLine {
    pub asset: AssetId,
    pub qty_micros: i64,
    pub price_micros: i64,
    pub value_micros: i64,
    pub change_24h_bp: Option<i64>,
    pub priced_at: DateTime<Utc>,
}

/// Point-in-time valuation of one user's holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioValuation {
    pub user_id: UserId,
    pub lines: Vec<ValuationLine>,
    /// Held assets with no fresh snapshot this read — not valued, not zeroed.
    pub missing: Vec<AssetId>,
    pub total_micros: i64,
    pub valued_at: DateTime<Utc>,
}

/// Value `holdings` against the cache as of `now`.
///
/// Reads one consistent snapshot per asset; no cross-asset consistency is
/// promised (assets are independent). Accumulates in `i128`, clamps once.
pub fn value_holdings(
    user_id: UserId,
    holdings: &BTreeMap<AssetId, i64>,
    cache: &PriceCache,
    now: DateTime<Utc>,
) -> PortfolioValuation {
    let mut lines = Vec::new();
    let mut missing = Vec::new();
    let mut total: i128 = 0;

    for (asset, qty_micros) in holdings {
        match cache.get(asset, now) {
            Some(snap) => {
                let value_micros = position_value_micros(*qty_micros, snap.price_micros);
                total += value_micros as i128;
                lines.push(ValuationLine {
                    asset: asset.clone(),
                    qty_micros: *qty_micros,
                    price_micros: snap.price_micros,
                    value_micros,
                    change_24h_bp: snap.change_24h_bp,
                    priced_at: snap.fetched_at,
                });
            }
            None => missing.push(asset.clone()),
        }
    }

    PortfolioValuation {
        user_id,
        lines,
        missing,
        total_micros: i128_to_i64_clamp(total),
        valued_at: now,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
