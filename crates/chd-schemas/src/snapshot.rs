use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::{AssetId, Currency};

/// An immutable point-in-time price record for one asset.
///
/// Snapshots are created by the market-data adapter, superseded by newer
/// snapshots in the cache, and never mutated. Price is `i64` micros in
/// `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub asset: AssetId,
    pub price_micros: i64,
    pub currency: Currency,
    /// 24h change in basis points (1 bp = 0.01%), when the provider reports it.
    pub change_24h_bp: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Age of this snapshot relative to `now`. Zero for a future `fetched_at`
    /// (clock skew between provider responses is tolerated, never negative).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).max(Duration::zero())
    }

    /// Whether this snapshot has outlived `ttl` as of `now`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) >= ttl
    }
}
