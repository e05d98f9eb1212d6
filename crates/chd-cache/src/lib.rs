//! chd-cache
//!
//! Short-TTL in-memory price cache: asset id → latest [`PriceSnapshot`].
//!
//! # Concurrency
//! Entries are `Arc<PriceSnapshot>` values in a sharded map, so a write is
//! an atomic per-key pointer replace and readers are never blocked across
//! keys by the scheduler refreshing prices. Valuation reads one consistent
//! snapshot *per asset*, not a cross-asset consistent view — assets are
//! independent.
//!
//! # Expiry
//! TTL is measured from `fetched_at` and evaluated lazily on read: an
//! expired entry is treated as absent (and dropped), which makes the caller
//! refetch. There is no background sweeper; [`PriceCache::purge_expired`]
//! exists for callers that want hygiene between ticks.
//!
//! All read methods take `now` explicitly so cache behavior is testable
//! without sleeping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use chd_schemas::{AssetId, PriceSnapshot};

/// Cheap to clone (Arc bump); all clones share the same entries.
#[derive(Clone)]
pub struct PriceCache {
    entries: Arc<DashMap<AssetId, Arc<PriceSnapshot>>>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(60)),
        }
    }

    /// TTL applied to every entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace the snapshot for its asset.
    ///
    /// Last write wins; an older snapshot arriving late simply gets
    /// superseded on the next put. No read ever observes a partially
    /// written entry.
    pub fn put(&self, snapshot: PriceSnapshot) {
        self.entries
            .insert(snapshot.asset.clone(), Arc::new(snapshot));
    }

    /// Freshest snapshot for `asset`, or `None` when absent or expired
    /// as of `now`. Expired entries are removed on the way out.
    pub fn get(&self, asset: &AssetId, now: DateTime<Utc>) -> Option<Arc<PriceSnapshot>> {
        let snap = self.entries.get(asset)?.value().clone();
        if snap.is_expired(self.ttl, now) {
            // Only remove the exact snapshot we judged expired; a concurrent
            // put of a fresh one must not be evicted by this read.
            self.entries
                .remove_if(asset, |_, current| Arc::ptr_eq(current, &snap));
            return None;
        }
        Some(snap)
    }

    /// Batch lookup; only present-and-fresh assets appear in the result.
    pub fn get_batch(
        &self,
        assets: &[AssetId],
        now: DateTime<Utc>,
    ) -> HashMap<AssetId, Arc<PriceSnapshot>> {
        assets
            .iter()
            .filter_map(|id| self.get(id, now).map(|s| (id.clone(), s)))
            .collect()
    }

    /// Drop every entry already expired as of `now`. Optional hygiene;
    /// correctness never depends on it.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, snap| !snap.is_expired(self.ttl, now));
    }

    /// Number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
