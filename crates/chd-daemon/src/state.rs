//! Shared runtime state for chd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. All fields are shared
//! handles; this module owns nothing async itself.

use std::sync::Arc;

use tokio::sync::RwLock;

use chd_alerts::AlertStore;
use chd_cache::PriceCache;
use chd_config::EngineConfig;
use chd_engine::{
    EngineHandles, NotificationSink, Scheduler, SchedulerConfig, SchedulerStatus,
};
use chd_md::PriceSource;
use chd_portfolio::{BalanceLedger, PortfolioStore};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers. The scheduler
/// task operates on the same stores through its own [`EngineHandles`].
pub struct AppState {
    pub build: BuildInfo,
    pub cfg: EngineConfig,
    pub cache: PriceCache,
    pub alerts: Arc<AlertStore>,
    pub portfolio: Arc<PortfolioStore>,
    pub ledger: Arc<BalanceLedger>,
    pub source: Arc<dyn PriceSource>,
    pub scheduler_status: Arc<RwLock<SchedulerStatus>>,
}

impl AppState {
    /// Construct the shared state and the scheduler operating on it.
    ///
    /// The scheduler is returned unspawned so tests can drive ticks
    /// manually (or not at all) while exercising the HTTP surface.
    pub fn wire(
        cfg: EngineConfig,
        source: Arc<dyn PriceSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Arc<AppState>, Scheduler) {
        let cache = PriceCache::new(cfg.cache_ttl);
        let alerts = Arc::new(AlertStore::new());
        let portfolio = Arc::new(PortfolioStore::new());
        let ledger = Arc::new(BalanceLedger::new());

        let handles = EngineHandles {
            source: Arc::clone(&source),
            cache: cache.clone(),
            alerts: Arc::clone(&alerts),
            portfolio: Arc::clone(&portfolio),
            sink,
            currency: cfg.currency,
        };
        let scheduler = Scheduler::new(
            handles,
            SchedulerConfig::new(cfg.poll_interval)
                .with_tick_timeout(cfg.poll_interval)
                .with_rate_limit_backoff_cap(cfg.rate_limit_backoff_cap),
        );

        let state = Arc::new(AppState {
            build: BuildInfo {
                service: "chd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            scheduler_status: scheduler.status_handle(),
            cfg,
            cache,
            alerts,
            portfolio,
            ledger,
            source,
        });

        (state, scheduler)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
