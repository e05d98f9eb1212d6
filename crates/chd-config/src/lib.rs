//! chd-config
//!
//! Typed engine configuration: defaults, `CHD_*` environment overrides, and
//! validation. Every knob the scheduler, cache, market-data adapter and
//! daemon read comes from here — no crate reads `std::env` on its own.
//!
//! Environment lookup is injected ([`EngineConfig::from_lookup`]) so tests
//! never mutate process-global env vars; [`EngineConfig::from_env`] is the
//! production entry point.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use chd_schemas::Currency;

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub const ENV_POLL_INTERVAL_SECS: &str = "CHD_POLL_INTERVAL_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "CHD_CACHE_TTL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "CHD_FETCH_TIMEOUT_SECS";
pub const ENV_PROVIDER_BASE_URL: &str = "CHD_PROVIDER_BASE_URL";
pub const ENV_PROVIDER_PAGE_SIZE: &str = "CHD_PROVIDER_PAGE_SIZE";
pub const ENV_FETCH_ATTEMPTS: &str = "CHD_FETCH_ATTEMPTS";
pub const ENV_BACKOFF_BASE_MS: &str = "CHD_BACKOFF_BASE_MS";
pub const ENV_RATE_LIMIT_BACKOFF_CAP: &str = "CHD_RATE_LIMIT_BACKOFF_CAP";
pub const ENV_CURRENCY: &str = "CHD_CURRENCY";
pub const ENV_BIND_ADDR: &str = "CHD_BIND_ADDR";
pub const ENV_NOTIFY_WEBHOOK_URL: &str = "CHD_NOTIFY_WEBHOOK_URL";
pub const ENV_DEPOSIT_MIN_MICROS: &str = "CHD_DEPOSIT_MIN_MICROS";
pub const ENV_DEPOSIT_MAX_MICROS: &str = "CHD_DEPOSIT_MAX_MICROS";

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Complete engine configuration.
///
/// Durations are stored as `Duration`; serialization (for the status
/// endpoint) reports the second/millisecond scalars instead.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    /// Scheduler tick period. A tick that overruns this causes the next
    /// tick to be skipped, never queued.
    #[serde(serialize_with = "as_secs")]
    pub poll_interval: Duration,
    /// Price cache TTL measured from `fetched_at`; expiry is lazy on read.
    #[serde(serialize_with = "as_secs")]
    pub cache_ttl: Duration,
    /// Per-request timeout toward the market-data provider.
    #[serde(serialize_with = "as_secs")]
    pub fetch_timeout: Duration,
    /// Provider base URL, no trailing slash.
    pub provider_base_url: String,
    /// Max asset ids per provider request; larger sets are chunked.
    pub provider_page_size: usize,
    /// Total attempts per provider chunk (first try + retries).
    pub fetch_attempts: u32,
    /// First retry backoff; doubles per subsequent attempt.
    #[serde(serialize_with = "as_millis")]
    pub backoff_base: Duration,
    /// Upper bound on the rate-limit penalty, as a multiple of
    /// `poll_interval`.
    pub rate_limit_backoff_cap: u32,
    /// Valuation / alert-comparison currency.
    pub currency: Currency,
    /// HTTP bind address for the daemon.
    pub bind_addr: SocketAddr,
    /// Front-end webhook receiving fired-alert notifications. `None` routes
    /// notifications to the log sink.
    pub notify_webhook_url: Option<String>,
    /// Inclusive bounds accepted on inbound deposit credits, in micros.
    pub deposit_min_micros: i64,
    pub deposit_max_micros: i64,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            provider_base_url: "https://api.coingecko.com/api/v3".to_string(),
            provider_page_size: 50,
            fetch_attempts: 2,
            backoff_base: Duration::from_millis(500),
            rate_limit_backoff_cap: 8,
            currency: Currency::Usd,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            notify_webhook_url: None,
            deposit_min_micros: 1_000 * chd_schemas::MICROS_PER_UNIT,
            deposit_max_micros: 10_000_000 * chd_schemas::MICROS_PER_UNIT,
        }
    }
}

impl EngineConfig {
    /// Build from process environment variables over defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup function over defaults.
    ///
    /// Unset keys keep their default; present-but-malformed values are hard
    /// errors, never silently ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(secs) = parse_opt::<u64>(&lookup, ENV_POLL_INTERVAL_SECS)? {
            cfg.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_opt::<u64>(&lookup, ENV_CACHE_TTL_SECS)? {
            cfg.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_opt::<u64>(&lookup, ENV_FETCH_TIMEOUT_SECS)? {
            cfg.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = lookup(ENV_PROVIDER_BASE_URL) {
            cfg.provider_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(n) = parse_opt::<usize>(&lookup, ENV_PROVIDER_PAGE_SIZE)? {
            cfg.provider_page_size = n;
        }
        if let Some(n) = parse_opt::<u32>(&lookup, ENV_FETCH_ATTEMPTS)? {
            cfg.fetch_attempts = n;
        }
        if let Some(ms) = parse_opt::<u64>(&lookup, ENV_BACKOFF_BASE_MS)? {
            cfg.backoff_base = Duration::from_millis(ms);
        }
        if let Some(n) = parse_opt::<u32>(&lookup, ENV_RATE_LIMIT_BACKOFF_CAP)? {
            cfg.rate_limit_backoff_cap = n;
        }
        if let Some(raw) = lookup(ENV_CURRENCY) {
            cfg.currency = Currency::parse(&raw)
                .with_context(|| format!("{ENV_CURRENCY}: unknown currency '{raw}'"))?;
        }
        if let Some(raw) = lookup(ENV_BIND_ADDR) {
            cfg.bind_addr = raw
                .parse()
                .with_context(|| format!("{ENV_BIND_ADDR}: invalid socket address '{raw}'"))?;
        }
        if let Some(url) = lookup(ENV_NOTIFY_WEBHOOK_URL) {
            let url = url.trim().to_string();
            if !url.is_empty() {
                cfg.notify_webhook_url = Some(url);
            }
        }
        if let Some(v) = parse_opt::<i64>(&lookup, ENV_DEPOSIT_MIN_MICROS)? {
            cfg.deposit_min_micros = v;
        }
        if let Some(v) = parse_opt::<i64>(&lookup, ENV_DEPOSIT_MAX_MICROS)? {
            cfg.deposit_max_micros = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be > 0");
        }
        if self.cache_ttl.is_zero() {
            bail!("cache_ttl must be > 0");
        }
        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be > 0");
        }
        if self.provider_base_url.trim().is_empty() {
            bail!("provider_base_url must not be empty");
        }
        if self.provider_page_size == 0 {
            bail!("provider_page_size must be > 0");
        }
        if self.fetch_attempts == 0 {
            bail!("fetch_attempts must be > 0");
        }
        if self.deposit_min_micros <= 0 || self.deposit_max_micros < self.deposit_min_micros {
            bail!(
                "deposit bounds invalid: min {} max {}",
                self.deposit_min_micros,
                self.deposit_max_micros
            );
        }
        Ok(())
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key}: cannot parse '{raw}'")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
