//! chd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config, wires
//! the engine, spawns the scheduler, and starts the HTTP server. All route
//! handlers live in `routes.rs`; all shared state types live in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use chd_config::EngineConfig;
use chd_daemon::{routes, state};
use chd_engine::{NotificationSink, TracingSink, WebhookSink};
use chd_md::GeckoSource;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = EngineConfig::from_env().context("loading engine config")?;

    let source = Arc::new(
        GeckoSource::new(cfg.provider_base_url.clone(), cfg.fetch_timeout)
            .context("building price source")?
            .with_page_size(cfg.provider_page_size)
            .with_attempts(cfg.fetch_attempts)
            .with_backoff_base(cfg.backoff_base),
    );

    let sink: Arc<dyn NotificationSink> = match &cfg.notify_webhook_url {
        Some(url) => {
            info!(url, "notifications via webhook sink");
            Arc::new(WebhookSink::new(url.clone(), cfg.fetch_timeout).context("building sink")?)
        }
        None => {
            info!("no webhook configured; notifications go to the log");
            Arc::new(TracingSink)
        }
    };

    let addr = cfg.bind_addr;
    let (shared, scheduler) = state::AppState::wire(cfg, source, sink);

    // The tick loop runs for the life of the process; it owns no state and
    // is safe to kill with the process.
    let _scheduler_task = scheduler.spawn();

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("chd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins (the bot front-end runs beside us).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
