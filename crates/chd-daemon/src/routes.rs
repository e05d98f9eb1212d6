//! Axum router and all HTTP handlers for chd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers, and the scenario tests in `tests/` drive the bare
//! router in-process without binding a socket.
//!
//! Error philosophy: user mistakes are 4xx with a JSON `{error}` body,
//! provider trouble is 502/503, and nothing a handler does can disturb the
//! scheduler task — they only share the stores' atomic operations.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use chd_alerts::CancelOutcome;
use chd_md::SourceError;
use chd_portfolio::{value_holdings, AppendOutcome, HoldingError, LedgerError};
use chd_schemas::{price_to_micros, EntryKind, LedgerEntry, UserId};

use crate::{
    aliases::resolve_asset,
    api_types::{
        BalanceResponse, CancelAlertRequest, CancelAlertResponse, CreateAlertRequest,
        CreditResponse, ErrorResponse, HealthResponse, HoldingResponse, LedgerCreditRequest,
        PortfolioAddRequest, PortfolioRemoveRequest, StatusResponse,
    },
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/alerts", post(create_alert))
        .route("/v1/alerts/:user_id", get(list_alerts))
        .route("/v1/alerts/:id/cancel", post(cancel_alert))
        .route("/v1/portfolio/add", post(portfolio_add))
        .route("/v1/portfolio/remove", post(portfolio_remove))
        .route("/v1/portfolio/:user_id", get(portfolio_valuation))
        .route("/v1/balance/:user_id", get(balance))
        .route("/v1/ledger/credit", post(ledger_credit))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error helpers
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

fn bad_request(msg: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, msg)
}

/// Map a provider failure on a validation path. Rate limiting is 503 (try
/// again later), anything else is 502 — the caller did nothing wrong.
fn source_error_response(err: SourceError) -> Response {
    match err {
        SourceError::RateLimited { .. } => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "provider rate limited")
        }
        other => error_response(StatusCode::BAD_GATEWAY, other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let scheduler = st.scheduler_status.read().await.clone();
    (
        StatusCode::OK,
        Json(StatusResponse {
            service: st.build.service,
            version: st.build.version,
            uptime_secs: uptime_secs(),
            scheduler,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/alerts
// ---------------------------------------------------------------------------

/// Create an alert rule.
///
/// The asset is validated against the provider before the rule is accepted;
/// the validation snapshot is put in the cache so the first tick does not
/// refetch it.
async fn create_alert(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateAlertRequest>,
) -> Response {
    let asset = match resolve_asset(&req.asset) {
        Ok(asset) => asset,
        Err(err) => return bad_request(err.to_string()),
    };
    let target_price_micros = match price_to_micros(req.target_price) {
        Ok(micros) => micros,
        Err(err) => return bad_request(format!("target_price: {err}")),
    };

    match st.source.fetch_single(&asset, st.cfg.currency).await {
        Ok(Some(snapshot)) => st.cache.put(snapshot),
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("asset '{asset}' not known to the provider"),
            )
        }
        Err(err) => return source_error_response(err),
    }

    match st
        .alerts
        .create(req.user_id, asset, req.direction, target_price_micros, Utc::now())
    {
        Ok(rule) => {
            info!(rule_id = %rule.id, user_id = rule.user_id, asset = %rule.asset, "alert created");
            (StatusCode::CREATED, Json(rule)).into_response()
        }
        Err(err) => bad_request(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/alerts/:user_id
// ---------------------------------------------------------------------------

async fn list_alerts(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(st.alerts.list_for_user(user_id)))
}

// ---------------------------------------------------------------------------
// POST /v1/alerts/:id/cancel
// ---------------------------------------------------------------------------

/// Cancel an active rule. Racing against a concurrent fire is expected:
/// whichever transition lands first wins, the loser is a clean no-op.
async fn cancel_alert(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelAlertRequest>,
) -> Response {
    match st.alerts.cancel(id, req.user_id) {
        CancelOutcome::Cancelled => {
            info!(rule_id = %id, user_id = req.user_id, "alert cancelled");
            (
                StatusCode::OK,
                Json(CancelAlertResponse { id, cancelled: true }),
            )
                .into_response()
        }
        CancelOutcome::AlreadyTransitioned => {
            error_response(StatusCode::CONFLICT, "alert already fired or cancelled")
        }
        CancelOutcome::NotFound => error_response(StatusCode::NOT_FOUND, "alert not found"),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/portfolio/add
// ---------------------------------------------------------------------------

async fn portfolio_add(
    State(st): State<Arc<AppState>>,
    Json(req): Json<PortfolioAddRequest>,
) -> Response {
    let asset = match resolve_asset(&req.asset) {
        Ok(asset) => asset,
        Err(err) => return bad_request(err.to_string()),
    };
    let qty_micros = match price_to_micros(req.qty) {
        Ok(micros) => micros,
        Err(err) => return bad_request(format!("qty: {err}")),
    };

    match st.source.fetch_single(&asset, st.cfg.currency).await {
        Ok(Some(snapshot)) => st.cache.put(snapshot),
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("asset '{asset}' not known to the provider"),
            )
        }
        Err(err) => return source_error_response(err),
    }

    match st.portfolio.add(req.user_id, asset.clone(), qty_micros) {
        Ok(total) => (
            StatusCode::OK,
            Json(HoldingResponse {
                user_id: req.user_id,
                asset: asset.to_string(),
                qty_micros: total,
            }),
        )
            .into_response(),
        Err(err) => bad_request(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/portfolio/remove
// ---------------------------------------------------------------------------

async fn portfolio_remove(
    State(st): State<Arc<AppState>>,
    Json(req): Json<PortfolioRemoveRequest>,
) -> Response {
    let asset = match resolve_asset(&req.asset) {
        Ok(asset) => asset,
        Err(err) => return bad_request(err.to_string()),
    };

    let remaining = match req.qty {
        // Partial removal: clamps at zero, refuses to go below.
        Some(qty) => {
            let qty_micros = match price_to_micros(qty) {
                Ok(micros) => micros,
                Err(err) => return bad_request(format!("qty: {err}")),
            };
            match st.portfolio.remove(req.user_id, &asset, qty_micros) {
                Ok(remaining) => remaining,
                Err(err @ HoldingError::Insufficient { .. }) => {
                    return error_response(StatusCode::CONFLICT, err.to_string())
                }
                Err(err) => return bad_request(err.to_string()),
            }
        }
        // No quantity given: drop the whole position (idempotent).
        None => {
            st.portfolio.remove_all(req.user_id, &asset);
            0
        }
    };

    (
        StatusCode::OK,
        Json(HoldingResponse {
            user_id: req.user_id,
            asset: asset.to_string(),
            qty_micros: remaining,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/portfolio/:user_id
// ---------------------------------------------------------------------------

/// On-demand valuation against the cache. Never fetches: assets without a
/// fresh snapshot are listed in `missing` until the scheduler refreshes them.
async fn portfolio_valuation(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    let holdings = st.portfolio.holdings(user_id);
    let valuation = value_holdings(user_id, &holdings, &st.cache, Utc::now());
    (StatusCode::OK, Json(valuation))
}

// ---------------------------------------------------------------------------
// GET /v1/balance/:user_id
// ---------------------------------------------------------------------------

async fn balance(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(BalanceResponse {
            user_id,
            balance_micros: st.ledger.balance(user_id),
            entry_count: st.ledger.entry_count(user_id),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/ledger/credit
// ---------------------------------------------------------------------------

/// Inbound balance event from the payment gateway.
///
/// Replays of the same `entry_id` return 200 with `duplicate: true` and do
/// not change the balance — the gateway retries webhooks, we must not
/// double-credit. An overdrawing debit is 409 and records nothing.
async fn ledger_credit(
    State(st): State<Arc<AppState>>,
    Json(req): Json<LedgerCreditRequest>,
) -> Response {
    if req.kind == EntryKind::Deposit
        && (req.amount_micros < st.cfg.deposit_min_micros
            || req.amount_micros > st.cfg.deposit_max_micros)
    {
        return bad_request(format!(
            "deposit amount {} outside accepted bounds [{}, {}]",
            req.amount_micros, st.cfg.deposit_min_micros, st.cfg.deposit_max_micros
        ));
    }

    let entry = LedgerEntry {
        id: req.entry_id.clone(),
        user_id: req.user_id,
        amount_micros: req.amount_micros,
        kind: req.kind,
        recorded_at: Utc::now(),
    };

    match st.ledger.append(entry) {
        Ok(AppendOutcome::Applied { balance_micros }) => {
            info!(
                entry_id = %req.entry_id,
                user_id = req.user_id,
                amount_micros = req.amount_micros,
                "ledger entry applied"
            );
            (
                StatusCode::OK,
                Json(CreditResponse {
                    entry_id: req.entry_id,
                    duplicate: false,
                    balance_micros,
                }),
            )
                .into_response()
        }
        Ok(AppendOutcome::Duplicate) => (
            StatusCode::OK,
            Json(CreditResponse {
                entry_id: req.entry_id,
                duplicate: true,
                balance_micros: st.ledger.balance(req.user_id),
            }),
        )
            .into_response(),
        Err(err @ LedgerError::InsufficientBalance { .. }) => {
            error_response(StatusCode::CONFLICT, err.to_string())
        }
        Err(err) => bad_request(err.to_string()),
    }
}
