// ============================================================================
// HTTP API — balance operations and bet history
// ============================================================================
//
// Routes:
//   GET  /health
//   GET  /balance/{address}?token=0x…
//   POST /balance/deposit
//   POST /balance/withdraw
//   POST /balance/bet
//   POST /balance/win
//   POST /bets/save
//
// Request/response bodies use camelCase keys (the shapes the game client
// consumes). Validation and business failures carry a precise reason;
// infrastructure failures return a generic message and are logged in full.
//
// ============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::{DEFAULT_TOKEN, NETWORK, VERSION};
use crate::engine::{Engine, Withdrawal};
use crate::error::BalanceError;
use crate::storage::{BetRecord, LedgerStore, Tier};
use crate::treasury::TreasuryGateway;

// ============================================================================
// APPLICATION STATE
// ============================================================================

pub struct AppState<S: LedgerStore, G: TreasuryGateway> {
    pub engine: Arc<Engine<S, G>>,
}

// Manual impl: derive(Clone) would demand S: Clone + G: Clone bounds on the
// struct itself.
impl<S: LedgerStore, G: TreasuryGateway> Clone for AppState<S, G> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn error_response(err: BalanceError) -> (StatusCode, Json<Value>) {
    match err {
        BalanceError::Validation(reason) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })))
        }
        BalanceError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Balance record not found" })),
        ),
        BalanceError::InsufficientFunds { .. } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Insufficient house balance" })),
        ),
        BalanceError::Transfer(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("Withdrawal failed: {}", e) })),
        ),
        BalanceError::Store(detail) => {
            // Full detail stays server-side; the caller gets a generic
            // service-unavailable message.
            error!(error = %detail, "Ledger store failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Database service unavailable" })),
            )
        }
    }
}

// ============================================================================
// HEALTH
// ============================================================================

/// GET /health
async fn health_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
) -> impl IntoResponse {
    let pending = state
        .engine
        .pending_reconciliations()
        .map(|v| v.len())
        .unwrap_or(0);

    Json(json!({
        "status": "healthy",
        "version": VERSION,
        "network": NETWORK,
        "defaultToken": DEFAULT_TOKEN,
        "pendingReconciliations": pending,
    }))
}

// ============================================================================
// BALANCE READ
// ============================================================================

#[derive(Deserialize)]
struct BalanceQuery {
    token: Option<String>,
}

/// GET /balance/{address}?token=0x…
async fn get_balance_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> (StatusCode, Json<Value>) {
    let Some(token) = query.token else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required query parameter: token" })),
        );
    };

    match state.engine.get_balance(&address, &token) {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(json!({
                "balance": record.amount,
                "updatedAt": record.updated_at.to_rfc3339(),
                "tier": record.tier.as_str(),
            })),
        ),
        // Absent row is an implicit zero balance, not an error.
        Ok(None) => (
            StatusCode::OK,
            Json(json!({
                "balance": 0.0,
                "updatedAt": Value::Null,
                "tier": Tier::Free.as_str(),
            })),
        ),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// DEPOSIT
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequest {
    user_address: Option<String>,
    amount: Option<f64>,
    tx_hash: Option<String>,
    token_address: Option<String>,
}

/// POST /balance/deposit
async fn deposit_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
    Json(req): Json<DepositRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(address), Some(amount), Some(tx_hash), Some(token)) =
        (req.user_address, req.amount, req.tx_hash, req.token_address)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields: userAddress, amount, txHash, tokenAddress"
            })),
        );
    };

    match state.engine.deposit(&address, &token, amount, &tx_hash) {
        Ok(new_balance) => (
            StatusCode::OK,
            Json(json!({ "success": true, "newBalance": new_balance })),
        ),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// WITHDRAW
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawRequest {
    user_address: Option<String>,
    amount: Option<f64>,
    token_address: Option<String>,
}

/// POST /balance/withdraw
async fn withdraw_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
    Json(req): Json<WithdrawRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(address), Some(amount), Some(token)) =
        (req.user_address, req.amount, req.token_address)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields: userAddress, amount, tokenAddress"
            })),
        );
    };

    match state.engine.withdraw(&address, &token, amount).await {
        Ok(Withdrawal::Complete {
            new_balance,
            tx_hash,
        }) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "txHash": tx_hash,
                "newBalance": new_balance,
            })),
        ),
        // Partial success: funds moved on-chain but the ledger was not
        // updated to match. Reported distinctly so support can align the
        // ledger by hand — this is NOT a plain error.
        Ok(Withdrawal::ReconciliationNeeded {
            tx_hash,
            intended_balance,
            detail,
        }) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "txHash": tx_hash,
                "intendedBalance": intended_balance,
                "warning": "Tokens sent but balance update failed. Please contact support.",
                "error": detail,
            })),
        ),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// BET
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BetRequest {
    user_address: Option<String>,
    bet_amount: Option<f64>,
    token_address: Option<String>,
    // Accepted for forward compatibility with the game client's payload;
    // resolution data arrives later via /bets/save.
    #[allow(dead_code)]
    multiplier: Option<f64>,
    #[allow(dead_code)]
    direction: Option<String>,
}

/// POST /balance/bet
async fn bet_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
    Json(req): Json<BetRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(address), Some(stake), Some(token)) =
        (req.user_address, req.bet_amount, req.token_address)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields: userAddress, betAmount, tokenAddress"
            })),
        );
    };

    match state.engine.bet(&address, &token, stake) {
        Ok(ticket) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "remainingBalance": ticket.remaining_balance,
                "betId": ticket.bet_id,
            })),
        ),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// WIN
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WinRequest {
    user_address: Option<String>,
    win_amount: Option<f64>,
    bet_id: Option<String>,
    token_address: Option<String>,
}

/// POST /balance/win
async fn win_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
    Json(req): Json<WinRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(address), Some(payout), Some(token)) =
        (req.user_address, req.win_amount, req.token_address)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required fields: userAddress, winAmount, tokenAddress"
            })),
        );
    };
    let bet_id = req.bet_id.unwrap_or_default();

    match state.engine.win(&address, &token, payout, &bet_id) {
        Ok(new_balance) => (
            StatusCode::OK,
            Json(json!({ "success": true, "newBalance": new_balance })),
        ),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// BET HISTORY
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveBetRequest {
    id: Option<String>,
    wallet_address: Option<String>,
    token_address: Option<String>,
    asset: Option<String>,
    direction: Option<String>,
    amount: Option<f64>,
    multiplier: Option<f64>,
    strike_price: Option<f64>,
    end_price: Option<f64>,
    payout: Option<f64>,
    won: Option<bool>,
    mode: Option<String>,
    network: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

/// POST /bets/save — idempotent upsert keyed by bet id.
async fn save_bet_handler<S: LedgerStore, G: TreasuryGateway>(
    State(state): State<AppState<S, G>>,
    Json(req): Json<SaveBetRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(id), Some(wallet_address)) = (req.id, req.wallet_address) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required fields" })),
        );
    };

    let record = BetRecord {
        id,
        wallet_address,
        token_address: req.token_address.unwrap_or_else(|| DEFAULT_TOKEN.to_string()),
        asset: req.asset.unwrap_or_else(|| "BTC".to_string()),
        direction: req.direction.unwrap_or_else(|| "UP".to_string()),
        amount: req.amount.unwrap_or(0.0),
        multiplier: req.multiplier.unwrap_or(1.9),
        strike_price: req.strike_price.unwrap_or(0.0),
        end_price: req.end_price.unwrap_or(0.0),
        payout: req.payout.unwrap_or(0.0),
        won: req.won.unwrap_or(false),
        mode: req.mode.unwrap_or_else(|| "classic".to_string()),
        network: req.network.unwrap_or_else(|| NETWORK.to_string()),
        resolved_at: req.resolved_at.unwrap_or_else(Utc::now),
    };

    match state.engine.save_bet(record) {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn build_router<S: LedgerStore, G: TreasuryGateway>(state: AppState<S, G>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler::<S, G>))
        .route("/balance/{address}", get(get_balance_handler::<S, G>))
        .route("/balance/deposit", post(deposit_handler::<S, G>))
        .route("/balance/withdraw", post(withdraw_handler::<S, G>))
        .route("/balance/bet", post(bet_handler::<S, G>))
        .route("/balance/win", post(win_handler::<S, G>))
        .route("/bets/save", post(save_bet_handler::<S, G>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
