use crate::api::rate_limit;
use crate::auth::{self, AuthError};
use crate::config::SecurityConfig;
use crate::engine::Ledger;
use crate::error::CoreError;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state. Mirrors `quanta::api::handlers::ApiState`'s
/// shape (`Arc<RwLock<Blockchain>>`), generalized to the `Ledger` facade.
/// The single lock is the process-wide serialization point spec §5 asks
/// for: mutating handlers take a write guard, read-only handlers a read
/// guard.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<RwLock<Ledger>>,
    pub security: Arc<SecurityConfig>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Admission(_) => StatusCode::BAD_REQUEST,
            CoreError::Contention(_) => StatusCode::CONFLICT,
            CoreError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            CoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::AlreadyRegistered => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

/// Extracts and verifies the bearer token from the `Authorization` header,
/// returning the authenticated address (`current_user` in the Python
/// reference's terms).
fn current_user(headers: &HeaderMap, security: &SecurityConfig) -> Result<String, Response> {
    let raw = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing token"))?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
    auth::verify_token(security, token)
        .map(|claims| claims.address)
        .map_err(|e| e.into_response())
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    address: String,
    password: String,
}

async fn register(State(state): State<ApiState>, Json(req): Json<RegisterRequest>) -> Response {
    if req.address.is_empty() || req.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "address and password required");
    }
    let ledger = state.ledger.read();
    match auth::register(ledger.store.as_ref(), &req.address, &req.password) {
        Ok(()) => Json(serde_json::json!({ "message": "User created", "initial_reputation": 100 })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    address: String,
    password: String,
}

async fn login(State(state): State<ApiState>, Json(req): Json<LoginRequest>) -> Response {
    if req.address.is_empty() || req.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "address and password required");
    }
    let ledger = state.ledger.read();
    match auth::login(ledger.store.as_ref(), &state.security, &req.address, &req.password) {
        Ok(token) => Json(serde_json::json!({ "token": token, "address": req.address })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn home() -> Response {
    Json(serde_json::json!({
        "message": "CAD-COIN ledger service",
        "status": "active",
        "features": [
            "Adaptive difficulty adjustment",
            "Progressive reward halving",
            "Priority-based mining",
            "Timeout-protected proof of work",
            "Stablecoin issuance with minter authorization",
            "Chain integrity verification",
        ],
        "endpoints": {
            "auth": {"/auth/register": "POST", "/auth/login": "POST"},
            "ledger": {
                "/chain": "GET (paginated)",
                "/info": "GET",
                "/balance/<address>": "GET",
                "/balance/<address>/<coin_type>": "GET",
                "/mine": "POST (auth)",
                "/transaction": "POST (auth)"
            },
            "stablecoins": {
                "/stable_coin": "POST (auth)",
                "/mint": "POST (auth)",
                "/authorize_minter": "POST (auth)",
                "/stable_coins": "GET"
            },
            "ops": {
                "/pending_transactions": "GET",
                "/health": "GET",
                "/validate_chain": "GET",
                "/mining_stats": "GET"
            }
        }
    }))
    .into_response()
}

async fn info(State(state): State<ApiState>) -> Response {
    match state.ledger.read().chain_info() {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<u64>,
    offset: Option<u64>,
}

async fn chain(State(state): State<ApiState>, Query(q): Query<PageQuery>) -> Response {
    let limit = q.limit.unwrap_or(20).clamp(1, 200);
    let offset = q.offset.unwrap_or(0);
    match state.ledger.read().blocks(limit, offset) {
        Ok(blocks) => Json(serde_json::json!({ "blocks": blocks, "limit": limit, "offset": offset })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn balance_all(State(state): State<ApiState>, Path(address): Path<String>) -> Response {
    match state.ledger.read().balances(&address) {
        Ok(balances) => Json(serde_json::json!({ "address": address, "balances": balances })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn balance_one(State(state): State<ApiState>, Path((address, coin)): Path<(String, String)>) -> Response {
    let coin = coin.to_uppercase();
    match state.ledger.read().balance(&address, &coin) {
        Ok(balance) => Json(balance).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct TransactionRequest {
    receiver: String,
    amount: Decimal,
    coin_type: Option<String>,
    fee: Option<Decimal>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

async fn create_transaction(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<TransactionRequest>,
) -> Response {
    let sender = match current_user(&headers, &state.security) {
        Ok(addr) => addr,
        Err(resp) => return resp,
    };
    let coin_type = req.coin_type.unwrap_or_else(|| "CAD-COIN".to_string()).to_uppercase();
    let ledger = state.ledger.write();
    match ledger.submit_transaction(&sender, &req.receiver, req.amount, req.fee, &coin_type, req.metadata) {
        Ok(_) => Json(serde_json::json!({ "message": "Transaction accepted" })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn mine(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let miner = match current_user(&headers, &state.security) {
        Ok(addr) => addr,
        Err(resp) => return resp,
    };
    let ledger = state.ledger.write();
    match ledger.mine(&miner) {
        Ok(block) => Json(serde_json::json!({ "message": "Block mined", "miner": miner, "block": block })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct PendingQuery {
    limit: Option<usize>,
}

async fn pending_transactions(State(state): State<ApiState>, Query(q): Query<PendingQuery>) -> Response {
    let limit = q.limit.unwrap_or(50);
    match state.ledger.read().pending_transactions(limit) {
        Ok(pending) => Json(serde_json::json!({ "pending": pending, "count": pending.len() })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct CreateStableCoinRequest {
    name: String,
    symbol: String,
    backed_by: String,
    collateral_ratio: Option<Decimal>,
    max_supply: Option<Decimal>,
}

async fn create_stable_coin(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<CreateStableCoinRequest>,
) -> Response {
    if let Err(resp) = current_user(&headers, &state.security) {
        return resp;
    }
    let ledger = state.ledger.write();
    match ledger.create_stablecoin(
        &req.symbol,
        &req.name,
        req.collateral_ratio.unwrap_or(Decimal::new(1, 0)),
        &req.backed_by,
        req.max_supply,
    ) {
        Ok(()) => Json(serde_json::json!({ "message": "Stablecoin created" })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct MintRequest {
    coin_symbol: String,
    recipient: String,
    amount: Decimal,
}

async fn mint(State(state): State<ApiState>, headers: HeaderMap, Json(req): Json<MintRequest>) -> Response {
    let minter = match current_user(&headers, &state.security) {
        Ok(addr) => addr,
        Err(resp) => return resp,
    };
    let ledger = state.ledger.write();
    match ledger.mint(&req.coin_symbol, &minter, &req.recipient, req.amount) {
        Ok(_) => Json(serde_json::json!({ "message": "Mint enqueued" })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct AuthorizeMinterRequest {
    coin_symbol: String,
    minter_address: String,
}

async fn authorize_minter(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<AuthorizeMinterRequest>,
) -> Response {
    let authorizer = match current_user(&headers, &state.security) {
        Ok(addr) => addr,
        Err(resp) => return resp,
    };
    let ledger = state.ledger.write();
    match ledger.authorize_minter(&req.coin_symbol, &req.minter_address, &authorizer) {
        Ok(()) => Json(serde_json::json!({ "message": "Minter authorized" })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_stable_coins(State(state): State<ApiState>) -> Response {
    match state.ledger.read().stable_coins() {
        Ok(coins) => Json(serde_json::json!({ "stable_coins": coins, "count": coins.len() })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct ValidateQuery {
    depth: Option<u64>,
}

async fn validate_chain(State(state): State<ApiState>, Query(q): Query<ValidateQuery>) -> Response {
    let ledger = state.ledger.read();
    let depth = q.depth.unwrap_or(ledger.config.block_validation_depth);
    match ledger.validate_chain(depth) {
        Ok((valid, message)) => Json(serde_json::json!({ "valid": valid, "message": message, "validation_depth": depth })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn mining_stats(State(state): State<ApiState>) -> Response {
    match state.ledger.read().mining_stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health(State(state): State<ApiState>) -> Response {
    let (healthy, body) = state.ledger.read().health();
    let status = if healthy { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    (status, Json(body)).into_response()
}

pub fn create_router(state: ApiState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(register).layer(rate_limit::per_minute(5, 5)))
        .route("/auth/login", post(login).layer(rate_limit::per_minute(10, 10)));

    let ledger_routes = Router::new()
        .route("/", get(home))
        .route("/info", get(info))
        .route("/chain", get(chain))
        .route("/balance/:address", get(balance_all))
        .route("/balance/:address/:coin_type", get(balance_one))
        .route("/transaction", post(create_transaction).layer(rate_limit::per_hour(100, 20)))
        .route("/mine", post(mine).layer(rate_limit::per_hour(10, 3)))
        .route("/pending_transactions", get(pending_transactions));

    let stablecoin_routes = Router::new()
        .route("/stable_coin", post(create_stable_coin).layer(rate_limit::per_hour(5, 2)))
        .route("/mint", post(mint).layer(rate_limit::per_hour(20, 5)))
        .route("/authorize_minter", post(authorize_minter).layer(rate_limit::per_hour(10, 3)))
        .route("/stable_coins", get(list_stable_coins));

    let ops_routes = Router::new()
        .route("/validate_chain", get(validate_chain))
        .route("/mining_stats", get(mining_stats))
        .route("/health", get(health));

    Router::new()
        .merge(auth_routes)
        .merge(ledger_routes)
        .merge(stablecoin_routes)
        .merge(ops_routes)
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
