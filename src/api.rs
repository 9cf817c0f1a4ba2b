//! The HTTP surface named in spec §6, a thin axum router over
//! [`crate::coordinator::Coordinator`] in the teacher's handler idiom:
//! the `LoggedJson` extractor, the `(StatusCode, Json<Value>)` error
//! shape for handlers that don't go through [`crate::errors::CoreError`],
//! and a `TraceLayer` wrapping the whole router.
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{AdminUser, AuthUser},
    coordinator::NewOrder as CoordinatorOrder,
    errors::CoreError,
    instrument::{Instrument, is_valid_ticker},
    orderbook::Level,
    orders::{Order, Side},
    state::AppState,
    user::User,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "request rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
            }
        }
    }
}

// ---- public ---------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
}

/// `POST /public/register`
pub async fn register(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, CoreError> {
    let id = Uuid::new_v4();
    let api_key = Uuid::new_v4().simple().to_string() + &Uuid::new_v4().simple().to_string();
    let user = User::new_user(id, payload.name.clone(), api_key.clone());
    state.coordinator.store.put_user(&user)?;
    Ok(Json(RegisterResponse {
        id,
        name: payload.name,
        api_key,
    }))
}

/// `GET /public/instrument`
pub async fn list_instruments(State(state): State<AppState>) -> Result<Json<Vec<Instrument>>, CoreError> {
    let all = state.coordinator.store.list_instruments()?;
    Ok(Json(all.into_iter().filter(|i| i.active).collect()))
}

fn default_depth() -> usize {
    50
}
#[derive(Deserialize)]
pub struct DepthQuery {
    #[serde(default = "default_depth")]
    limit: usize,
}

#[derive(Serialize)]
pub struct OrderBookSnapshot {
    ask_levels: Vec<Level>,
    bid_levels: Vec<Level>,
}

/// `GET /public/orderbook/{ticker}?limit=N`
pub async fn get_order_book(
    Path(ticker): Path<String>,
    Query(q): Query<DepthQuery>,
    State(state): State<AppState>,
) -> Result<Json<OrderBookSnapshot>, CoreError> {
    let (ask_levels, bid_levels) = state.coordinator.snapshot_book(&ticker, q.limit).await?;
    Ok(Json(OrderBookSnapshot { ask_levels, bid_levels }))
}

fn default_trade_limit() -> usize {
    100
}
#[derive(Deserialize)]
pub struct TradesQuery {
    #[serde(default = "default_trade_limit")]
    limit: usize,
    after: Option<String>,
}

#[derive(Serialize)]
pub struct TradesPage {
    items: Vec<crate::trade::Trade>,
    next: Option<String>,
}

/// `GET /public/transactions/{ticker}?limit=N`
pub async fn get_transactions(
    Path(ticker): Path<String>,
    Query(q): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesPage>, CoreError> {
    let limit = q.limit.min(1000);
    let (items, next) = state
        .coordinator
        .store
        .page_trades_asc(&ticker, q.after.as_deref(), limit)?;
    Ok(Json(TradesPage { items, next }))
}

// ---- orders -----------------------------------------------------------

#[derive(Deserialize)]
pub struct SubmitOrderRequest {
    pub direction: Side,
    pub ticker: String,
    pub qty: u64,
    pub price: Option<u64>,
}

/// `POST /order`
pub async fn submit_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    LoggedJson(payload): LoggedJson<SubmitOrderRequest>,
) -> Result<Json<Order>, CoreError> {
    if payload.qty == 0 {
        return Err(CoreError::InvalidState);
    }
    if let Some(price) = payload.price {
        if price == 0 {
            return Err(CoreError::InvalidState);
        }
    }
    if !is_valid_ticker(&payload.ticker) {
        return Err(CoreError::InvalidState);
    }

    let order = state
        .coordinator
        .submit_order(CoordinatorOrder {
            owner: user.id,
            instrument: payload.ticker,
            side: payload.direction,
            qty: payload.qty,
            price: payload.price,
        })
        .await?;

    Ok(Json(order))
}

/// `GET /order` — every order the caller has ever placed, any status
/// (spec §6 "list caller's orders"), not just the currently-open ones.
pub async fn list_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Order>>, CoreError> {
    let orders = state.coordinator.store.orders_for_user(user.id)?;
    Ok(Json(orders))
}

/// `GET /order/{id}`
pub async fn get_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Order>, CoreError> {
    let order = state.coordinator.store.get_order(id)?.ok_or(CoreError::NotFound)?;
    if order.owner != user.id && user.role != crate::user::Role::Admin {
        return Err(CoreError::Forbidden);
    }
    Ok(Json(order))
}

/// `DELETE /order/{id}`
pub async fn cancel_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Order>, CoreError> {
    let order = state.coordinator.cancel_order(&user, id).await?;
    Ok(Json(order))
}

// ---- balances -----------------------------------------------------------

#[derive(Serialize)]
pub struct BalanceRow {
    ticker: String,
    available: u64,
    frozen: u64,
}

/// `GET /balance`
pub async fn get_balances(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<Vec<BalanceRow>> {
    let rows = state
        .coordinator
        .ledger
        .balances_for_user(user.id)
        .into_iter()
        .map(|(ticker, bal)| BalanceRow {
            ticker,
            available: bal.available,
            frozen: bal.frozen,
        })
        .collect();
    Json(rows)
}

// ---- admin --------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateInstrumentRequest {
    pub ticker: String,
}

/// `POST /admin/instrument`
pub async fn create_instrument(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    LoggedJson(payload): LoggedJson<CreateInstrumentRequest>,
) -> Result<Json<Instrument>, CoreError> {
    if !is_valid_ticker(&payload.ticker) {
        return Err(CoreError::InvalidState);
    }
    if let Some(existing) = state.coordinator.store.get_instrument(&payload.ticker)? {
        if existing.active {
            return Err(CoreError::Conflict);
        }
    }
    let instrument = Instrument::new(payload.ticker);
    state.coordinator.store.put_instrument(&instrument)?;
    Ok(Json(instrument))
}

/// `DELETE /admin/instrument/{ticker}`
pub async fn delete_instrument(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<StatusCode, CoreError> {
    state.coordinator.deactivate_instrument(&admin, &ticker).await?;
    Ok(StatusCode::OK)
}

/// `DELETE /admin/user/{id}`
pub async fn delete_user(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<StatusCode, CoreError> {
    state.coordinator.deactivate_user(&admin, id).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct FundingRequest {
    pub user_id: Uuid,
    pub ticker: String,
    pub amount: u64,
}

/// `POST /admin/balance/deposit`
pub async fn deposit(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    LoggedJson(payload): LoggedJson<FundingRequest>,
) -> Result<StatusCode, CoreError> {
    let user = state
        .coordinator
        .store
        .get_user(payload.user_id)?
        .ok_or(CoreError::NotFound)?;
    if !user.active {
        return Err(CoreError::InvalidState);
    }
    state
        .coordinator
        .deposit(payload.user_id, &payload.ticker, payload.amount)
        .await?;
    Ok(StatusCode::OK)
}

/// `POST /admin/balance/withdraw`
pub async fn withdraw(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    LoggedJson(payload): LoggedJson<FundingRequest>,
) -> Result<StatusCode, CoreError> {
    state
        .coordinator
        .withdraw(payload.user_id, &payload.ticker, payload.amount)
        .await?;
    Ok(StatusCode::OK)
}

/// Constructs the application's `Router` with every route in the surface
/// named by spec §6, plus a `TraceLayer` the way the teacher wraps every
/// route group.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/public/register", post(register))
        .route("/public/instrument", get(list_instruments))
        .route("/public/orderbook/{ticker}", get(get_order_book))
        .route("/public/transactions/{ticker}", get(get_transactions));

    let orders = Router::new()
        .route("/order", post(submit_order).get(list_orders))
        .route("/order/{id}", get(get_order).delete(cancel_order));

    let balance = Router::new().route("/balance", get(get_balances));

    let admin = Router::new()
        .route("/admin/instrument", post(create_instrument))
        .route("/admin/instrument/{ticker}", delete(delete_instrument))
        .route("/admin/user/{id}", delete(delete_user))
        .route("/admin/balance/deposit", post(deposit))
        .route("/admin/balance/withdraw", post(withdraw));

    public
        .merge(orders)
        .merge(balance)
        .merge(admin)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false).level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}
