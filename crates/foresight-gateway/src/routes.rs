//! HTTP surface.
//!
//! Reads are served locally on every node. Writes run through a shared
//! pipeline: loop-guard check, follower-to-leader forwarding, idempotency
//! replay, then the handler body. Responses on the write path always carry
//! the request-id header so a client can correlate across the proxy hop.

use std::future::Future;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use ethers::types::Address;
use foresight_engine::{validate_order, verify_order_signature};
use foresight_types::constants::{
    DEFAULT_DEPTH_LEVELS, IDEMPOTENCY_KEY_HEADER, MAX_DEPTH_LEVELS, PROXIED_RESPONSE_HEADER,
    PROXY_LOOP_HEADER, REQUEST_ID_HEADER, TRADE_TAPE_CAPACITY, VERSION,
};
use foresight_types::{
    BookKey, ForesightError, MarketKey, OrderId, SubmitRequest, Usdc, notional,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::cluster::ForwardedResponse;
use crate::error::ApiError;
use crate::idempotency::{CachedResponse, IdempotencyStore};
use crate::state::AppState;
use crate::ws::client_loop;

/// Build the full router for one node.
pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/orders", post(submit_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/markets/{market}/{outcome}/depth", get(get_depth))
        .route("/markets/{market}/{outcome}/stats", get(get_stats))
        .route("/markets/{market}/{outcome}/trades", get(get_trades))
        .route("/ws", get(ws_upgrade));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/v1", v1)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Write pipeline
// ---------------------------------------------------------------------------

type HandlerOutcome = Result<Value, (StatusCode, Value)>;

/// Shared write-path wrapper: loop guard, leader forwarding, idempotency
/// replay, execution, response caching.
async fn write_endpoint<F, Fut>(
    state: AppState,
    headers: HeaderMap,
    path: String,
    body: Bytes,
    exec: F,
) -> Response
where
    F: FnOnce(AppState, Bytes) -> Fut,
    Fut: Future<Output = HandlerOutcome>,
{
    let client_request_id = header_str(&headers, REQUEST_ID_HEADER);
    let request_id = client_request_id
        .clone()
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    // A follower seeing the loop-guard header is a routing cycle; a
    // leader executes the forwarded request as its own.
    if headers.contains_key(PROXY_LOOP_HEADER) {
        if let Err(err) = state.cluster.reject_loop() {
            return with_request_id(ApiError(err).into_response(), &request_id);
        }
    } else if !state.cluster.is_leader() {
        let idem = header_str(&headers, IDEMPOTENCY_KEY_HEADER);
        return match state
            .cluster
            .forward_write(&path, body, &request_id, idem.as_deref())
            .await
        {
            Ok(forwarded) => relay(&forwarded, &request_id),
            Err(err) => with_request_id(ApiError(err).into_response(), &request_id),
        };
    }

    // A client-supplied request id doubles as the idempotency key when no
    // explicit one is sent; generated ids never replay.
    let cache_key = header_str(&headers, IDEMPOTENCY_KEY_HEADER)
        .or(client_request_id)
        .map(|key| IdempotencyStore::key_for("POST", &path, &key));
    if let Some(key) = &cache_key {
        if let Some(hit) = state.idempotency.get(key).await {
            return with_request_id(replay(&hit), &request_id);
        }
    }

    let (status, payload) = match exec(state.clone(), body).await {
        Ok(value) => (StatusCode::OK, value),
        Err(parts) => parts,
    };

    if let Some(key) = &cache_key {
        state
            .idempotency
            .put(
                key,
                CachedResponse {
                    status: status.as_u16(),
                    content_type: "application/json".into(),
                    body: payload.to_string(),
                },
            )
            .await;
    }
    with_request_id((status, Json(payload)).into_response(), &request_id)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Relay a response the leader produced, marked as proxied.
fn relay(forwarded: &ForwardedResponse, request_id: &str) -> Response {
    let status =
        StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(forwarded.body.clone()));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(&forwarded.content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
        .headers_mut()
        .insert(PROXIED_RESPONSE_HEADER, HeaderValue::from_static("1"));
    with_request_id(response, request_id)
}

/// Rebuild a cached response byte-for-byte.
fn replay(cached: &CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(cached.body.clone()));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(&cached.content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn err_parts(err: ForesightError) -> (StatusCode, Value) {
    ApiError(err).parts()
}

// ---------------------------------------------------------------------------
// Order submission
// ---------------------------------------------------------------------------

async fn submit_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    write_endpoint(state, headers, "/v1/orders".to_string(), body, |state, body| async move {
        execute_submit(&state, &body).await
    })
    .await
}

async fn execute_submit(state: &AppState, body: &Bytes) -> HandlerOutcome {
    let request: SubmitRequest = serde_json::from_slice(body)
        .map_err(|err| ApiError::malformed(format!("bad order body: {err}")))?;

    let now = chrono::Utc::now();
    let now_unix = u64::try_from(now.timestamp()).unwrap_or(0);
    let validated =
        validate_order(&request, state.engine.params(), now_unix).map_err(err_parts)?;
    let owner_eoa = validated.owner_eoa;
    let gasless = validated.request.gasless.unwrap_or(false);
    let order = validated.into_order(now);

    verify_order_signature(&order, owner_eoa, state.prober.as_ref())
        .await
        .map_err(err_parts)?;

    // The in-memory registry is authoritative; the store mirror catches
    // salts pinned before the last restart.
    let salt_key = order.salt_key();
    if !state.engine.salts().is_taken(&salt_key) {
        if let Some(store) = &state.store {
            match store.find_salt(&salt_key).await {
                Ok(Some((order_id, status))) if status.blocks_salt_reuse() => {
                    state.engine.salts().seed(salt_key, order_id, status);
                    return Err(err_parts(ForesightError::DuplicateOrder {
                        salt: order.salt.to_string(),
                    }));
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "salt mirror lookup failed"),
            }
        }
    }

    if gasless {
        let charge =
            notional(order.amount, order.price).unwrap_or(Usdc(u128::MAX));
        state
            .quota
            .check_and_consume(order.maker, charge)
            .await
            .map_err(err_parts)?;
    }

    let outcome = state.engine.submit(order).await.map_err(err_parts)?;
    Ok(json!({ "order": outcome.order, "matches": outcome.matches }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CancelRequest {
    maker: String,
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/v1/orders/{id}/cancel");
    write_endpoint(state, headers, path, body, move |state, body| async move {
        execute_cancel(&state, &id, &body).await
    })
    .await
}

async fn execute_cancel(state: &AppState, raw_id: &str, body: &Bytes) -> HandlerOutcome {
    let order_id = parse_order_id(raw_id)?;
    let request: CancelRequest = serde_json::from_slice(body)
        .map_err(|err| ApiError::malformed(format!("bad cancel body: {err}")))?;
    let maker: Address = request
        .maker
        .trim()
        .parse()
        .map_err(|_| err_parts(ForesightError::InvalidMaker(request.maker.clone())))?;

    let order = state.engine.cancel(order_id, maker).await.map_err(err_parts)?;
    Ok(json!({ "order": order }))
}

fn parse_order_id(raw: &str) -> Result<OrderId, (StatusCode, Value)> {
    Uuid::parse_str(raw)
        .map(OrderId)
        .map_err(|_| ApiError::malformed(format!("bad order id: {raw}")))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Response> {
    let order_id = parse_order_id(&id)
        .map_err(|(status, body)| (status, Json(body)).into_response())?;
    match state.engine.get_order(order_id).await {
        Some(order) => Ok(Json(json!({ "order": order }))),
        None => Err(ApiError(ForesightError::OrderNotFound(order_id)).into_response()),
    }
}

#[derive(Debug, Deserialize)]
struct DepthQuery {
    levels: Option<usize>,
}

async fn get_depth(
    State(state): State<AppState>,
    Path((market, outcome)): Path<(String, u32)>,
    Query(query): Query<DepthQuery>,
) -> Json<Value> {
    let levels = query
        .levels
        .unwrap_or(DEFAULT_DEPTH_LEVELS)
        .clamp(1, MAX_DEPTH_LEVELS);
    let key = BookKey::new(MarketKey::new(market), outcome);
    let depth = state.engine.depth(&key, levels).await;
    Json(json!(depth))
}

async fn get_stats(
    State(state): State<AppState>,
    Path((market, outcome)): Path<(String, u32)>,
) -> Json<Value> {
    let key = BookKey::new(MarketKey::new(market), outcome);
    let stats = state.engine.stats(&key).await;
    Json(json!(stats))
}

#[derive(Debug, Deserialize)]
struct TradesQuery {
    limit: Option<usize>,
}

async fn get_trades(
    State(state): State<AppState>,
    Path((market, outcome)): Path<(String, u32)>,
    Query(query): Query<TradesQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(100).clamp(1, TRADE_TAPE_CAPACITY);
    let key = BookKey::new(MarketKey::new(market), outcome);
    let trades = state.engine.recent_trades(&key, limit).await;
    Json(json!({ "trades": trades }))
}

// ---------------------------------------------------------------------------
// WebSocket, health
// ---------------------------------------------------------------------------

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    upgrade.on_upgrade(move |socket| client_loop(hub, socket))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok", "version": VERSION }))
}

async fn readyz(State(state): State<AppState>) -> Response {
    if state.cluster.ready() {
        (StatusCode::OK, Json(json!({ "ready": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": "follower has no leader configured" })),
        )
            .into_response()
    }
}
