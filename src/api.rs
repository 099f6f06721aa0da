use axum::{
    Json, Router, debug_handler,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::{
    errors::{EngineError, StateError},
    events::Event,
    orders::Side,
    state::AppState,
    store::LedgerError,
    trade::Trade,
};

/// Hard cap on any page size a client can ask for.
const MAX_PAGE: usize = 1000;

#[derive(serde::Deserialize)]
pub struct NewOrder {
    pub maker: String,
    pub asset: String,
    pub side: Side,
    pub amount: u64,
    pub price: u64,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct OrderAck {
    pub order_id: u64,
    pub trades: Vec<Trade>,
}

#[derive(serde::Deserialize)]
struct CallerParam {
    caller: String,
}

fn engine_error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::Admission(_) => StatusCode::BAD_REQUEST,
        EngineError::Authorization(_) => StatusCode::FORBIDDEN,
        EngineError::State(StateError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
        EngineError::State(_) => StatusCode::CONFLICT,
        EngineError::Settlement(_) => StatusCode::CONFLICT,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<NewOrder>,
) -> Response {
    let report = {
        let mut engine = state.engine.lock().unwrap();
        match engine.create_order(
            &payload.maker,
            &payload.asset,
            payload.amount,
            payload.price,
            payload.side,
        ) {
            Ok(report) => report,
            Err(err) => return engine_error_response(err),
        }
    };

    // The in-memory engine is the source of truth; a ledger write failure
    // is logged, not surfaced, since the trade already settled.
    {
        let mut ledger = state.ledger.lock().unwrap();
        for trade in &report.trades {
            if let Err(err) = ledger.append(trade) {
                error!(trade_id = trade.id, %err, "failed to persist trade");
            }
        }
    }
    state.publish(report.events);

    Json(OrderAck {
        order_id: report.order_id,
        trades: report.trades,
    })
    .into_response()
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
    Query(q): Query<CallerParam>,
) -> Response {
    let events = {
        let mut engine = state.engine.lock().unwrap();
        match engine.cancel_order(order_id, &q.caller) {
            Ok(events) => events,
            Err(err) => return engine_error_response(err),
        }
    };
    state.publish(events);
    Json(json!({ "cancelled": order_id })).into_response()
}

#[derive(serde::Deserialize)]
struct ActiveOrdersQuery {
    side: Side,
    #[serde(default)]
    start: usize,
    #[serde(default = "default_page")]
    count: usize,
}

fn default_page() -> usize {
    50
}

async fn active_orders(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Query(q): Query<ActiveOrdersQuery>,
) -> Response {
    let effective = q.count.min(MAX_PAGE);
    let page = state
        .engine
        .lock()
        .unwrap()
        .get_active_orders(&asset, q.side, q.start, effective);
    let mut res = Json(page).into_response();
    res.headers_mut().insert(
        "x-effective-limit",
        HeaderValue::from_str(&effective.to_string()).unwrap(),
    );
    res
}

async fn user_buy_orders(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    Json(state.engine.lock().unwrap().get_user_buy_orders(&user)).into_response()
}

async fn user_sell_orders(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    Json(state.engine.lock().unwrap().get_user_sell_orders(&user)).into_response()
}

async fn user_trades(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    Json(state.engine.lock().unwrap().get_user_trades(&user)).into_response()
}

#[derive(serde::Deserialize)]
struct TradesQuery {
    #[serde(default = "default_page")]
    limit: usize,
    after: Option<String>,
}

async fn trades(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Query(q): Query<TradesQuery>,
) -> Response {
    let effective = q.limit.min(MAX_PAGE);
    let paged = state
        .ledger
        .lock()
        .unwrap()
        .page_asc(&asset, q.after.as_deref(), effective);
    let mut res = match paged {
        Ok((items, next)) => Json(json!({ "items": items, "next": next })).into_response(),
        Err(LedgerError::BadCursor) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid cursor" })),
            )
                .into_response();
        }
        Err(err) => {
            error!(%err, "trade ledger read failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "ledger unavailable" })),
            )
                .into_response();
        }
    };
    res.headers_mut().insert(
        "x-effective-limit",
        HeaderValue::from_str(&effective.to_string()).unwrap(),
    );
    res
}

// ---- admin settings gate ----------------------------------------------

#[derive(serde::Deserialize)]
struct WhitelistChange {
    caller: String,
    asset: String,
}

async fn whitelist_asset(
    State(state): State<AppState>,
    Json(payload): Json<WhitelistChange>,
) -> Response {
    let outcome = state
        .engine
        .lock()
        .unwrap()
        .whitelist_asset(&payload.caller, &payload.asset);
    admin_response(&state, outcome)
}

async fn remove_from_whitelist(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Query(q): Query<CallerParam>,
) -> Response {
    let outcome = state
        .engine
        .lock()
        .unwrap()
        .remove_from_whitelist(&q.caller, &asset);
    admin_response(&state, outcome)
}

#[derive(serde::Deserialize)]
struct TradingSwitch {
    caller: String,
    enabled: bool,
}

async fn set_trading_enabled(
    State(state): State<AppState>,
    Json(payload): Json<TradingSwitch>,
) -> Response {
    let outcome = state
        .engine
        .lock()
        .unwrap()
        .set_trading_enabled(&payload.caller, payload.enabled);
    admin_response(&state, outcome)
}

#[derive(serde::Deserialize)]
struct FeeRateChange {
    caller: String,
    bps: u16,
}

async fn set_fee_rate(
    State(state): State<AppState>,
    Json(payload): Json<FeeRateChange>,
) -> Response {
    let outcome = state
        .engine
        .lock()
        .unwrap()
        .set_fee_rate(&payload.caller, payload.bps);
    admin_response(&state, outcome)
}

#[derive(serde::Deserialize)]
struct FeeCollectorChange {
    caller: String,
    collector: String,
}

async fn set_fee_collector(
    State(state): State<AppState>,
    Json(payload): Json<FeeCollectorChange>,
) -> Response {
    let outcome = state
        .engine
        .lock()
        .unwrap()
        .set_fee_collector(&payload.caller, &payload.collector);
    admin_response(&state, outcome)
}

fn admin_response(state: &AppState, outcome: Result<Vec<Event>, EngineError>) -> Response {
    match outcome {
        Ok(events) => {
            state.publish(events);
            Json(json!({ "ok": true })).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

// ---- custody stand-in --------------------------------------------------
// Balances live in the in-memory custody collaborator; these endpoints
// seed it so settlement can be exercised end to end.

#[derive(serde::Deserialize)]
struct CustodyMovement {
    account: String,
    asset: String,
    amount: u64,
}

async fn custody_deposit(
    State(state): State<AppState>,
    Json(payload): Json<CustodyMovement>,
) -> Response {
    let mut engine = state.engine.lock().unwrap();
    engine
        .custody_mut()
        .deposit(&payload.account, &payload.asset, payload.amount);
    Json(json!({ "ok": true })).into_response()
}

async fn custody_approve(
    State(state): State<AppState>,
    Json(payload): Json<CustodyMovement>,
) -> Response {
    let mut engine = state.engine.lock().unwrap();
    engine
        .custody_mut()
        .approve(&payload.account, &payload.asset, payload.amount);
    Json(json!({ "ok": true })).into_response()
}

async fn custody_balance(
    State(state): State<AppState>,
    Path((account, asset)): Path<(String, String)>,
) -> Response {
    use crate::custody::Custody;
    let balance = state
        .engine
        .lock()
        .unwrap()
        .custody()
        .balance_of(&account, &asset);
    Json(json!({ "balance": balance })).into_response()
}

// ---- websocket event fan-out ------------------------------------------

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

/// Forward committed engine notifications to one subscriber as JSON text
/// frames. A lagging subscriber just skips what it missed.
async fn stream_events(socket: WebSocket, mut rx: broadcast::Receiver<Event>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                // client closed or errored out
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            },
            outgoing = rx.recv() => match outgoing {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", delete(cancel_order))
        .route("/orders/active/{asset}", get(active_orders))
        .route("/users/{user}/orders/buy", get(user_buy_orders))
        .route("/users/{user}/orders/sell", get(user_sell_orders))
        .route("/users/{user}/trades", get(user_trades))
        .route("/trades/{asset}", get(trades))
        .route("/admin/whitelist", post(whitelist_asset))
        .route("/admin/whitelist/{asset}", delete(remove_from_whitelist))
        .route("/admin/trading", post(set_trading_enabled))
        .route("/admin/fee-rate", post(set_fee_rate))
        .route("/admin/fee-collector", post(set_fee_collector))
        .route("/custody/deposit", post(custody_deposit))
        .route("/custody/approve", post(custody_approve))
        .route("/custody/balance/{account}/{asset}", get(custody_balance))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
