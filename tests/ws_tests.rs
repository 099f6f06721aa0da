use std::time::Duration;

use axum::{Router, body::Body, http::Request};
use futures_util::StreamExt;
use order_matcher::{
    api::router,
    state::{AppState, BootConfig},
};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tower::ServiceExt;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Serve the app on an ephemeral port and return a second router on the
/// same shared state for driving mutations without an HTTP client.
async fn spawn_server() -> (WsClient, Router, tokio::task::JoinHandle<()>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let state = AppState::new(dir.path(), BootConfig::default()).unwrap();
    let app: Router = router(state.clone());
    let driver = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (ws, _resp) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("ws connect");
    (ws, driver, server, dir)
}

async fn post_json(app: &Router, uri: &str, body: Value) {
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(res.status().is_success(), "driver call failed: {uri}");
}

async fn next_frame(ws: &mut WsClient) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("ws recv timeout")
        .expect("ws closed")
        .expect("ws error");
    match msg {
        tungstenite::Message::Text(t) => serde_json::from_str(&t).expect("parse event frame"),
        other => panic!("expected text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn websocket_streams_committed_events_in_order() {
    let (mut ws, driver, server, _tmp) = spawn_server().await;

    // Whitelist after the subscriber attached, so the event is observed.
    post_json(
        &driver,
        "/admin/whitelist",
        json!({"caller": "admin", "asset": "BTC"}),
    )
    .await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["kind"], "asset_whitelisted");
    assert_eq!(frame["asset"], "BTC");

    // Custody seeding emits no events.
    for uri in ["/custody/deposit", "/custody/approve"] {
        post_json(
            &driver,
            uri,
            json!({"account": "alice", "asset": "BTC", "amount": 10}),
        )
        .await;
    }

    post_json(
        &driver,
        "/orders",
        json!({"maker": "alice", "asset": "BTC", "side": "Sell", "amount": 10, "price": 100}),
    )
    .await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["kind"], "order_created");
    assert_eq!(frame["order"]["id"].as_u64(), Some(1));
    assert_eq!(frame["order"]["side"], "Sell");

    post_json(
        &driver,
        "/orders",
        json!({"maker": "bob", "asset": "BTC", "side": "Buy", "amount": 4, "price": 100}),
    )
    .await;

    let mut kinds = Vec::new();
    let trade = loop {
        let frame = next_frame(&mut ws).await;
        let kind = frame["kind"].as_str().unwrap().to_owned();
        if kind == "trade_executed" {
            break frame;
        }
        kinds.push(kind);
    };
    assert_eq!(kinds, ["order_created", "order_filled", "order_filled"]);
    assert_eq!(trade["trade"]["execution_price"].as_u64(), Some(100));
    assert_eq!(trade["trade"]["amount"].as_u64(), Some(4));
    assert_eq!(trade["trade"]["buy_order_id"].as_u64(), Some(2));
    assert_eq!(trade["trade"]["sell_order_id"].as_u64(), Some(1));

    server.abort();
}

#[tokio::test]
async fn rejected_calls_emit_nothing() {
    let (mut ws, driver, server, _tmp) = spawn_server().await;

    // Not whitelisted: admission rejection, no event.
    let res = driver
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"maker": "bob", "asset": "DOGE", "side": "Buy", "amount": 1, "price": 1})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), axum::http::StatusCode::BAD_REQUEST);

    // The next frame the subscriber sees is the later admin change.
    post_json(
        &driver,
        "/admin/trading",
        json!({"caller": "admin", "enabled": false}),
    )
    .await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["kind"], "trading_enabled");
    assert_eq!(frame["enabled"].as_bool(), Some(false));

    server.abort();
}
