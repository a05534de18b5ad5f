//! End-to-end: a stand-in API service, the edge in front of it, and real
//! websocket clients.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use family_sync::{
    cache::QueryCache,
    channel::{spawn_listener, ChannelState},
    config::{ClientConfig, Config},
    core_client::HttpCoreClient,
    mutation::{FeedbackEvent, MutationClient, Notice},
    request::{CollectionFetcher, HttpApi},
    resources::{Resource, CALENDAR_EVENTS},
    server::{self, AppState},
};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Stand-in for the family API. Every calendar read reports how many reads
/// came before it, so refetches are observable.
async fn api_service(State(reads): State<Arc<AtomicU64>>, method: Method, uri: Uri) -> Response {
    let path = uri.path();
    if path.ends_with("/expired") {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    if path.ends_with("/broken") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if method == Method::GET && path == CALENDAR_EVENTS {
        let revision = reads.fetch_add(1, Ordering::SeqCst) + 1;
        return Json(json!([{ "id": "e1", "title": "Dentist", "revision": revision }]))
            .into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

struct Edge {
    addr: SocketAddr,
    state: Arc<AppState>,
}

async fn start_edge() -> Edge {
    let api_addr = serve(
        Router::new()
            .fallback(api_service)
            .with_state(Arc::new(AtomicU64::new(0))),
    )
    .await;

    let config = Config {
        bind_addr: "127.0.0.1:0".into(),
        core_base_url: format!("http://{api_addr}"),
        ws_send_buffer: 16,
        core_request_timeout_ms: 5_000,
    };
    let state = AppState::new(Arc::new(HttpCoreClient::new(&config).unwrap()), config.ws_send_buffer);
    let addr = serve(server::router(state.clone())).await;
    Edge { addr, state }
}

async fn wait_for_connections(state: &AppState, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.broadcaster.connection_count() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("clients registered");
}

async fn next_text(socket: &mut Socket, wait: Duration) -> Option<String> {
    match tokio::time::timeout(wait, socket.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => Some(text),
        _ => None,
    }
}

#[tokio::test]
async fn mutation_fans_out_to_every_client_once() {
    let edge = start_edge().await;
    let mut sockets = Vec::new();
    for _ in 0..3 {
        let (socket, _) = connect_async(format!("ws://{}/ws", edge.addr)).await.unwrap();
        sockets.push(socket);
    }
    wait_for_connections(&edge.state, 3).await;

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("http://{}/api/calendar-events", edge.addr))
        .json(&json!({ "title": "Picnic" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    for socket in &mut sockets {
        let text = next_text(socket, Duration::from_secs(5)).await.expect("notice");
        let notice: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(notice, json!({ "type": "invalidate", "queryKey": "/api/calendar-events" }));
    }

    // reads and failed writes stay quiet
    let resp = http
        .get(format!("http://{}/api/calendar-events", edge.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = http
        .patch(format!("http://{}/api/calendar-events/broken", edge.addr))
        .json(&json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    for socket in &mut sockets {
        assert_eq!(next_text(socket, Duration::from_millis(200)).await, None);
    }
}

#[tokio::test]
async fn child_mutation_invalidates_parent_collection_only() {
    let edge = start_edge().await;
    let (mut socket, _) = connect_async(format!("ws://{}/ws", edge.addr)).await.unwrap();
    wait_for_connections(&edge.state, 1).await;

    reqwest::Client::new()
        .patch(format!("http://{}/api/grocery-items/i1", edge.addr))
        .json(&json!({ "completed": true }))
        .send()
        .await
        .unwrap();

    let text = next_text(&mut socket, Duration::from_secs(5)).await.expect("notice");
    assert_eq!(text, r#"{"type":"invalidate","queryKey":"/api/grocery-lists"}"#);
    assert_eq!(next_text(&mut socket, Duration::from_millis(200)).await, None);
}

#[tokio::test]
async fn closed_sockets_leave_the_registry() {
    let edge = start_edge().await;
    let (mut socket, _) = connect_async(format!("ws://{}/ws", edge.addr)).await.unwrap();
    wait_for_connections(&edge.state, 1).await;

    socket.close(None).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while edge.state.broadcaster.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection unregistered");
}

#[tokio::test]
async fn another_members_change_reaches_this_members_cache() {
    let edge = start_edge().await;
    let client_config = ClientConfig::new(&format!("http://{}", edge.addr));

    let api = Arc::new(HttpApi::new(&client_config).unwrap());
    let cache = QueryCache::<Value>::new(Arc::new(CollectionFetcher::new(api)));
    let mut events = cache.subscribe(CALENDAR_EVENTS);
    let first = tokio::time::timeout(Duration::from_secs(5), events.changed())
        .await
        .expect("initial load")
        .expect("cache alive");
    assert_eq!(first.unwrap()[0]["revision"], json!(1));

    let listener = spawn_listener(
        &client_config.channel_url,
        cache.clone(),
        Duration::from_millis(50),
    );
    let mut state = listener.watch_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == ChannelState::Open))
        .await
        .expect("channel open")
        .unwrap();
    wait_for_connections(&edge.state, 1).await;

    // someone else in the family edits the calendar
    reqwest::Client::new()
        .patch(format!("http://{}/api/calendar-events/e1", edge.addr))
        .json(&json!({ "title": "Orthodontist" }))
        .send()
        .await
        .unwrap();

    let refreshed = tokio::time::timeout(Duration::from_secs(5), events.changed())
        .await
        .expect("refetch after notice")
        .expect("cache alive");
    assert_eq!(refreshed.unwrap()[0]["revision"], json!(2));

    listener.teardown().await;
    assert_eq!(*state.borrow(), ChannelState::Disconnected);
    wait_for_disconnect(&edge.state).await;
}

async fn wait_for_disconnect(state: &AppState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.broadcaster.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener socket closed");
}

#[tokio::test]
async fn expired_session_rolls_back_over_http() {
    let edge = start_edge().await;
    let client_config = ClientConfig::new(&format!("http://{}", edge.addr));
    let api = Arc::new(HttpApi::new(&client_config).unwrap());
    let cache = QueryCache::<Value>::new(Arc::new(CollectionFetcher::new(api.clone())));
    let (tx, mut feedback) = mpsc::unbounded_channel();
    let client = MutationClient::new(cache.clone(), api, Arc::new(tx), &client_config);

    let original = json!([{ "id": "expired", "title": "Dentist" }]);
    cache.set(CALENDAR_EVENTS, original.clone());

    let err = client
        .update(&Resource::calendar_events(), "expired", json!({ "title": "Nope" }))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.status, Some(401));
    assert_eq!(cache.get(CALENDAR_EVENTS), Some(original));
    assert_eq!(
        feedback.recv().await,
        Some(FeedbackEvent::Notice(Notice::Unauthorized))
    );
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), feedback.recv()).await.unwrap(),
        Some(FeedbackEvent::Redirect("/api/login".into()))
    );
}
