//! Allowlist gating and relay behavior of the client surface.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use allowlist_proxy::allowlist::compile;
use allowlist_proxy::http::{AppState, HttpServer};
use allowlist_proxy::{Allowlist, ProxyConfig};

mod common;
use common::{Captured, Reply};

const FEED: &str = r#"
// trusted match servers
servers = ["10.0.1.5", "10.0.2.0/24"]
spans = ["192.168.1.10-192.168.1.12"]
"#;

fn proxy(upstream: SocketAddr, allowlist: Arc<Allowlist>, client: SocketAddr) -> Router {
    let mut config = ProxyConfig::default();
    config.upstream.base_url = format!("http://{upstream}");
    let state = AppState::new(&config, allowlist).unwrap();
    HttpServer::build_router(&config, state).layer(MockConnectInfo(client))
}

fn feed_allowlist() -> Arc<Allowlist> {
    Arc::new(Allowlist::with_ranges(compile(FEED).ranges))
}

fn peer(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_unlisted_write_is_forbidden_without_upstream_call() {
    let (backend, calls) = common::start_counting_backend(|_, _| Reply::ok("stored")).await;
    let app = proxy(backend, feed_allowlist(), peer("203.0.113.9:41000"));

    let response = app
        .oneshot(Request::post("/match/1").body(Body::from("{}")).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_listed_sources_may_write() {
    let (backend, calls) = common::start_counting_backend(|_, _| Reply::ok("stored")).await;
    let allowlist = feed_allowlist();

    for client in ["10.0.1.5:1000", "10.0.2.77:1000", "192.168.1.11:1000", "127.0.0.1:1000"] {
        let app = proxy(backend, allowlist.clone(), peer(client));
        let response = app
            .oneshot(Request::post("/match/1").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "client {client}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // Span end is inclusive, one past it is not.
    let app = proxy(backend, allowlist, peer("192.168.1.13:1000"));
    let response = app
        .oneshot(Request::post("/match/1").body(Body::from("{}")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ipv4_mapped_peer_is_matched_as_ipv4() {
    let (backend, _) = common::start_counting_backend(|_, _| Reply::ok("stored")).await;
    let app = proxy(backend, feed_allowlist(), peer("[::ffff:10.0.1.5]:1000"));

    let response = app
        .oneshot(Request::post("/match/1").body(Body::from("{}")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_empty_allowlist_denies_every_write() {
    let (backend, calls) = common::start_counting_backend(|_, _| Reply::ok("stored")).await;
    let app = proxy(backend, Arc::new(Allowlist::new()), peer("127.0.0.1:1000"));

    let response = app
        .oneshot(Request::post("/").body(Body::from("{}")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reads_are_open_and_relayed() {
    let seen: Arc<Mutex<Option<Captured>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let backend = common::start_programmable_backend(move |captured| {
        *sink.lock().unwrap() = Some(captured);
        async {
            Reply::Respond {
                status: 200,
                headers: vec![
                    ("content-type", "application/json"),
                    ("x-rank-source", "primary"),
                    ("x-rank-source", "cache"),
                ],
                body: r#"[{"player":"ada","elo":2140}]"#.to_string(),
            }
        }
    })
    .await;

    let app = proxy(backend, Arc::new(Allowlist::new()), peer("203.0.113.9:41000"));
    let response = app
        .oneshot(
            Request::get("/ranks/top?mode=duel")
                .header("x-client-version", "1.4")
                .header("keep-alive", "timeout=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let sources: Vec<_> = response.headers().get_all("x-rank-source").iter().collect();
    assert_eq!(sources, ["primary", "cache"]);
    assert!(response.headers().get("connection").is_none());
    assert_eq!(body_text(response).await, r#"[{"player":"ada","elo":2140}]"#);

    let captured = seen.lock().unwrap().clone().unwrap();
    assert_eq!(captured.method, "GET");
    assert_eq!(captured.target, "/ranks/top?mode=duel");
    assert_eq!(captured.header("x-client-version"), Some("1.4"));
    assert!(captured.header("keep-alive").is_none());
}

#[tokio::test]
async fn test_read_error_status_is_relayed_verbatim() {
    let backend = common::start_programmable_backend(|_| async { Reply::status(404, "no such player") }).await;
    let app = proxy(backend, Arc::new(Allowlist::new()), peer("203.0.113.9:41000"));

    let response = app
        .oneshot(Request::get("/player/unknown").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "no such player");
}

#[tokio::test]
async fn test_write_body_and_path_reach_upstream() {
    let seen: Arc<Mutex<Option<Captured>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let backend = common::start_programmable_backend(move |captured| {
        *sink.lock().unwrap() = Some(captured);
        async { Reply::status(202, "") }
    })
    .await;

    let app = proxy(backend, feed_allowlist(), peer("10.0.1.5:1000"));
    let response = app
        .oneshot(
            Request::post("/winner/42?season=3")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"winner":"ada"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let captured = seen.lock().unwrap().clone().unwrap();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.target, "/winner/42?season=3");
    assert_eq!(captured.header("content-type"), Some("application/json"));
    assert_eq!(captured.body, br#"{"winner":"ada"}"#);
}

#[tokio::test]
async fn test_other_methods_are_not_routed() {
    let (backend, calls) = common::start_counting_backend(|_, _| Reply::ok("")).await;
    let app = proxy(backend, feed_allowlist(), peer("10.0.1.5:1000"));

    let response = app
        .oneshot(Request::builder().method(Method::DELETE).uri("/match/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
