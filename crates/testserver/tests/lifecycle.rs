//! Plain-HTTP lifecycle tests against real sockets.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use testserver::{client, StartError, TestServer};

async fn hello(Query(params): Query<HashMap<String, String>>) -> String {
    format!("hello {}", params.get("name").map(String::as_str).unwrap_or_default())
}

#[tokio::test]
async fn hello_round_trip() {
    let mut server = TestServer::start().await.unwrap();
    server.route("/hello", get(hello));

    let resp = client::get(&server.absolute_url("/hello?name=world")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(client::read_text(resp).await.unwrap(), "hello world");

    server.stop().await;
}

#[tokio::test]
async fn relative_path_without_slash() {
    let mut server = TestServer::start().await.unwrap();
    server.route("/hello", get(hello));

    let resp = client::get(&server.absolute_url("hello?name=there")).await.unwrap();
    assert_eq!(client::read_text(resp).await.unwrap(), "hello there");

    server.stop().await;
}

#[tokio::test]
async fn unregistered_route_is_404() {
    let mut server = TestServer::start().await.unwrap();
    let resp = client::get(&server.absolute_url("/missing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    server.stop().await;
}

#[tokio::test]
async fn routes_registered_after_first_request_are_served() {
    let mut server = TestServer::start().await.unwrap();

    let before = client::get(&server.absolute_url("/late")).await.unwrap();
    assert_eq!(before.status(), StatusCode::NOT_FOUND);

    server.route("/late", get(|| async { "here now" }));
    let after = client::get(&server.absolute_url("/late")).await.unwrap();
    assert_eq!(after.status(), StatusCode::OK);
    assert_eq!(client::read_text(after).await.unwrap(), "here now");

    server.stop().await;
}

#[tokio::test]
async fn fallback_handles_unmatched_requests() {
    let mut server = TestServer::start().await.unwrap();
    server.fallback(|| async { (StatusCode::IM_A_TEAPOT, "teapot") });

    let resp = client::get(&server.absolute_url("/anything")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(client::read_text(resp).await.unwrap(), "teapot");

    server.stop().await;
}

#[tokio::test]
async fn merged_router_keeps_its_state() {
    #[derive(Clone)]
    struct Greeting(&'static str);

    let stateful = Router::new()
        .route(
            "/greeting",
            get(|State(g): State<Greeting>| async move { Json(serde_json::json!({ "greeting": g.0 })) }),
        )
        .with_state(Greeting("howdy"));

    let mut server = TestServer::start().await.unwrap();
    server.merge(stateful);

    let resp = client::get(&server.absolute_url("/greeting")).await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&client::read_text(resp).await.unwrap()).unwrap();
    assert_eq!(body["greeting"], "howdy");

    server.stop().await;
}

#[tokio::test]
async fn concurrent_ephemeral_servers_get_distinct_ports() {
    let (a, b) = tokio::join!(TestServer::start(), TestServer::start());
    let (mut a, mut b) = (a.unwrap(), b.unwrap());
    assert!(a.port() > 0);
    assert!(b.port() > 0);
    assert_ne!(a.port(), b.port());
    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn start_at_resolves_ephemeral_port() {
    let mut server = TestServer::start_at("localhost:").await.unwrap();
    assert!(server.port() > 0);
    assert!(server.addr().ip().is_loopback());
    assert!(server.base_url().starts_with("http://"));
    assert!(server.base_url().ends_with(&format!(":{}", server.port())));
    server.stop().await;
}

#[tokio::test]
async fn occupied_port_is_a_bind_error() {
    let mut first = TestServer::start().await.unwrap();
    let addr = format!("127.0.0.1:{}", first.port());

    let second = TestServer::start_at(&addr).await;
    assert!(matches!(second, Err(StartError::Bind { .. })));

    first.stop().await;
}

#[tokio::test]
async fn portless_address_is_a_bind_error() {
    let result = TestServer::start_at("127.0.0.1").await;
    assert!(matches!(result, Err(StartError::Bind { .. })));
}

// Best-effort: another process could grab the port between stop and restart.
#[tokio::test]
async fn port_is_released_on_stop() {
    let mut first = TestServer::start().await.unwrap();
    first.route("/hello", get(hello));
    let resp = client::get(&first.absolute_url("/hello?name=a")).await.unwrap();
    assert_eq!(client::read_text(resp).await.unwrap(), "hello a");

    let addr = format!("127.0.0.1:{}", first.port());
    first.stop().await;

    let mut second = TestServer::start_at(&addr).await.unwrap();
    assert_eq!(second.port(), first.port());
    second.stop().await;
}

#[tokio::test]
async fn requests_fail_after_stop() {
    let mut server = TestServer::start().await.unwrap();
    server.route("/hello", get(hello));
    let url = server.absolute_url("/hello");
    server.stop().await;

    // A fresh client avoids reusing a pooled keep-alive connection.
    let fresh = client::trusting_client(testserver::tls::LOCALHOST_CERT).unwrap();
    assert!(fresh.get(url.parse().unwrap()).await.is_err());
}

#[tokio::test]
async fn stop_twice_is_harmless() {
    let mut server = TestServer::start().await.unwrap();
    server.stop().await;
    server.stop().await;
    assert!(server.is_stopped());
}

#[tokio::test]
async fn background_errors_are_observable() {
    use tokio::io::AsyncWriteExt;

    let mut server = TestServer::start().await.unwrap();
    let mut errors = server.background_errors().unwrap();

    // A request line hyper cannot parse makes the connection fail.
    let mut stream = tokio::net::TcpStream::connect(server.addr()).await.unwrap();
    stream.write_all(b"\x00\x01 not http\r\n\r\n").await.unwrap();

    let err = tokio::time::timeout(std::time::Duration::from_secs(5), errors.recv())
        .await
        .expect("background error within timeout")
        .expect("channel open");
    assert!(matches!(err, testserver::BackgroundError::Connection { .. }));

    drop(stream);
    server.stop().await;
}
