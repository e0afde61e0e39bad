//! End-to-end tests of the HTTP routes against a mocked xkcd upstream.
#![cfg(feature = "server")]

use std::net::SocketAddr;

use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use heimdall::client::HttpClientConfig;
use heimdall::config::Config;
use heimdall::server::{self, ErrorMessage};
use heimdall::xkcd::{XKCD_HTTP_CLIENT, Xkcd};

async fn start(upstream: &MockServer) -> SocketAddr {
    let mut config = Config::default();
    config.http_client.insert(
        XKCD_HTTP_CLIENT.to_string(),
        HttpClientConfig::new(upstream.uri()),
    );
    let state = server::build_state(&config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state));
    addr
}

async fn upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/info.0.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "num": 1,
            "title": "Barrel - Part 1",
            "safe_title": "Barrel - Part 1",
            "img": "https://imgs.xkcd.com/comics/barrel_cropped_(1).jpg",
            "month": "1",
            "year": "2006",
            "transcript": "[[A boy sits in a barrel which is floating in an ocean.]]"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/4242/info.0.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/500/info.0.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn comic_route_returns_comic() {
    let upstream = upstream().await;
    let addr = start(&upstream).await;

    for route in ["comic", "comic-mono"] {
        let response = reqwest::get(format!("http://{addr}/v1/{route}/1")).await.unwrap();
        assert_eq!(response.status(), 200);
        let comic: Xkcd = response.json().await.unwrap();
        assert_eq!(comic.num, 1);
        assert_eq!(comic.title, "Barrel - Part 1");
    }
}

#[tokio::test]
async fn missing_comic_is_not_found_with_route_message() {
    let upstream = upstream().await;
    let addr = start(&upstream).await;

    let response = reqwest::get(format!("http://{addr}/v1/comic/4242")).await.unwrap();
    assert_eq!(response.status(), 404);
    let body: ErrorMessage = response.json().await.unwrap();
    assert_eq!(
        body,
        ErrorMessage {
            message: "Comic with id= 4242 cannot be found in XKCD".into(),
            status: 404,
        }
    );

    let response = reqwest::get(format!("http://{addr}/v1/comic-mono/4242"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: ErrorMessage = response.json().await.unwrap();
    assert_eq!(body.message, "Comic with id= 4242 NOT FOUND!");
}

#[tokio::test]
async fn non_numeric_id_is_bad_request() {
    let upstream = upstream().await;
    let addr = start(&upstream).await;

    let response = reqwest::get(format!("http://{addr}/v1/comic/abc")).await.unwrap();
    assert_eq!(response.status(), 400);
    let body: ErrorMessage = response.json().await.unwrap();
    assert_eq!(body.status, 400);
    assert!(upstream.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn upstream_fault_is_internal_error() {
    let upstream = upstream().await;
    let addr = start(&upstream).await;

    let response = reqwest::get(format!("http://{addr}/v1/comic-mono/500")).await.unwrap();
    assert_eq!(response.status(), 500);
    let body: ErrorMessage = response.json().await.unwrap();
    assert_eq!(body.status, 500);
}

#[tokio::test]
async fn metrics_route_exposes_controller_timers() {
    let upstream = upstream().await;
    let addr = start(&upstream).await;

    reqwest::get(format!("http://{addr}/v1/comic/1")).await.unwrap();
    reqwest::get(format!("http://{addr}/v1/comic-mono/4242")).await.unwrap();

    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/plain")));
    let text = response.text().await.unwrap();

    assert!(text.contains(
        "GET_COMIC_BY_ID_CONTROLLER_statistic_seconds_count{service=\"GET_COMIC_BY_ID_CONTROLLER\"} 1"
    ));
    assert!(text.contains(
        "GET_COMIC_BY_ID_MONO_CONTROLLER_statistic_seconds_count{service=\"GET_COMIC_BY_ID_MONO_CONTROLLER\",status=\"error\"} 1"
    ));
    assert!(text.contains(
        "service_getComicByIdAsMono_statistic_seconds_count{service=\"service.getComicByIdAsMono\",status=\"complete\"} 1"
    ));
    assert!(text.contains("XKCD_GET_COMIC_INFO_BY_ID_statistic_seconds_bucket"));

    assert!(text.contains(
        "heimdall_circuit_breaker_state{name=\"XKCD_GET_COMIC_INFO_BY_ID\",state=\"closed\"} 1"
    ));
    // The 404 is ignored by the breaker, so only the success is buffered.
    assert!(text.contains(
        "heimdall_circuit_breaker_buffered_calls{name=\"XKCD_GET_COMIC_INFO_BY_ID\"} 1"
    ));
    assert!(text.contains(
        "heimdall_circuit_breaker_failed_calls{name=\"XKCD_GET_COMIC_INFO_BY_ID\"} 0"
    ));
    assert!(text.contains(
        "heimdall_circuit_breaker_not_permitted_calls{name=\"XKCD_GET_COMIC_INFO_BY_ID\"} 0"
    ));
}

#[tokio::test]
async fn metrics_route_reports_upstream_failures_against_breaker() {
    let upstream = upstream().await;
    let addr = start(&upstream).await;

    for _ in 0..3 {
        let response = reqwest::get(format!("http://{addr}/v1/comic/500")).await.unwrap();
        assert_eq!(response.status(), 500);
    }

    let text = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(
        "heimdall_circuit_breaker_failed_calls{name=\"XKCD_GET_COMIC_INFO_BY_ID\"} 3"
    ));
    assert!(text.contains(
        "heimdall_circuit_breaker_failure_rate{name=\"XKCD_GET_COMIC_INFO_BY_ID\"} -1"
    ));
}
