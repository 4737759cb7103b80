//! Round-trip tests for the validation client against a loopback endpoint.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::{Value, json};
use url::Url;
use vouch_config::WidgetConfig;
use vouch_core::{TokenValidator, ValidationClient};
use vouch_model::{Token, ValidationOutcome};

async fn serve(router: axum::Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    Url::parse(&format!("http://{addr}/validate")).expect("endpoint url")
}

fn client_for(endpoint: Url, timeout: Duration) -> ValidationClient {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mut config = WidgetConfig::new(endpoint);
    config.request_timeout = timeout;
    ValidationClient::new(&config).expect("client")
}

fn token() -> Token {
    Token::parse("vch_round_trip").expect("token")
}

#[tokio::test]
async fn a_confirmed_response_carries_the_full_payload() {
    // Echo request fields back so the body shape is verified end to end.
    let router = axum::Router::new().route(
        "/validate",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "status": "confirmed",
                "name": "Jane",
                "echo_token": body["token"],
                "echo_source": body["source"],
                "echo_has_ts": body.get("ts").is_some(),
                "echo_has_ua": body.get("ua").is_some(),
            }))
        }),
    );
    let client = client_for(serve(router).await, Duration::from_secs(2));

    match client.validate(token()).await {
        ValidationOutcome::Confirmed(response) => {
            assert_eq!(response.name.as_deref(), Some("Jane"));
            assert_eq!(response.extra["echo_token"], json!("vch_round_trip"));
            assert_eq!(response.extra["echo_source"], json!("vouch-widget"));
            assert_eq!(response.extra["echo_has_ts"], json!(true));
            assert_eq!(response.extra["echo_has_ua"], json!(true));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn a_denied_response_maps_with_its_reason() {
    let router = axum::Router::new().route(
        "/validate",
        post(|| async { Json(json!({"status": "denied", "reason": "expired"})) }),
    );
    let client = client_for(serve(router).await, Duration::from_secs(2));

    assert_eq!(
        client.validate(token()).await,
        ValidationOutcome::Denied {
            reason: Some("expired".to_owned())
        }
    );
}

#[tokio::test]
async fn an_unknown_status_is_malformed() {
    let router = axum::Router::new().route(
        "/validate",
        post(|| async { Json(json!({"status": "unknown"})) }),
    );
    let client = client_for(serve(router).await, Duration::from_secs(2));

    assert_eq!(client.validate(token()).await, ValidationOutcome::Malformed);
}

#[tokio::test]
async fn a_non_success_status_reports_its_code() {
    let router = axum::Router::new().route(
        "/validate",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let client = client_for(serve(router).await, Duration::from_secs(2));

    assert_eq!(
        client.validate(token()).await,
        ValidationOutcome::NetworkFailure("bad_status_500".to_owned())
    );
}

#[tokio::test]
async fn the_deadline_wins_over_a_slow_endpoint() {
    let router = axum::Router::new().route(
        "/validate",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Json(json!({"status": "confirmed"}))
        }),
    );
    let client = client_for(serve(router).await, Duration::from_millis(50));

    assert_eq!(
        client.validate(token()).await,
        ValidationOutcome::NetworkFailure("timeout".to_owned())
    );
}

#[tokio::test]
async fn an_unparseable_body_is_a_network_failure() {
    let router = axum::Router::new().route("/validate", post(|| async { "plainly not json" }));
    let client = client_for(serve(router).await, Duration::from_secs(2));

    match client.validate(token()).await {
        ValidationOutcome::NetworkFailure(detail) => {
            assert_ne!(detail, "timeout");
            assert!(!detail.starts_with("bad_status_"), "{detail}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn an_unreachable_endpoint_is_a_network_failure() {
    // Bind then immediately drop the listener so the port refuses.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let endpoint = Url::parse(&format!("http://{addr}/validate")).expect("endpoint url");
    let client = client_for(endpoint, Duration::from_secs(2));

    assert!(matches!(
        client.validate(token()).await,
        ValidationOutcome::NetworkFailure(_)
    ));
}
