mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{clears_cookie, cookie_assignment, test_router};

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn login_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn login_sets_cookies_and_returns_token() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/login"))
        .and(header_matcher("cache-control", "no-store"))
        .and(body_string_contains("identifier=bob"))
        .and(body_string_contains("password=pw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok123",
            "role": "admin",
            "user": { "id": "1", "identifier": "bob" },
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = test_router(&upstream.uri(), &upstream.uri());
    let response = app
        .oneshot(login_request(json!({ "identifier": "bob", "password": "pw" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        cookie_assignment(&response, "access_token").as_deref(),
        Some("tok123")
    );
    assert_eq!(
        cookie_assignment(&response, "client_access_token").as_deref(),
        Some("tok123")
    );
    assert_eq!(
        cookie_assignment(&response, "user_role").as_deref(),
        Some("admin")
    );
    assert_eq!(
        cookie_assignment(&response, "user_id").as_deref(),
        Some("1")
    );

    let body = json_body(response).await;
    assert_eq!(body["access_token"], "tok123");
}

#[tokio::test]
async fn login_with_missing_password_never_reaches_upstream() {
    let upstream = MockServer::start().await;
    let app = test_router(&upstream.uri(), &upstream.uri());

    let response = app
        .oneshot(login_request(json!({ "identifier": "bob" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_failure_sets_no_cookies() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .mount(&upstream)
        .await;

    let app = test_router(&upstream.uri(), &upstream.uri());
    let response = app
        .oneshot(login_request(json!({ "identifier": "bob", "password": "nope" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(cookie_assignment(&response, "access_token").is_none());

    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn register_conflict_maps_to_user_already_exists() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/register"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "detail": "duplicate" })))
        .mount(&upstream)
        .await;

    let app = test_router(&upstream.uri(), &upstream.uri());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "identifier": "bob", "password": "pw" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "User already exists");
}

#[tokio::test]
async fn logout_clears_cookies_even_when_upstream_is_down() {
    // No mock mounted: upstream revocation 404s, logout must still succeed.
    let upstream = MockServer::start().await;
    let app = test_router(&upstream.uri(), &upstream.uri());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, "access_token=tok123; user_role=admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(clears_cookie(&response, "access_token"));
    assert!(clears_cookie(&response, "refresh_token"));
    assert!(clears_cookie(&response, "user_role"));
}

#[tokio::test]
async fn logout_twice_is_idempotent() {
    let upstream = MockServer::start().await;
    let app = test_router(&upstream.uri(), &upstream.uri());

    let logout = || {
        Request::builder()
            .method("POST")
            .uri("/api/auth/logout")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(logout()).await.unwrap();
    let second = app.oneshot(logout()).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    // Clearing an already-empty store must leave the same empty state.
    for name in ["access_token", "client_access_token", "refresh_token", "user_id"] {
        assert_eq!(clears_cookie(&first, name), clears_cookie(&second, name));
    }
}
