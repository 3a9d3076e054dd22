//! Shared helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::TimeZone;
use http_body_util::BodyExt;
use tessera_api::bootstrap::{self, Application, Storage};
use tessera_api::identity::{REQUEST_ID_HEADER, USER_ID_HEADER};
use tessera_api::routes;
use tessera_core::clock::SharedClock;
use tessera_cqrs::PipelineConfig;
use tessera_messaging::PublisherConfig;
use tessera_test_support::FixedClock;
use tower::ServiceExt;

pub const USER: &str = "u-1";

fn fixed_clock() -> SharedClock {
    Arc::new(FixedClock(
        chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Wires the application over in-memory storage with the standard pipeline.
pub fn build_test_application() -> Application {
    let clock = fixed_clock();
    bootstrap::build(
        Storage::in_memory(&clock),
        clock,
        &PipelineConfig::default(),
        PublisherConfig::default(),
    )
    .unwrap()
}

/// The router the binary serves, over `application`.
pub fn router(application: &Application) -> Router {
    routes::app(application.state.clone())
}

/// Sends a request as `user` (anonymous when `None`) and returns status and
/// JSON body. An empty body reads as `null`.
pub async fn send_as(
    app: Router,
    user: Option<&str>,
    method: Method,
    uri: &str,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(REQUEST_ID_HEADER, "r-test");
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_as(app, Some(USER), Method::POST, uri, Some(body)).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send_as(app, Some(USER), Method::GET, uri, None).await
}
