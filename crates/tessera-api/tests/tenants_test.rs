//! Integration tests for the tenant routes.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

async fn create(application: &tessera_api::bootstrap::Application, name: &str) -> String {
    let (status, json) = common::post_json(
        common::router(application),
        "/api/v1/tenants",
        &json!({ "name": name }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn test_create_then_get_round_trip() {
    // Arrange
    let application = common::build_test_application();

    // Act
    let (status, created) = common::post_json(
        common::router(&application),
        "/api/v1/tenants",
        &json!({ "name": "  Acme  ", "plan": "standard" }),
    )
    .await;
    let id = created["id"].as_str().unwrap();
    let (get_status, fetched) =
        common::get_json(common::router(&application), &format!("/api/v1/tenants/{id}")).await;

    // Assert
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Acme");
    assert_eq!(created["plan"], "standard");
    assert_eq!(created["status"], "active");
    assert_eq!(created["version"], 1);
    assert_eq!(created["createdAt"], "2026-01-15T10:00:00Z");
    assert_eq!(get_status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_create_with_invalid_body_lists_every_field() {
    let application = common::build_test_application();

    let (status, json) = common::post_json(
        common::router(&application),
        "/api/v1/tenants",
        &json!({ "name": "", "plan": "gold" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_failed");
    let fields: Vec<&str> = json["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "plan"]);
}

#[tokio::test]
async fn test_anonymous_caller_is_forbidden() {
    let application = common::build_test_application();

    let (status, json) = common::send_as(
        common::router(&application),
        None,
        Method::POST,
        "/api/v1/tenants",
        Some(&json!({ "name": "Acme" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "permission_denied");
}

#[tokio::test]
async fn test_get_unknown_tenant_returns_404() {
    let application = common::build_test_application();

    let (status, json) =
        common::get_json(common::router(&application), "/api/v1/tenants/missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[tokio::test]
async fn test_lifecycle_through_http() {
    // Arrange
    let application = common::build_test_application();
    let id = create(&application, "Acme").await;
    let base = format!("/api/v1/tenants/{id}");

    // Act
    let (rename_status, renamed) = common::post_json(
        common::router(&application),
        &format!("{base}/rename"),
        &json!({ "name": "Acme Corp" }),
    )
    .await;
    let (plan_status, upgraded) = common::post_json(
        common::router(&application),
        &format!("{base}/plan"),
        &json!({ "plan": "enterprise" }),
    )
    .await;
    let (suspend_status, suspended) = common::post_json(
        common::router(&application),
        &format!("{base}/suspend"),
        &json!({ "reason": "unpaid invoice" }),
    )
    .await;
    let (reactivate_status, reactivated) = common::send_as(
        common::router(&application),
        Some(common::USER),
        Method::POST,
        &format!("{base}/reactivate"),
        None,
    )
    .await;
    let (delete_status, deleted) = common::send_as(
        common::router(&application),
        Some(common::USER),
        Method::DELETE,
        &base,
        None,
    )
    .await;

    // Assert
    assert_eq!(rename_status, StatusCode::OK);
    assert_eq!(renamed["name"], "Acme Corp");
    assert_eq!(plan_status, StatusCode::OK);
    assert_eq!(upgraded["plan"], "enterprise");
    assert_eq!(suspend_status, StatusCode::OK);
    assert_eq!(suspended["status"], "suspended");
    assert_eq!(reactivate_status, StatusCode::OK);
    assert_eq!(reactivated["status"], "active");
    assert_eq!(delete_status, StatusCode::OK);
    assert_eq!(deleted["status"], "deleted");
    assert_eq!(deleted["version"], 6);
}

#[tokio::test]
async fn test_rename_to_same_name_adds_no_event() {
    let application = common::build_test_application();
    let id = create(&application, "Acme").await;

    let (status, json) = common::post_json(
        common::router(&application),
        &format!("/api/v1/tenants/{id}/rename"),
        &json!({ "name": "Acme" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 1);
}

#[tokio::test]
async fn test_change_on_deleted_tenant_is_rejected() {
    // Arrange
    let application = common::build_test_application();
    let id = create(&application, "Acme").await;
    common::send_as(
        common::router(&application),
        Some(common::USER),
        Method::DELETE,
        &format!("/api/v1/tenants/{id}"),
        None,
    )
    .await;

    // Act
    let (status, json) = common::post_json(
        common::router(&application),
        &format!("/api/v1/tenants/{id}/rename"),
        &json!({ "name": "Phoenix" }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_list_reflects_published_events() {
    // Arrange
    let application = common::build_test_application();
    create(&application, "Globex").await;
    create(&application, "Acme").await;

    // Act
    let (_, before) = common::get_json(common::router(&application), "/api/v1/tenants").await;
    application.publisher.tick_once().await.unwrap();
    let (status, after) = common::get_json(common::router(&application), "/api/v1/tenants").await;
    let (_, suspended) = common::get_json(
        common::router(&application),
        "/api/v1/tenants?status=suspended",
    )
    .await;

    // Assert
    assert_eq!(before, json!([]));
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = after
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Acme", "Globex"]);
    assert_eq!(suspended, json!([]));
}
