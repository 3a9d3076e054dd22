//! Integration tests for the health endpoint.

mod common;

use axum::http::{Method, StatusCode};

#[tokio::test]
async fn test_health_reports_ok_and_storage_without_identity() {
    // Arrange
    let application = common::build_test_application();

    // Act
    let (status, json) = common::send_as(
        common::router(&application),
        None,
        Method::GET,
        "/health",
        None,
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["storage"], "memory");
}
