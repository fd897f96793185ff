// Error display and HTTP status mapping tests
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::IntoResponse;
use promptcache::error::StoreError;

#[test]
fn test_error_display_messages() {
    let errors = vec![
        StoreError::NotInitialized,
        StoreError::InvalidTtl("7x".to_string()),
        StoreError::InvalidStrategy("upsert".to_string()),
        StoreError::InvalidBackend("postgres".to_string()),
        StoreError::Config("bad port".to_string()),
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
        StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_not_initialized_names_the_fix() {
    let display = format!("{}", StoreError::NotInitialized);
    assert!(display.contains("promptcache init"));
}

#[test]
fn test_invalid_ttl_error() {
    let error = StoreError::InvalidTtl("5 weeks".to_string());
    let display = format!("{}", error);
    assert!(display.contains("5 weeks"));
    assert!(display.contains("d|h|m|s"), "message should name the accepted units");
}

#[test]
fn test_invalid_strategy_error() {
    let error = StoreError::InvalidStrategy("upsert".to_string());
    let display = format!("{}", error);
    assert!(display.contains("upsert"));
    assert!(display.contains("skip-existing"));
}

#[test]
fn test_invalid_backend_error() {
    let error = StoreError::InvalidBackend("postgres".to_string());
    let display = format!("{}", error);
    assert!(display.contains("postgres"));
    assert!(display.contains("json"));
    assert!(display.contains("sqlite"));
}

#[test]
fn test_config_error() {
    let error = StoreError::Config("server.port must be a number".to_string());
    assert!(format!("{}", error).contains("server.port must be a number"));
}

#[test]
fn test_snapshot_error_wraps_serde() {
    let parse_failure = serde_json::from_str::<serde_json::Value>("{ not json").unwrap_err();
    let error = StoreError::Snapshot(parse_failure);
    assert!(format!("{}", error).contains("snapshot"));
}

#[test]
fn test_not_initialized_maps_to_service_unavailable() {
    let response = StoreError::NotInitialized.into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn test_invalid_input_maps_to_bad_request() {
    let errors = vec![
        StoreError::InvalidTtl("7x".to_string()),
        StoreError::InvalidStrategy("upsert".to_string()),
        StoreError::InvalidBackend("postgres".to_string()),
    ];
    for error in errors {
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}

#[test]
fn test_internal_failures_map_to_500() {
    let errors = vec![
        StoreError::Config("bad".to_string()),
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
        StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows),
    ];
    for error in errors {
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
