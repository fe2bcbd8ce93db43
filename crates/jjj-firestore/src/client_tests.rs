//! Tests for error mapping and client configuration.

use std::time::Duration;

use serial_test::serial;

use crate::client::FirestoreConfig;
use crate::error::FirestoreError;

fn clear_env() {
    for var in [
        "GCP_PROJECT_ID",
        "FIREBASE_PROJECT_ID",
        "FIRESTORE_DATABASE_ID",
        "FIRESTORE_EMULATOR_HOST",
        "FIRESTORE_CONNECT_TIMEOUT_SECS",
        "FIRESTORE_RETRY_BASE_MS",
        "FIRESTORE_RETRY_MAX_MS",
        "FIRESTORE_MAX_RETRIES",
    ] {
        std::env::remove_var(var);
    }
}

// =============================================================================
// Error Type Tests
// =============================================================================

#[test]
fn test_error_from_http_status_mapping() {
    assert!(matches!(
        FirestoreError::from_http_status(401, "expired"),
        FirestoreError::AuthError(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(403, "denied"),
        FirestoreError::PermissionDenied(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(404, "missing"),
        FirestoreError::NotFound(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(409, "conflict"),
        FirestoreError::AlreadyExists(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(429, "slow down"),
        FirestoreError::RateLimited(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(503, "unavailable"),
        FirestoreError::ServerError(503, _)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(400, "bad request"),
        FirestoreError::RequestFailed(_)
    ));
}

#[test]
fn test_only_transient_errors_are_retryable() {
    assert!(FirestoreError::from_http_status(500, "x").is_retryable());
    assert!(FirestoreError::from_http_status(429, "x").is_retryable());
    assert!(!FirestoreError::from_http_status(400, "x").is_retryable());
    assert!(!FirestoreError::from_http_status(404, "x").is_retryable());
    assert!(!FirestoreError::from_http_status(409, "x").is_retryable());
    assert!(!FirestoreError::NotConfigured("x".into()).is_retryable());
}

#[test]
fn test_error_http_status_getter() {
    assert_eq!(FirestoreError::RateLimited(1000).http_status(), Some(429));
    assert_eq!(
        FirestoreError::ServerError(502, "bad gateway".into()).http_status(),
        Some(502)
    );
    assert_eq!(FirestoreError::NotFound("doc".into()).http_status(), Some(404));
    assert_eq!(
        FirestoreError::NotConfigured("no project".into()).http_status(),
        Some(503)
    );
}

#[test]
fn test_error_retry_after_ms() {
    assert_eq!(FirestoreError::RateLimited(5000).retry_after_ms(), Some(5000));
    assert_eq!(
        FirestoreError::ServerError(500, "error".into()).retry_after_ms(),
        None
    );
}

#[test]
fn test_unavailable_classification() {
    assert!(FirestoreError::NotConfigured("x".into()).is_unavailable());
    assert!(FirestoreError::Unavailable("x".into()).is_unavailable());
    assert!(FirestoreError::auth_error("x").is_unavailable());
    assert!(!FirestoreError::not_found("x").is_unavailable());
}

#[test]
fn test_precondition_detection() {
    assert!(FirestoreError::PreconditionFailed("x".into()).is_precondition_failed());
    assert!(FirestoreError::request_failed("status FAILED_PRECONDITION").is_precondition_failed());
    assert!(!FirestoreError::request_failed("bad field").is_precondition_failed());
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
#[serial]
fn test_config_validates_empty_project_id() {
    clear_env();
    std::env::set_var("GCP_PROJECT_ID", "");
    let result = FirestoreConfig::from_env();
    assert!(matches!(result, Err(FirestoreError::NotConfigured(_))));
}

#[test]
#[serial]
fn test_config_accepts_firebase_project_id() {
    clear_env();
    std::env::set_var("FIREBASE_PROJECT_ID", "firebase-project");
    let config = FirestoreConfig::from_env().unwrap();
    assert_eq!(config.project_id, "firebase-project");
}

#[test]
#[serial]
fn test_config_prefers_gcp_project_id() {
    clear_env();
    std::env::set_var("GCP_PROJECT_ID", "gcp-project");
    std::env::set_var("FIREBASE_PROJECT_ID", "firebase-project");
    let config = FirestoreConfig::from_env().unwrap();
    assert_eq!(config.project_id, "gcp-project");
}

#[test]
#[serial]
fn test_config_parses_timeout_and_retry_env_vars() {
    clear_env();
    std::env::set_var("GCP_PROJECT_ID", "test");
    std::env::set_var("FIRESTORE_CONNECT_TIMEOUT_SECS", "15");
    std::env::set_var("FIRESTORE_RETRY_BASE_MS", "50");
    std::env::set_var("FIRESTORE_RETRY_MAX_MS", "2000");
    std::env::set_var("FIRESTORE_MAX_RETRIES", "1");
    let config = FirestoreConfig::from_env().unwrap();
    assert_eq!(config.connect_timeout, Duration::from_secs(15));
    assert_eq!(config.retry.base_delay_ms, 50);
    assert_eq!(config.retry.max_delay_ms, 2000);
    assert_eq!(config.retry.max_retries, 1);
    clear_env();
}

#[test]
#[serial]
fn test_config_handles_invalid_env_values() {
    clear_env();
    std::env::set_var("GCP_PROJECT_ID", "test");
    std::env::set_var("FIRESTORE_CONNECT_TIMEOUT_SECS", "not-a-number");
    let config = FirestoreConfig::from_env().unwrap();
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    clear_env();
}

#[test]
#[serial]
fn test_config_reads_emulator_host() {
    clear_env();
    std::env::set_var("GCP_PROJECT_ID", "demo");
    std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
    std::env::set_var("FIRESTORE_DATABASE_ID", "studio");
    let config = FirestoreConfig::from_env().unwrap();
    assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));
    assert_eq!(config.database_id, "studio");
    clear_env();
}
