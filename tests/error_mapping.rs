//! HTTP-status to `GatewayError` category mapping.

use gatewayrs::error::{ErrorCategory, ErrorCode, GatewayError};

#[test]
fn maps_401_to_invalid_api_key_authentication() {
    let err = GatewayError::from_http(401, "Unauthorized", "");
    assert_eq!(err.code, ErrorCode::InvalidApiKey);
    assert_eq!(err.category(), ErrorCategory::Authentication);
}

#[test]
fn maps_403_to_insufficient_permissions_authorization() {
    let err = GatewayError::from_http(403, "Forbidden", "");
    assert_eq!(err.code, ErrorCode::InsufficientPermissions);
    assert_eq!(err.category(), ErrorCategory::Authorization);
}

#[test]
fn maps_429_to_rate_limit_exceeded_and_parses_retry_after_from_body() {
    let body = r#"{"error": {"retry_after": 17}}"#;
    let err = GatewayError::from_http(429, "Too Many Requests", body);
    assert_eq!(err.code, ErrorCode::RateLimitExceeded);
    assert_eq!(err.category(), ErrorCategory::RateLimit);
    assert!(err.is_retryable);
    assert_eq!(err.rate_limit.as_ref().unwrap().retry_after, Some(17));
}

#[test]
fn maps_400_to_invalid_request_validation() {
    let err = GatewayError::from_http(400, "Bad Request", "missing field");
    assert_eq!(err.code, ErrorCode::InvalidRequest);
    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[test]
fn maps_5xx_to_retryable_provider_error() {
    let err = GatewayError::from_http(503, "Service Unavailable", "");
    assert_eq!(err.code, ErrorCode::ProviderError);
    assert_eq!(err.category(), ErrorCategory::Provider);
    assert!(err.is_retryable);
}

#[test]
fn maps_unrecognized_4xx_to_non_retryable_provider_error() {
    let err = GatewayError::from_http(418, "I'm a teapot", "");
    assert_eq!(err.code, ErrorCode::ProviderError);
    assert!(!err.is_retryable);
}

#[test]
fn all_backends_failed_wraps_the_last_cause_and_names_every_attempt() {
    let cause = GatewayError::new(ErrorCode::ProviderError, "last failure");
    let err = GatewayError::all_backends_failed(&["a".to_string(), "b".to_string()], cause);
    assert_eq!(err.code, ErrorCode::AllBackendsFailed);
    assert!(err.message.contains('a'));
    assert!(err.message.contains('b'));
    assert!(err.cause.is_some());
}
