//! Router-level fallback determinism, parallel dispatch, and circuit
//! breaker integration, plus the fallback-chain and parallel-dispatch
//! end-to-end scenarios.

mod common;

use std::sync::Arc;
use std::time::Duration;

use gatewayrs::error::{ErrorCode, GatewayError};
use gatewayrs::router::{
    AggregationStrategy, CircuitState, FallbackStrategy, ParallelDispatchOptions, Router, RouterConfig,
};

use common::{sample_request, FakeBackend, Step};

fn retryable_error(message: &str) -> GatewayError {
    GatewayError::new(ErrorCode::ProviderError, message).with_retryable(true)
}

#[tokio::test]
async fn sequential_fallback_tries_the_chain_in_order_and_stops_on_success() {
    let config = RouterConfig {
        fallback_strategy: FallbackStrategy::Sequential,
        fallback_chain: vec!["primary".to_string(), "secondary".to_string()],
        ..Default::default()
    };
    let router = Router::new(config);

    router.register(
        "primary",
        Arc::new(FakeBackend::new("primary", vec![Step::Err(retryable_error("down"))])),
    );
    router.register(
        "secondary",
        Arc::new(FakeBackend::new(
            "secondary",
            vec![Step::Ok(common::ok_response("secondary", "ok"))],
        )),
    );

    let outcome = router.dispatch(sample_request(), Some("primary")).await.unwrap();
    assert_eq!(outcome.backend, "secondary");
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[0].backend, "primary");
    assert_eq!(outcome.attempts[1].backend, "secondary");
}

#[tokio::test]
async fn non_retryable_error_short_circuits_the_fallback_chain() {
    let config = RouterConfig {
        fallback_strategy: FallbackStrategy::Sequential,
        fallback_chain: vec!["primary".to_string(), "secondary".to_string()],
        ..Default::default()
    };
    let router = Router::new(config);

    router.register(
        "primary",
        Arc::new(FakeBackend::new(
            "primary",
            vec![Step::Err(GatewayError::invalid_request("bad request"))],
        )),
    );
    router.register(
        "secondary",
        Arc::new(FakeBackend::new(
            "secondary",
            vec![Step::Ok(common::ok_response("secondary", "ok"))],
        )),
    );

    let result = router.dispatch(sample_request(), Some("primary")).await;
    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn all_backends_failed_when_the_chain_is_exhausted() {
    let config = RouterConfig {
        fallback_strategy: FallbackStrategy::Sequential,
        fallback_chain: vec!["primary".to_string(), "secondary".to_string()],
        ..Default::default()
    };
    let router = Router::new(config);

    router.register(
        "primary",
        Arc::new(FakeBackend::new("primary", vec![Step::Err(retryable_error("down"))])),
    );
    router.register(
        "secondary",
        Arc::new(FakeBackend::new(
            "secondary",
            vec![Step::Err(retryable_error("also down"))],
        )),
    );

    let result = router.dispatch(sample_request(), Some("primary")).await;
    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::AllBackendsFailed);
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_excludes_backend_from_selection() {
    let config = RouterConfig {
        circuit_breaker_threshold: 2,
        circuit_breaker_timeout: Duration::from_secs(60),
        default_backend: Some("flaky".to_string()),
        ..Default::default()
    };
    let router = Router::new(config);
    router.register(
        "flaky",
        Arc::new(FakeBackend::new(
            "flaky",
            vec![
                Step::Err(retryable_error("1")),
                Step::Err(retryable_error("2")),
            ],
        )),
    );
    router.register(
        "steady",
        Arc::new(FakeBackend::new(
            "steady",
            vec![
                Step::Ok(common::ok_response("steady", "ok")),
            ],
        )),
    );

    let _ = router.dispatch(sample_request(), Some("flaky")).await;
    let _ = router.dispatch(sample_request(), Some("flaky")).await;

    let info = router.backend_info("flaky").unwrap();
    assert_eq!(info.circuit_state, CircuitState::Open);

    // selection now skips the open-circuit "flaky" backend entirely.
    let outcome = router.dispatch(sample_request(), Some("flaky")).await.unwrap();
    assert_eq!(outcome.backend, "steady");
}

#[tokio::test]
async fn parallel_dispatch_all_collects_every_backend_response() {
    let router = Router::new(RouterConfig::default());
    router.register(
        "a",
        Arc::new(FakeBackend::new("a", vec![Step::Ok(common::ok_response("a", "from a"))])),
    );
    router.register(
        "b",
        Arc::new(FakeBackend::new(
            "b",
            vec![Step::Err(GatewayError::invalid_request("b failed"))],
        )),
    );

    let options = ParallelDispatchOptions {
        strategy: AggregationStrategy::All,
        cancel_on_first_success: false,
        ..Default::default()
    };
    let result = router.dispatch_parallel(sample_request(), options).await.unwrap();

    assert_eq!(result.all_responses.len(), 2);
    assert_eq!(result.successful_backends, vec!["a".to_string()]);
    assert_eq!(result.failed_backends, vec!["b".to_string()]);
    assert!(result.response.is_some());
}

#[tokio::test]
async fn weight_is_surfaced_on_backend_info_and_defaults_to_one() {
    let router = Router::new(RouterConfig::default());
    router.register("default-weight", Arc::new(FakeBackend::always_ok("default-weight", "ok")));
    router.register_with_weight(
        "heavy",
        Arc::new(FakeBackend::always_ok("heavy", "ok")),
        3.5,
    );

    assert_eq!(router.backend_info("default-weight").unwrap().weight, 1.0);
    assert_eq!(router.backend_info("heavy").unwrap().weight, 3.5);
}
