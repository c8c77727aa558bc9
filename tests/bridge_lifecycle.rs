//! Bridge-level lifecycle: round trip, provenance, events, stats, plus the
//! OpenAI->Anthropic non-streaming end-to-end scenario.

mod common;

use std::sync::Arc;
use std::time::Duration;

use gatewayrs::backends::BackendAdapter;
use gatewayrs::bridge::{Bridge, BridgeConfig, BridgeEvent, RequestOptions};
use gatewayrs::frontends::openai::{OpenAiChatRequest, OpenAiFrontend, OpenAiMessage};

use common::FakeBackend;

fn request(content: &str) -> OpenAiChatRequest {
    OpenAiChatRequest {
        model: "gpt-4".to_string(),
        messages: vec![OpenAiMessage {
            role: "user".to_string(),
            content: serde_json::json!(content),
            name: None,
        }],
        temperature: None,
        max_tokens: None,
        top_p: None,
        frequency_penalty: None,
        presence_penalty: None,
        stop: Vec::new(),
        seed: None,
        user: None,
        stream: false,
    }
}

#[tokio::test]
async fn chat_round_trips_through_a_fake_anthropic_backend() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::always_ok("anthropic", "4"));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();

    let response = bridge.chat(request("2+2?"), RequestOptions::default()).await.unwrap();
    assert_eq!(response.choices[0].message.content, serde_json::json!("4"));
    assert_eq!(response.choices[0].finish_reason, "stop");
}

#[tokio::test]
async fn successful_request_publishes_start_then_success_events() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::always_ok("anthropic", "hi"));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();
    let mut events = bridge.subscribe();

    bridge.chat(request("hi"), RequestOptions::default()).await.unwrap();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, BridgeEvent::RequestStart { .. }));
    let second = events.recv().await.unwrap();
    assert!(matches!(second, BridgeEvent::RequestSuccess { .. }));
    assert_eq!(first.request_id(), second.request_id());
}

#[tokio::test]
async fn failed_request_publishes_request_error_with_matching_id() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::new(
        "anthropic",
        vec![common::Step::Err(gatewayrs::error::GatewayError::invalid_request("bad input"))],
    ));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();
    let mut events = bridge.subscribe();

    let result = bridge.chat(request("hi"), RequestOptions::default()).await;
    assert!(result.is_err());

    let start = events.recv().await.unwrap();
    let err_event = events.recv().await.unwrap();
    match err_event {
        BridgeEvent::RequestError { request_id, error } => {
            assert_eq!(request_id, start.request_id());
            assert_eq!(error.code, gatewayrs::error::ErrorCode::InvalidRequest);
        }
        other => panic!("expected RequestError, got {other:?}"),
    }
}

#[tokio::test]
async fn stats_accumulate_across_calls_and_reset_is_idempotent() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::new(
        "anthropic",
        vec![
            common::Step::Ok(common::ok_response("anthropic", "a")),
            common::Step::Ok(common::ok_response("anthropic", "b")),
            common::Step::Err(gatewayrs::error::GatewayError::invalid_request("bad")),
        ],
    ));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();

    bridge.chat(request("a"), RequestOptions::default()).await.unwrap();
    bridge.chat(request("b"), RequestOptions::default()).await.unwrap();
    let _ = bridge.chat(request("c"), RequestOptions::default()).await;

    let snapshot = bridge.stats();
    assert_eq!(snapshot.total_requests, 3);
    assert_eq!(snapshot.successful_requests, 2);
    assert_eq!(snapshot.failed_requests, 1);

    bridge.reset_stats();
    bridge.reset_stats();
    let reset = bridge.stats();
    assert_eq!(reset.total_requests, 0);
    assert_eq!(reset.successful_requests, 0);
    assert_eq!(reset.failed_requests, 0);
}

#[tokio::test]
async fn per_call_timeout_surfaces_as_provider_timeout() {
    #[derive(Debug)]
    struct SlowBackend;
    #[async_trait::async_trait]
    impl BackendAdapter for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }
        fn capabilities(&self) -> &gatewayrs::ir::Capabilities {
            use std::sync::OnceLock;
            static CAPS: OnceLock<gatewayrs::ir::Capabilities> = OnceLock::new();
            CAPS.get_or_init(|| {
                gatewayrs::ir::Capabilities::minimal(gatewayrs::ir::SystemMessageStrategy::InMessages)
            })
        }
        async fn execute(&self, _request: gatewayrs::ir::Request) -> gatewayrs::error::GatewayResult<gatewayrs::ir::Response> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(common::ok_response("slow", "too late"))
        }
    }

    let backend: Arc<dyn BackendAdapter> = Arc::new(SlowBackend);
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();
    let options = RequestOptions {
        timeout: Some(Duration::from_millis(10)),
        ..Default::default()
    };

    let result = bridge.chat(request("hi"), options).await;
    let err = result.unwrap_err();
    assert_eq!(err.code, gatewayrs::error::ErrorCode::ProviderTimeout);
}
