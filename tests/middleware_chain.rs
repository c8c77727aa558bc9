//! Middleware ordering and at-most-once `next()` invocation.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gatewayrs::backends::BackendAdapter;
use gatewayrs::bridge::{Bridge, BridgeConfig, RequestOptions};
use gatewayrs::error::GatewayResult;
use gatewayrs::frontends::openai::{OpenAiChatRequest, OpenAiFrontend, OpenAiMessage};
use gatewayrs::ir::Response;
use gatewayrs::middleware::{Next, RequestContext, RequestMiddleware, StreamContext, StreamMiddleware, StreamNext};

use common::FakeBackend;

#[derive(Debug)]
struct RecordingMiddleware {
    label: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl RequestMiddleware for RecordingMiddleware {
    fn name(&self) -> &str {
        self.label
    }

    async fn handle(&self, context: RequestContext, next: Next<'_>) -> GatewayResult<Response> {
        self.order.lock().unwrap().push(self.label);
        next.run(context).await
    }
}

#[async_trait]
impl StreamMiddleware for RecordingMiddleware {
    fn name(&self) -> &str {
        self.label
    }

    async fn handle_stream(
        &self,
        context: StreamContext,
        next: StreamNext<'_>,
    ) -> GatewayResult<gatewayrs::backends::ChunkStream> {
        next.run(context).await
    }
}

#[derive(Debug)]
struct DoubleInvokeMiddleware;

#[async_trait]
impl RequestMiddleware for DoubleInvokeMiddleware {
    fn name(&self) -> &str {
        "double-invoke"
    }

    async fn handle(&self, context: RequestContext, next: Next<'_>) -> GatewayResult<Response> {
        let _ = next.run(context.clone()).await;
        next.run(context).await
    }
}

#[async_trait]
impl StreamMiddleware for DoubleInvokeMiddleware {
    fn name(&self) -> &str {
        "double-invoke"
    }

    async fn handle_stream(
        &self,
        context: StreamContext,
        next: StreamNext<'_>,
    ) -> GatewayResult<gatewayrs::backends::ChunkStream> {
        next.run(context).await
    }
}

fn request() -> OpenAiChatRequest {
    OpenAiChatRequest {
        model: "gpt-4".to_string(),
        messages: vec![OpenAiMessage {
            role: "user".to_string(),
            content: serde_json::json!("hi"),
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
async fn middleware_runs_in_registration_order() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::always_ok("anthropic", "ok"));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    bridge.use_middleware(Arc::new(RecordingMiddleware {
        label: "auth",
        order: order.clone(),
    }));
    bridge.use_middleware(Arc::new(RecordingMiddleware {
        label: "logging",
        order: order.clone(),
    }));

    bridge.chat(request(), RequestOptions::default()).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["auth", "logging"]);
}

#[tokio::test]
async fn calling_next_twice_is_a_middleware_error() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::new(
        "anthropic",
        vec![common::Step::Ok(common::ok_response("anthropic", "first"))],
    ));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();
    bridge.use_middleware(Arc::new(DoubleInvokeMiddleware));

    let result = bridge.chat(request(), RequestOptions::default()).await;
    let err = result.unwrap_err();
    assert_eq!(err.code, gatewayrs::error::ErrorCode::MiddlewareError);
}

#[tokio::test]
async fn remove_and_clear_middleware_affect_the_registered_names() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(FakeBackend::always_ok("anthropic", "ok"));
    let bridge = Bridge::new(OpenAiFrontend::new(), backend, BridgeConfig::default()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    bridge.use_middleware(Arc::new(RecordingMiddleware {
        label: "auth",
        order: order.clone(),
    }));
    bridge.use_middleware(Arc::new(RecordingMiddleware {
        label: "logging",
        order: order.clone(),
    }));
    assert_eq!(bridge.middleware_names(), vec!["auth", "logging"]);

    assert!(bridge.remove_middleware("auth"));
    assert_eq!(bridge.middleware_names(), vec!["logging"]);

    bridge.clear_middleware();
    assert!(bridge.middleware_names().is_empty());
}
