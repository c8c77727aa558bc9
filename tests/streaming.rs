//! Stream sequencing, accumulation, mid-stream cancellation, and the
//! Anthropic->OpenAI streaming end-to-end scenario.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use gatewayrs::backends::BackendAdapter;
use gatewayrs::bridge::{Bridge, BridgeConfig, RequestOptions};
use gatewayrs::frontends::anthropic::{AnthropicFrontend, AnthropicMessage, AnthropicMessagesRequest, AnthropicStreamEvent};
use gatewayrs::ir::{FinishReason, Message, Role, StreamChunk, TokenUsage};
use gatewayrs::streaming::{accumulate_stream, drain_with_cancellation, validate_sequence, Cancellation};

use common::Step;

fn scripted_chunks() -> Vec<gatewayrs::error::GatewayResult<StreamChunk>> {
    vec![
        Ok(StreamChunk::Start {
            sequence: 0,
            metadata: gatewayrs::ir::Metadata::new("req-stream"),
        }),
        Ok(StreamChunk::Content {
            sequence: 1,
            delta: "4".to_string(),
            role: Some(Role::Assistant),
            accumulated: None,
        }),
        Ok(StreamChunk::Content {
            sequence: 2,
            delta: "2".to_string(),
            role: None,
            accumulated: None,
        }),
        Ok(StreamChunk::Done {
            sequence: 3,
            finish_reason: FinishReason::Stop,
            usage: Some(TokenUsage::new(3, 2)),
            message: Message::assistant("42"),
        }),
    ]
}

#[test]
fn well_formed_chunk_sequence_validates() {
    let chunks: Vec<StreamChunk> = scripted_chunks().into_iter().map(Result::unwrap).collect();
    validate_sequence(&chunks).unwrap();
}

#[test]
fn out_of_order_sequence_is_rejected() {
    let chunks = vec![
        StreamChunk::Start {
            sequence: 0,
            metadata: gatewayrs::ir::Metadata::new("req"),
        },
        StreamChunk::Content {
            sequence: 2,
            delta: "x".to_string(),
            role: None,
            accumulated: None,
        },
    ];
    assert!(validate_sequence(&chunks).is_err());
}

#[tokio::test]
async fn accumulate_stream_folds_content_deltas_into_the_terminal_message() {
    let stream = futures::stream::iter(scripted_chunks());
    let (text, terminal) = accumulate_stream(stream).await.unwrap();
    assert_eq!(text, "42");
    assert!(matches!(terminal, Some(StreamChunk::Done { .. })));
}

#[tokio::test]
async fn cancellation_stops_draining_and_yields_a_stream_cancelled_error() {
    use std::time::Duration;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<gatewayrs::error::GatewayResult<StreamChunk>>();
    let stream = async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    };
    futures::pin_mut!(stream);
    let cancellation = Cancellation::new();

    tx.send(Ok(StreamChunk::Start {
        sequence: 0,
        metadata: gatewayrs::ir::Metadata::new("req"),
    }))
    .unwrap();

    let cancel_token = cancellation.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_token.cancel();
    });

    let mut observed = Vec::new();
    let result = drain_with_cancellation(stream, &cancellation, |chunk| observed.push(chunk)).await;
    canceller.await.unwrap();

    assert!(result.is_err());
    assert_eq!(
        result.unwrap_err().code,
        gatewayrs::error::ErrorCode::StreamCancelled
    );
    assert!(matches!(observed.last(), Some(StreamChunk::Error { code, .. }) if code == "stream_cancelled"));
}

fn anthropic_request() -> AnthropicMessagesRequest {
    AnthropicMessagesRequest {
        model: "claude-3-5-sonnet-20241022".to_string(),
        messages: vec![AnthropicMessage {
            role: "user".to_string(),
            content: serde_json::json!("2+2?"),
        }],
        system: None,
        max_tokens: 64,
        temperature: None,
        top_p: None,
        top_k: None,
        stop_sequences: Vec::new(),
        stream: true,
    }
}

#[tokio::test]
async fn chat_stream_re_emits_chunks_as_anthropic_dialect_events_in_order() {
    let backend: Arc<dyn BackendAdapter> =
        Arc::new(common::FakeBackend::new("anthropic", vec![Step::Stream(scripted_chunks())]));
    let bridge = Bridge::new(AnthropicFrontend::new(), backend, BridgeConfig::default()).unwrap();

    let mut stream = bridge
        .chat_stream(anthropic_request(), RequestOptions::default())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item.unwrap());
    }

    assert!(matches!(events[0], AnthropicStreamEvent::MessageStart { .. }));
    assert!(matches!(events[1], AnthropicStreamEvent::ContentBlockDelta { .. }));
    assert!(matches!(events[2], AnthropicStreamEvent::ContentBlockDelta { .. }));
    assert!(matches!(events[3], AnthropicStreamEvent::MessageDelta { .. }));
    assert!(matches!(events[4], AnthropicStreamEvent::MessageStop));
}

#[tokio::test]
async fn stream_backend_error_propagates_as_a_dialect_stream_item_error() {
    let backend: Arc<dyn BackendAdapter> = Arc::new(common::FakeBackend::new(
        "anthropic",
        vec![Step::StreamErr(gatewayrs::error::GatewayError::no_backend_available(
            "no healthy backend",
        ))],
    ));
    let bridge = Bridge::new(AnthropicFrontend::new(), backend, BridgeConfig::default()).unwrap();

    let result = bridge.chat_stream(anthropic_request(), RequestOptions::default()).await;
    let err = result.unwrap_err();
    assert_eq!(err.code, gatewayrs::error::ErrorCode::NoBackendAvailable);
}
