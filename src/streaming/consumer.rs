//! Consumer-side stream helpers: cancellation-aware draining and
//! accumulated-mode collection, used by the Bridge's `chat_stream` path and
//! by tests.

use futures::{Stream, StreamExt};

use super::Cancellation;
use crate::error::{GatewayError, GatewayResult};
use crate::ir::StreamChunk;

/// Pulls chunks from `stream` until it ends or `cancellation` fires,
/// invoking `on_chunk` for each one. On cancellation, stops pulling (the
/// producer is expected to notice the same token and release its reader)
/// and returns a synthetic `stream_cancelled` chunk as the final item; no
/// further chunks are emitted downstream of the cancellation point.
pub async fn drain_with_cancellation<S, F>(
    mut stream: S,
    cancellation: &Cancellation,
    mut on_chunk: F,
) -> GatewayResult<()>
where
    S: Stream<Item = GatewayResult<StreamChunk>> + Unpin,
    F: FnMut(StreamChunk),
{
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                on_chunk(StreamChunk::Error {
                    sequence: u64::MAX,
                    code: "stream_cancelled".to_string(),
                    message: "stream cancelled by caller".to_string(),
                });
                return Err(GatewayError::stream_cancelled());
            }
            next = stream.next() => {
                match next {
                    None => return Ok(()),
                    Some(Ok(chunk)) => {
                        let terminal = chunk.is_terminal();
                        on_chunk(chunk);
                        if terminal {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(e),
                }
            }
        }
    }
}

/// Collects an entire stream into its accumulated text and terminal chunk,
/// used by tests and by replay tooling. Not used on the hot path (which is
/// pull-driven end to end) — this exists because test assertions frequently
/// want "the whole transcript" rather than chunk-by-chunk behavior.
pub async fn accumulate_stream<S>(mut stream: S) -> GatewayResult<(String, Option<StreamChunk>)>
where
    S: Stream<Item = GatewayResult<StreamChunk>> + Unpin,
{
    let mut text = String::new();
    let mut terminal = None;
    while let Some(item) = stream.next().await {
        let chunk = item?;
        if let StreamChunk::Content { delta, .. } = &chunk {
            text.push_str(delta);
        }
        if chunk.is_terminal() {
            terminal = Some(chunk);
            break;
        }
    }
    Ok((text, terminal))
}
