//! Shared HTTP helpers: SSE line framing, JSONL framing, and
//! `Retry-After` header parsing, reused across backend adapters instead of
//! each one re-implementing byte buffering. SSE and JSONL (Ollama) share
//! this framer since both are "frame on newline, parse each frame"
//! problems.

use reqwest::header::HeaderMap;

/// Incrementally frames a byte stream on newlines, buffering incomplete
/// trailing lines. Used for both SSE (`data: ...`) and JSONL streams.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes in, get back zero or more complete lines.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(bytes);
        self.buffer.push_str(&text);

        let mut lines = Vec::new();
        if let Some(pos) = self.buffer.rfind('\n') {
            let complete = self.buffer[..=pos].to_string();
            let remainder = self.buffer[pos + 1..].to_string();
            self.buffer = remainder;
            for line in complete.lines() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Flush whatever partial line remains when the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Extracts the `data:` payload from an SSE line, or `None` for blank lines,
/// comments (`:`-prefixed), and non-`data` fields (`event:`, `id:`, `retry:`),
/// which callers that only care about payloads can ignore.
pub fn sse_data_payload(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    line.strip_prefix("data:").map(|v| v.trim_start())
}

/// Extracts the `event:` name from an SSE line, if present.
pub fn sse_event_name(line: &str) -> Option<&str> {
    line.strip_prefix("event:").map(|v| v.trim_start())
}

pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Frames a streamed JSON array (Gemini's `streamGenerateContent` response
/// shape: `[{...}, {...}, ...]` delivered incrementally) into complete
/// top-level JSON objects, by tracking brace depth and string/escape state
/// across chunk boundaries. The enclosing `[`/`]`/`,` punctuation is
/// discarded; only each object's own text is returned.
#[derive(Debug, Default)]
pub struct JsonArrayFramer {
    buffer: String,
    depth: i32,
    in_string: bool,
    escaped: bool,
    object_start: Option<usize>,
}

impl JsonArrayFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes in, get back zero or more complete JSON object texts.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(bytes);
        self.buffer.push_str(&text);

        let mut objects = Vec::new();
        let mut consumed = 0usize;
        let chars: Vec<(usize, char)> = self.buffer.char_indices().collect();

        for &(byte_idx, ch) in &chars {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '{' => {
                    if self.depth == 0 {
                        self.object_start = Some(byte_idx);
                    }
                    self.depth += 1;
                }
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        if let Some(start) = self.object_start.take() {
                            let end = byte_idx + ch.len_utf8();
                            objects.push(self.buffer[start..end].to_string());
                            consumed = end;
                        }
                    }
                }
                _ => {}
            }
        }

        if consumed > 0 {
            self.buffer = self.buffer[consumed..].to_string();
        }
        objects
    }
}

/// Parses a `Retry-After` header, which per HTTP may be either a delay in
/// seconds or an HTTP-date.
pub fn parse_retry_after_header(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let now = chrono::Utc::now();
    let delta = when.with_timezone(&chrono::Utc) - now;
    Some(delta.num_seconds().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_sse_lines_across_chunks() {
        let mut framer = LineFramer::new();
        let mut lines = framer.push(b"data: {\"a\":1}\nda");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
        lines = framer.push(b"ta: {\"b\":2}\n\n");
        assert_eq!(
            lines,
            vec!["ta: {\"b\":2}".to_string(), "".to_string()]
        );
    }

    #[test]
    fn extracts_data_payload() {
        assert_eq!(sse_data_payload("data: hello"), Some("hello"));
        assert_eq!(sse_data_payload(": comment"), None);
        assert_eq!(sse_data_payload(""), None);
        assert_eq!(sse_data_payload("event: ping"), None);
    }

    #[test]
    fn parses_numeric_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after_header(&headers), Some(30));
    }

    #[test]
    fn frames_json_array_objects_split_across_chunks() {
        let mut framer = JsonArrayFramer::new();
        let mut objects = framer.push(b"[{\"a\": \"x, {} y\"},");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0], "{\"a\": \"x, {} y\"}");
        objects = framer.push(b" {\"b\":2}]");
        assert_eq!(objects, vec!["{\"b\":2}".to_string()]);
    }
}
