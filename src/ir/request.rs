//! IR request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;
use super::metadata::Metadata;
use super::params::Parameters;

/// Whether a stream's `content` chunks carry only the incremental delta or
/// also the running concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    Deltas,
    Accumulated,
}

impl Default for StreamMode {
    fn default() -> Self {
        StreamMode::Deltas
    }
}

/// A fully IR-normalized chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub parameters: Option<Parameters>,
    pub metadata: Metadata,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub stream_mode: StreamMode,
    /// Structured-output schema, carried opaquely (extraction itself is not
    /// implemented by this crate).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl Request {
    pub fn new(messages: Vec<Message>, metadata: Metadata) -> Self {
        Self {
            messages,
            parameters: None,
            metadata,
            stream: false,
            stream_mode: StreamMode::default(),
            schema: None,
        }
    }

    pub fn system_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.role == super::message::Role::System)
    }

    pub fn non_system_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.role != super::message::Role::System)
    }
}
