//! Capability metadata advertised by frontend/backend adapters.

use serde::{Deserialize, Serialize};

/// Where a backend expects system-message content to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemMessageStrategy {
    InMessages,
    SeparateParameter,
    SystemInstruction,
    InitialPrompts,
}

/// The inclusive range a provider accepts for `temperature`, used to detect
/// whether unified-range (0..2) values need clamping/scaling on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f32,
    pub max: f32,
}

/// Capabilities advertised by an adapter (frontend dialect support, or
/// backend provider support). Drives both semantic-transform decisions and
/// Router model-based selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub multi_modal: bool,
    pub tools: bool,
    pub max_context_tokens: Option<u32>,
    pub system_message_strategy: SystemMessageStrategy,
    pub supports_multiple_system_messages: bool,
    pub supports_temperature: bool,
    pub supports_top_p: bool,
    pub supports_top_k: bool,
    pub supports_seed: bool,
    pub supports_frequency_penalty: bool,
    pub supports_presence_penalty: bool,
    pub max_stop_sequences: Option<u32>,
    pub temperature_range: Option<TemperatureRange>,
}

impl Capabilities {
    /// A conservative default: no tools, no multimodal, in-messages system
    /// handling, full unified temperature range.
    pub fn minimal(system_message_strategy: SystemMessageStrategy) -> Self {
        Self {
            streaming: true,
            multi_modal: false,
            tools: false,
            max_context_tokens: None,
            system_message_strategy,
            supports_multiple_system_messages: true,
            supports_temperature: true,
            supports_top_p: true,
            supports_top_k: false,
            supports_seed: false,
            supports_frequency_penalty: false,
            supports_presence_penalty: false,
            max_stop_sequences: None,
            temperature_range: None,
        }
    }
}
