//! Normalized output of one request.

use serde::{Deserialize, Serialize};

use crate::Message;

/// Timing and usage figures for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Wall-clock time measured by the executor.
    pub duration_ms: u64,
    /// Duration reported by the runtime's result message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
}

/// Unified response from one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResponse {
    /// Concatenated text, optionally followed by a tool summary, trimmed.
    pub text: String,
    /// Tool names in invocation order. May contain repeats.
    pub tool_uses: Vec<String>,
    /// Captured thinking fragments, regardless of thinking mode.
    pub thinking_blocks: Vec<String>,
    /// Session handle to resume from.
    pub session_id: Option<String>,
    pub metrics: Metrics,
    /// Every raw message, populated only for `ResponseMode::BufferAll`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_messages: Vec<Message>,
}

impl ProcessedResponse {
    /// Tool names with repeats removed, first occurrence order kept.
    #[must_use]
    pub fn unique_tools(&self) -> Vec<&str> {
        unique_in_order(&self.tool_uses)
    }
}

/// Deduplicate names, keeping the order of first appearance.
#[must_use]
pub fn unique_in_order(names: &[String]) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name.as_str()) {
            unique.push(name);
        }
    }
    unique
}
