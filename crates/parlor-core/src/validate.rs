//! Request validation and transcript shaping
//!
//! Limits mirror the web layer's forms; transcript shaping hides
//! runtime-internal traffic (system messages, heartbeat payloads) before the
//! history reaches a client.

use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use parlor_upstream::{AgentDraft, AgentMessage, AgentUpdate, MessageKind};
use serde::Serialize;

/// Longest accepted message text
pub const MESSAGE_CONTENT_MAX: usize = 4000;
/// Longest accepted agent name
pub const AGENT_NAME_MAX: usize = 100;
/// Longest accepted memory block label
pub const BLOCK_LABEL_MAX: usize = 50;
/// Longest accepted memory block value
pub const BLOCK_VALUE_MAX: usize = 1000;

/// Validate outbound message text
///
/// # Errors
/// Returns `GatewayError::InvalidInput` for empty or oversized text.
pub fn validate_message_text(text: &str) -> Result<(), GatewayError> {
    if text.trim().is_empty() {
        return Err(GatewayError::InvalidInput(
            "message must not be empty".to_string(),
        ));
    }
    if text.chars().count() > MESSAGE_CONTENT_MAX {
        return Err(GatewayError::InvalidInput(format!(
            "message exceeds {MESSAGE_CONTENT_MAX} characters"
        )));
    }
    Ok(())
}

/// Validate an agent creation draft against the configured model catalogue
///
/// # Errors
/// Returns `GatewayError::InvalidInput` naming the first violated limit.
pub fn validate_agent_draft(draft: &AgentDraft, catalogue: &[String]) -> Result<(), GatewayError> {
    if let Some(name) = &draft.name {
        if name.chars().count() > AGENT_NAME_MAX {
            return Err(GatewayError::InvalidInput(format!(
                "agent name exceeds {AGENT_NAME_MAX} characters"
            )));
        }
    }
    if !catalogue.iter().any(|m| m == &draft.model) {
        return Err(GatewayError::InvalidInput(format!(
            "unknown model: {}",
            draft.model
        )));
    }
    for (i, block) in draft.memory_blocks.iter().enumerate() {
        if block.label.is_empty() || block.label.chars().count() > BLOCK_LABEL_MAX {
            return Err(GatewayError::InvalidInput(format!(
                "memory block {i} label must be 1..={BLOCK_LABEL_MAX} characters"
            )));
        }
        if block.value.chars().count() > BLOCK_VALUE_MAX {
            return Err(GatewayError::InvalidInput(format!(
                "memory block {i} value exceeds {BLOCK_VALUE_MAX} characters"
            )));
        }
    }
    Ok(())
}

/// Validate a partial agent update
///
/// # Errors
/// Returns `GatewayError::InvalidInput` naming the violated limit.
pub fn validate_agent_update(
    update: &AgentUpdate,
    catalogue: &[String],
) -> Result<(), GatewayError> {
    if let Some(name) = &update.name {
        if name.chars().count() > AGENT_NAME_MAX {
            return Err(GatewayError::InvalidInput(format!(
                "agent name exceeds {AGENT_NAME_MAX} characters"
            )));
        }
    }
    if let Some(model) = &update.model {
        if !catalogue.iter().any(|m| m == model) {
            return Err(GatewayError::InvalidInput(format!(
                "unknown model: {model}"
            )));
        }
    }
    Ok(())
}

/// Role of a transcript entry shown to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    /// End-user turn
    User,
    /// Agent turn
    Assistant,
    /// Visible system notice
    System,
    /// Tool invocation record
    ToolCall,
    /// Reasoning trace
    Reasoning,
}

/// One client-visible conversation entry
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    /// Stable entry id
    pub id: String,
    /// Who produced the entry
    pub role: TranscriptRole,
    /// Entry text
    pub content: String,
    /// When the entry was produced
    pub created_at: Option<DateTime<Utc>>,
}

/// Whether a user-message body is runtime heartbeat traffic
fn is_heartbeat(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
        .is_some_and(|t| t == "heartbeat")
}

/// Drop runtime-internal messages and order the rest by timestamp
#[must_use]
pub fn filter_messages(messages: Vec<AgentMessage>) -> Vec<AgentMessage> {
    let mut kept: Vec<AgentMessage> = messages
        .into_iter()
        .filter(|m| match m.message_type {
            MessageKind::SystemMessage => false,
            MessageKind::UserMessage => !is_heartbeat(&m.content),
            _ => true,
        })
        .collect();
    kept.sort_by_key(|m| m.date.unwrap_or(DateTime::<Utc>::MIN_UTC));
    kept
}

/// Convert filtered runtime messages to the client transcript shape
#[must_use]
pub fn to_transcript(messages: &[AgentMessage]) -> Vec<TranscriptEntry> {
    messages
        .iter()
        .enumerate()
        .filter_map(|(i, msg)| {
            let role = match msg.message_type {
                MessageKind::UserMessage => TranscriptRole::User,
                MessageKind::AssistantMessage => TranscriptRole::Assistant,
                MessageKind::SystemMessage => TranscriptRole::System,
                MessageKind::ToolMessage => TranscriptRole::ToolCall,
                MessageKind::ReasoningMessage => TranscriptRole::Reasoning,
                MessageKind::Unknown => {
                    // Legacy payloads carry no discriminator; classify by body
                    if is_heartbeat(&msg.content) {
                        return None;
                    }
                    if msg.content.contains("[Username:") {
                        TranscriptRole::User
                    } else {
                        TranscriptRole::Assistant
                    }
                }
            };
            Some(TranscriptEntry {
                id: msg
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("msg-{i}")),
                role,
                content: msg.content.clone(),
                created_at: msg.date,
            })
        })
        .collect()
}
