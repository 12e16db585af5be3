//! Wire types for the agent-runtime API
//!
//! Only the fields the gateway consumes are modeled; unknown upstream fields
//! are ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a remote agent, as issued by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Wrap a runtime-issued agent id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a remote memory block, as issued by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Wrap a runtime-issued block id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Agent as listed by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Runtime-issued id
    pub id: AgentId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Model identifier (e.g. `provider/model`)
    #[serde(default)]
    pub model: Option<String>,
    /// Ownership and classification tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last modification time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Seed content for a memory block created alongside an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBlockSeed {
    /// Block label (e.g. `human`, `persona`)
    pub label: String,
    /// Initial block content
    pub value: String,
}

/// Request payload for creating an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDraft {
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model identifier
    pub model: String,
    /// Embedding model identifier
    pub embedding: String,
    /// Initial memory blocks
    pub memory_blocks: Vec<MemoryBlockSeed>,
    /// Ownership tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update for an existing agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Role of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End-user message
    User,
    /// Assistant message
    Assistant,
    /// System message
    System,
}

/// Message sent to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl OutboundMessage {
    /// Build a user message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Runtime message type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Message from the end user
    UserMessage,
    /// Message from the agent
    AssistantMessage,
    /// Runtime-internal system message
    SystemMessage,
    /// Tool invocation record
    ToolMessage,
    /// Agent reasoning trace
    ReasoningMessage,
    /// Anything this client does not model
    #[serde(other)]
    #[default]
    Unknown,
}

/// Message as returned by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Runtime-issued message id
    #[serde(default)]
    pub id: Option<String>,
    /// Message type discriminator
    #[serde(default)]
    pub message_type: MessageKind,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Reasoning trace, when present
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Message timestamp
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Archival memory passage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Runtime-issued passage id
    #[serde(default)]
    pub id: Option<String>,
    /// Passage text
    #[serde(default)]
    pub text: String,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Runtime deployment information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Base URL the client is configured against
    pub base_url: String,
    /// Runtime version, when the health endpoint reports one
    #[serde(default)]
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn agent_id_is_transparent() {
        let id: AgentId = serde_json::from_str("\"agent-123\"").unwrap();
        assert_eq!(id.as_str(), "agent-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"agent-123\"");
    }

    #[test]
    fn message_kind_parses_known_and_unknown() {
        let kind: MessageKind = serde_json::from_str("\"user_message\"").unwrap();
        assert_eq!(kind, MessageKind::UserMessage);

        let kind: MessageKind = serde_json::from_str("\"usage_statistics\"").unwrap();
        assert_eq!(kind, MessageKind::Unknown);
    }

    #[test]
    fn agent_message_tolerates_missing_fields() {
        let msg: AgentMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(msg.message_type, MessageKind::Unknown);
        assert!(msg.content.is_empty());
        assert!(msg.date.is_none());
    }

    #[test]
    fn outbound_role_serializes_lowercase() {
        let msg = OutboundMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn agent_update_skips_absent_fields() {
        let update = AgentUpdate {
            name: Some("renamed".to_string()),
            model: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("model").is_none());
    }
}
