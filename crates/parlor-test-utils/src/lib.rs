//! Testing utilities for the Parlor workspace
//!
//! [`MockRuntime`] is a scripted in-memory [`AgentRuntime`]: it tracks every
//! call, supports per-operation failure injection, and accounts attachment
//! concurrency so tests can assert the at-most-one-lease invariant.

#![warn(unreachable_pub)]

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use parlor_upstream::{
    AgentDraft, AgentId, AgentMessage, AgentRuntime, AgentSummary, AgentUpdate, BlockId,
    MessageKind, OutboundMessage, Passage, RuntimeInfo, UpstreamError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Per-operation call counters
#[derive(Debug, Default)]
pub struct CallCounts {
    /// `create_block` calls
    pub create_block: AtomicUsize,
    /// `update_block` calls
    pub update_block: AtomicUsize,
    /// `attach_block` calls
    pub attach_block: AtomicUsize,
    /// `detach_block` calls
    pub detach_block: AtomicUsize,
    /// `send_message` calls
    pub send_message: AtomicUsize,
    /// `list_agents` calls
    pub list_agents: AtomicUsize,
    /// `get_agent` calls
    pub get_agent: AtomicUsize,
}

#[derive(Debug, Clone)]
struct MockBlock {
    label: String,
    value: String,
}

/// Scripted failures, applied until cleared
#[derive(Debug, Default)]
struct FailureScript {
    create_block: Option<UpstreamError>,
    attach_block: Option<UpstreamError>,
    detach_block: Option<UpstreamError>,
    send_message: Option<UpstreamError>,
    list_agents: Option<UpstreamError>,
    list_archival: Option<UpstreamError>,
}

/// In-memory agent runtime for tests
#[derive(Debug, Default)]
pub struct MockRuntime {
    blocks: DashMap<BlockId, MockBlock>,
    agents: DashMap<AgentId, AgentSummary>,
    attached: DashMap<AgentId, Vec<BlockId>>,
    messages: DashMap<AgentId, Vec<AgentMessage>>,
    passages: DashMap<AgentId, Vec<Passage>>,
    /// Counters for every operation
    pub calls: CallCounts,
    failures: Mutex<FailureScript>,
    reply: Mutex<Vec<AgentMessage>>,
    send_delay: Mutex<Option<Duration>>,
    live_attachments: AtomicUsize,
    max_live_attachments: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockRuntime {
    /// Create an empty runtime
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register an agent with the given name and tags
    pub fn seed_agent(&self, name: &str, tags: &[&str]) -> AgentId {
        let id = AgentId::new(format!("agent-{}", self.next_id()));
        self.agents.insert(
            id.clone(),
            AgentSummary {
                id: id.clone(),
                name: name.to_string(),
                model: Some("letta/letta-free".to_string()),
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
                updated_at: Some(Utc::now()),
            },
        );
        id
    }

    /// Set the reply returned by every subsequent `send_message`
    pub fn set_reply(&self, messages: Vec<AgentMessage>) {
        *self.reply.lock() = messages;
    }

    /// A one-line assistant reply
    #[must_use]
    pub fn assistant_reply(text: &str) -> Vec<AgentMessage> {
        vec![AgentMessage {
            id: Some("reply-1".to_string()),
            message_type: MessageKind::AssistantMessage,
            content: text.to_string(),
            reasoning: None,
            date: Some(Utc::now()),
        }]
    }

    /// Seed message history for an agent
    pub fn seed_messages(&self, agent_id: &AgentId, messages: Vec<AgentMessage>) {
        self.messages.insert(agent_id.clone(), messages);
    }

    /// Seed archival passages for an agent
    pub fn seed_passages(&self, agent_id: &AgentId, passages: Vec<Passage>) {
        self.passages.insert(agent_id.clone(), passages);
    }

    /// Delay every `send_message` (widens race windows in concurrency tests)
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = Some(delay);
    }

    /// Fail every `create_block` with the given error until cleared
    pub fn fail_create_block(&self, err: Option<UpstreamError>) {
        self.failures.lock().create_block = err;
    }

    /// Fail every `attach_block` with the given error until cleared
    pub fn fail_attach_block(&self, err: Option<UpstreamError>) {
        self.failures.lock().attach_block = err;
    }

    /// Fail every `detach_block` with the given error until cleared
    pub fn fail_detach_block(&self, err: Option<UpstreamError>) {
        self.failures.lock().detach_block = err;
    }

    /// Fail every `send_message` with the given error until cleared
    pub fn fail_send_message(&self, err: Option<UpstreamError>) {
        self.failures.lock().send_message = err;
    }

    /// Fail every `list_agents` with the given error until cleared
    pub fn fail_list_agents(&self, err: Option<UpstreamError>) {
        self.failures.lock().list_agents = err;
    }

    /// Fail every `list_archival_memory` with the given error until cleared
    pub fn fail_list_archival(&self, err: Option<UpstreamError>) {
        self.failures.lock().list_archival = err;
    }

    /// Blocks currently attached to the agent
    #[must_use]
    pub fn attached_blocks(&self, agent_id: &AgentId) -> Vec<BlockId> {
        self.attached
            .get(agent_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Whether the block is attached to any agent
    #[must_use]
    pub fn block_attached_anywhere(&self, block_id: &BlockId) -> bool {
        self.attached
            .iter()
            .any(|entry| entry.value().contains(block_id))
    }

    /// Highest number of simultaneously attached blocks observed
    #[must_use]
    pub fn max_live_attachments(&self) -> usize {
        self.max_live_attachments.load(Ordering::SeqCst)
    }

    /// Number of blocks attached right now, across all agents
    #[must_use]
    pub fn live_attachments(&self) -> usize {
        self.live_attachments.load(Ordering::SeqCst)
    }

    fn scripted_failure(
        &self,
        pick: impl FnOnce(&FailureScript) -> Option<UpstreamError>,
    ) -> Result<(), UpstreamError> {
        match pick(&self.failures.lock()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AgentRuntime for MockRuntime {
    async fn create_block(&self, label: &str, content: &str) -> Result<BlockId, UpstreamError> {
        self.calls.create_block.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(|f| f.create_block.clone())?;

        let id = BlockId::new(format!("block-{}", self.next_id()));
        self.blocks.insert(
            id.clone(),
            MockBlock {
                label: label.to_string(),
                value: content.to_string(),
            },
        );
        Ok(id)
    }

    async fn update_block(&self, block_id: &BlockId, content: &str) -> Result<(), UpstreamError> {
        self.calls.update_block.fetch_add(1, Ordering::SeqCst);
        match self.blocks.get_mut(block_id) {
            Some(mut block) => {
                block.value = content.to_string();
                Ok(())
            }
            None => Err(UpstreamError::NotFound(block_id.to_string())),
        }
    }

    async fn attach_block(
        &self,
        agent_id: &AgentId,
        block_id: &BlockId,
    ) -> Result<(), UpstreamError> {
        self.calls.attach_block.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(|f| f.attach_block.clone())?;

        self.attached
            .entry(agent_id.clone())
            .or_default()
            .push(block_id.clone());

        let live = self.live_attachments.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_attachments
            .fetch_max(live, Ordering::SeqCst);
        Ok(())
    }

    async fn detach_block(
        &self,
        agent_id: &AgentId,
        block_id: &BlockId,
    ) -> Result<(), UpstreamError> {
        self.calls.detach_block.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(|f| f.detach_block.clone())?;

        if let Some(mut attached) = self.attached.get_mut(agent_id) {
            if let Some(idx) = attached.iter().position(|b| b == block_id) {
                attached.remove(idx);
                self.live_attachments.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn send_message(
        &self,
        agent_id: &AgentId,
        messages: &[OutboundMessage],
    ) -> Result<Vec<AgentMessage>, UpstreamError> {
        self.calls.send_message.fetch_add(1, Ordering::SeqCst);

        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.scripted_failure(|f| f.send_message.clone())?;

        if !self.agents.contains_key(agent_id) {
            return Err(UpstreamError::NotFound(agent_id.to_string()));
        }

        let mut history = self.messages.entry(agent_id.clone()).or_default();
        for msg in messages {
            history.push(AgentMessage {
                id: Some(format!("msg-{}", self.next_id())),
                message_type: MessageKind::UserMessage,
                content: msg.content.clone(),
                reasoning: None,
                date: Some(Utc::now()),
            });
        }
        let reply = self.reply.lock().clone();
        history.extend(reply.iter().cloned());
        Ok(reply)
    }

    async fn list_agents(&self, tags: &[String]) -> Result<Vec<AgentSummary>, UpstreamError> {
        self.calls.list_agents.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(|f| f.list_agents.clone())?;

        Ok(self
            .agents
            .iter()
            .filter(|entry| tags.iter().all(|t| entry.value().tags.contains(t)))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create_agent(&self, draft: &AgentDraft) -> Result<AgentSummary, UpstreamError> {
        let id = AgentId::new(format!("agent-{}", self.next_id()));
        let summary = AgentSummary {
            id: id.clone(),
            name: draft.name.clone().unwrap_or_default(),
            model: Some(draft.model.clone()),
            tags: draft.tags.clone(),
            updated_at: Some(Utc::now()),
        };
        self.agents.insert(id, summary.clone());
        Ok(summary)
    }

    async fn get_agent(&self, agent_id: &AgentId) -> Result<AgentSummary, UpstreamError> {
        self.calls.get_agent.fetch_add(1, Ordering::SeqCst);
        self.agents
            .get(agent_id)
            .map(|a| a.clone())
            .ok_or_else(|| UpstreamError::NotFound(agent_id.to_string()))
    }

    async fn update_agent(
        &self,
        agent_id: &AgentId,
        update: &AgentUpdate,
    ) -> Result<AgentSummary, UpstreamError> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| UpstreamError::NotFound(agent_id.to_string()))?;
        if let Some(name) = &update.name {
            agent.name = name.clone();
        }
        if let Some(model) = &update.model {
            agent.model = Some(model.clone());
        }
        agent.updated_at = Some(Utc::now());
        Ok(agent.clone())
    }

    async fn delete_agent(&self, agent_id: &AgentId) -> Result<(), UpstreamError> {
        self.agents
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| UpstreamError::NotFound(agent_id.to_string()))
    }

    async fn list_messages(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, UpstreamError> {
        let history = self
            .messages
            .get(agent_id)
            .map(|m| m.clone())
            .unwrap_or_default();
        Ok(history.into_iter().take(limit).collect())
    }

    async fn list_archival_memory(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<Passage>, UpstreamError> {
        self.scripted_failure(|f| f.list_archival.clone())?;
        let passages = self
            .passages
            .get(agent_id)
            .map(|p| p.clone())
            .unwrap_or_default();
        Ok(passages.into_iter().take(limit).collect())
    }

    async fn runtime_info(&self) -> Result<RuntimeInfo, UpstreamError> {
        Ok(RuntimeInfo {
            base_url: "mock://runtime".to_string(),
            version: Some("test".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_tracks_attach_accounting() {
        let runtime = MockRuntime::new();
        let agent = runtime.seed_agent("a", &[]);
        let block = runtime.create_block("persona", "seed").await.unwrap();

        runtime.attach_block(&agent, &block).await.unwrap();
        assert_eq!(runtime.live_attachments(), 1);
        assert!(runtime.block_attached_anywhere(&block));

        runtime.detach_block(&agent, &block).await.unwrap();
        assert_eq!(runtime.live_attachments(), 0);
        assert_eq!(runtime.max_live_attachments(), 1);
    }

    #[tokio::test]
    async fn mock_scripted_send_failure() {
        let runtime = MockRuntime::new();
        let agent = runtime.seed_agent("a", &[]);
        runtime.fail_send_message(Some(UpstreamError::Timeout));

        let result = runtime
            .send_message(&agent, &[OutboundMessage::user("hi")])
            .await;
        assert!(matches!(result, Err(UpstreamError::Timeout)));

        runtime.fail_send_message(None);
        let result = runtime
            .send_message(&agent, &[OutboundMessage::user("hi")])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn mock_list_agents_filters_by_tags() {
        let runtime = MockRuntime::new();
        runtime.seed_agent("mine", &["user:u1"]);
        runtime.seed_agent("theirs", &["user:u2"]);

        let mine = runtime
            .list_agents(&["user:u1".to_string()])
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "mine");

        let all = runtime.list_agents(&[]).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
