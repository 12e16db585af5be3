//! Agent runtime client
//!
//! [`AgentRuntime`] is the trait seam the gateway core programs against;
//! [`HttpAgentRuntime`] is the reqwest-backed production implementation.

use crate::error::UpstreamError;
use crate::types::{
    AgentDraft, AgentId, AgentMessage, AgentSummary, AgentUpdate, BlockId, OutboundMessage,
    Passage, RuntimeInfo,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Default request timeout
pub const REQUEST_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30);

/// Backoff before the single read retry
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Operations the gateway performs against the agent runtime
///
/// Attach and detach bracket every message exchange; the lifecycle
/// coordinator owns their ordering. Implementations must not retry
/// side-effecting calls internally.
#[async_trait]
pub trait AgentRuntime: Send + Sync + std::fmt::Debug {
    /// Create a memory block, returning its runtime-issued id
    async fn create_block(&self, label: &str, content: &str) -> Result<BlockId, UpstreamError>;

    /// Update a memory block's content
    async fn update_block(&self, block_id: &BlockId, content: &str) -> Result<(), UpstreamError>;

    /// Attach a block to an agent's working context
    async fn attach_block(
        &self,
        agent_id: &AgentId,
        block_id: &BlockId,
    ) -> Result<(), UpstreamError>;

    /// Detach a block from an agent's working context
    async fn detach_block(
        &self,
        agent_id: &AgentId,
        block_id: &BlockId,
    ) -> Result<(), UpstreamError>;

    /// Send messages to an agent and collect the reply messages
    async fn send_message(
        &self,
        agent_id: &AgentId,
        messages: &[OutboundMessage],
    ) -> Result<Vec<AgentMessage>, UpstreamError>;

    /// List agents carrying all of the given tags
    async fn list_agents(&self, tags: &[String]) -> Result<Vec<AgentSummary>, UpstreamError>;

    /// Create an agent
    async fn create_agent(&self, draft: &AgentDraft) -> Result<AgentSummary, UpstreamError>;

    /// Fetch a single agent
    async fn get_agent(&self, agent_id: &AgentId) -> Result<AgentSummary, UpstreamError>;

    /// Apply a partial update to an agent
    async fn update_agent(
        &self,
        agent_id: &AgentId,
        update: &AgentUpdate,
    ) -> Result<AgentSummary, UpstreamError>;

    /// Delete an agent
    async fn delete_agent(&self, agent_id: &AgentId) -> Result<(), UpstreamError>;

    /// List an agent's message history, newest last
    async fn list_messages(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, UpstreamError>;

    /// List an agent's archival memory passages
    async fn list_archival_memory(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<Passage>, UpstreamError>;

    /// Fetch runtime deployment information
    async fn runtime_info(&self) -> Result<RuntimeInfo, UpstreamError>;
}

/// Connection settings for the agent runtime
#[derive(Debug, Clone)]
pub struct RuntimeEndpoint {
    /// Base URL without trailing slash
    pub base_url: String,
    /// Bearer token, when the deployment requires one
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RuntimeEndpoint {
    /// Create an endpoint for the given base URL
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key: None,
            timeout: REQUEST_TIMEOUT_DEFAULT,
        }
    }

    /// With bearer token
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Default for RuntimeEndpoint {
    fn default() -> Self {
        Self::new("http://localhost:8283")
    }
}

/// HTTP implementation of [`AgentRuntime`]
#[derive(Debug, Clone)]
pub struct HttpAgentRuntime {
    endpoint: RuntimeEndpoint,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CreateBlockResponse {
    id: BlockId,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    messages: Vec<AgentMessage>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    version: Option<String>,
}

impl HttpAgentRuntime {
    /// Build a client for the given endpoint
    ///
    /// # Errors
    /// Returns `UpstreamError::Transport` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(endpoint: RuntimeEndpoint) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self { endpoint, http })
    }

    /// The endpoint this client talks to
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &RuntimeEndpoint {
        &self.endpoint
    }

    async fn send_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut req = self.http.request(method, self.endpoint.url(path));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(key) = &self.endpoint.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(resp)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let resp = self.send_request(method, path, body, query).await?;
        resp.json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn request_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(), UpstreamError> {
        self.send_request(method, path, body, &[]).await?;
        Ok(())
    }

    /// GET with a single retry on transport failure
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        match self
            .request_json(Method::GET, path, None, query)
            .await
        {
            Err(err) if err.is_retryable() => {
                tracing::warn!("read of {} failed ({}), retrying once", path, err);
                tokio::time::sleep(READ_RETRY_BACKOFF).await;
                self.request_json(Method::GET, path, None, query).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn create_block(&self, label: &str, content: &str) -> Result<BlockId, UpstreamError> {
        let body = serde_json::json!({ "label": label, "value": content });
        let resp: CreateBlockResponse = self
            .request_json(Method::POST, "/v1/blocks/", Some(&body), &[])
            .await?;
        tracing::debug!("created block {} with label {}", resp.id, label);
        Ok(resp.id)
    }

    async fn update_block(&self, block_id: &BlockId, content: &str) -> Result<(), UpstreamError> {
        let body = serde_json::json!({ "value": content });
        self.request_unit(
            Method::PATCH,
            &format!("/v1/blocks/{block_id}"),
            Some(&body),
        )
        .await
    }

    async fn attach_block(
        &self,
        agent_id: &AgentId,
        block_id: &BlockId,
    ) -> Result<(), UpstreamError> {
        self.request_unit(
            Method::PATCH,
            &format!("/v1/agents/{agent_id}/core-memory/blocks/attach/{block_id}"),
            None,
        )
        .await
    }

    async fn detach_block(
        &self,
        agent_id: &AgentId,
        block_id: &BlockId,
    ) -> Result<(), UpstreamError> {
        self.request_unit(
            Method::PATCH,
            &format!("/v1/agents/{agent_id}/core-memory/blocks/detach/{block_id}"),
            None,
        )
        .await
    }

    async fn send_message(
        &self,
        agent_id: &AgentId,
        messages: &[OutboundMessage],
    ) -> Result<Vec<AgentMessage>, UpstreamError> {
        let body = serde_json::json!({ "messages": messages });
        let resp: SendMessageResponse = self
            .request_json(
                Method::POST,
                &format!("/v1/agents/{agent_id}/messages"),
                Some(&body),
                &[],
            )
            .await?;
        Ok(resp.messages)
    }

    async fn list_agents(&self, tags: &[String]) -> Result<Vec<AgentSummary>, UpstreamError> {
        let mut query: Vec<(&str, String)> =
            tags.iter().map(|t| ("tags", t.clone())).collect();
        if !tags.is_empty() {
            query.push(("match_all_tags", "true".to_string()));
        }
        self.get_with_retry("/v1/agents/", &query).await
    }

    async fn create_agent(&self, draft: &AgentDraft) -> Result<AgentSummary, UpstreamError> {
        let body = serde_json::to_value(draft)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        self.request_json(Method::POST, "/v1/agents/", Some(&body), &[])
            .await
    }

    async fn get_agent(&self, agent_id: &AgentId) -> Result<AgentSummary, UpstreamError> {
        self.get_with_retry(&format!("/v1/agents/{agent_id}"), &[])
            .await
    }

    async fn update_agent(
        &self,
        agent_id: &AgentId,
        update: &AgentUpdate,
    ) -> Result<AgentSummary, UpstreamError> {
        let body = serde_json::to_value(update)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        self.request_json(
            Method::PATCH,
            &format!("/v1/agents/{agent_id}"),
            Some(&body),
            &[],
        )
        .await
    }

    async fn delete_agent(&self, agent_id: &AgentId) -> Result<(), UpstreamError> {
        self.request_unit(Method::DELETE, &format!("/v1/agents/{agent_id}"), None)
            .await
    }

    async fn list_messages(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, UpstreamError> {
        let query = [("limit", limit.to_string())];
        self.get_with_retry(&format!("/v1/agents/{agent_id}/messages"), &query)
            .await
    }

    async fn list_archival_memory(
        &self,
        agent_id: &AgentId,
        limit: usize,
    ) -> Result<Vec<Passage>, UpstreamError> {
        let query = [("limit", limit.to_string())];
        self.get_with_retry(&format!("/v1/agents/{agent_id}/archival-memory"), &query)
            .await
    }

    async fn runtime_info(&self) -> Result<RuntimeInfo, UpstreamError> {
        let health: HealthResponse = self.get_with_retry("/v1/health/", &[]).await?;
        Ok(RuntimeInfo {
            base_url: self.endpoint.base_url.clone(),
            version: health.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slashes() {
        let ep = RuntimeEndpoint::new("http://runtime:8283///");
        assert_eq!(ep.base_url, "http://runtime:8283");
        assert_eq!(ep.url("/v1/agents/"), "http://runtime:8283/v1/agents/");
    }

    #[test]
    fn endpoint_defaults() {
        let ep = RuntimeEndpoint::default();
        assert_eq!(ep.base_url, "http://localhost:8283");
        assert!(ep.api_key.is_none());
        assert_eq!(ep.timeout, REQUEST_TIMEOUT_DEFAULT);
    }

    #[test]
    fn endpoint_builder() {
        let ep = RuntimeEndpoint::new("http://runtime:8283")
            .with_api_key("secret")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ep.api_key.as_deref(), Some("secret"));
        assert_eq!(ep.timeout, Duration::from_secs(5));
    }
}
