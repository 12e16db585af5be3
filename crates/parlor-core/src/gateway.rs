//! Gateway service object
//!
//! The process-wide façade the web layer talks to. Constructed once at
//! startup and injected into request handlers; owns the upstream client, the
//! block registry, the lifecycle coordinator, the rate limiter, and the
//! response cache. Every write invalidates the affected cache prefix before
//! the caller sees success.

use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::identity::{Identity, IdentityResolver, ResolvedIdentity};
use crate::lifecycle::{AttachmentLease, BlockLifecycleCoordinator};
use crate::ratelimit::{Decision, OperationClass, RateLimiter};
use crate::registry::BlockRegistry;
use crate::store::{BlockRecord, BlockStore};
use crate::validate::{self, TranscriptEntry};
use parlor_upstream::{
    AgentDraft, AgentId, AgentMessage, AgentRuntime, AgentSummary, AgentUpdate, OutboundMessage,
    Passage, RuntimeInfo, UpstreamError,
};
use std::sync::Arc;

/// Result of a message exchange
#[derive(Debug)]
pub struct SendReceipt {
    /// Reply messages from the agent
    pub messages: Vec<AgentMessage>,
    /// Set when the post-send detach failed and a sweep should retry it
    pub detach_warning: bool,
}

/// The identity-scoped gateway
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    runtime: Arc<dyn AgentRuntime>,
    resolver: IdentityResolver,
    registry: Arc<BlockRegistry>,
    coordinator: BlockLifecycleCoordinator,
    limiter: RateLimiter,
    agent_cache: ResponseCache<Vec<AgentSummary>>,
}

impl Gateway {
    /// Build a gateway over the given runtime client and record store
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        runtime: Arc<dyn AgentRuntime>,
        store: Arc<dyn BlockStore>,
    ) -> Self {
        let resolver = IdentityResolver::new(config.cookie_auth_enabled, config.marker_max_age());
        let registry = Arc::new(BlockRegistry::new(
            Arc::clone(&runtime),
            store,
            config.persona_block_label.clone(),
        ));
        let coordinator =
            BlockLifecycleCoordinator::new(Arc::clone(&runtime), Arc::clone(&registry));
        let limiter = RateLimiter::new(config.read_quota, config.send_quota);

        Self {
            config,
            runtime,
            resolver,
            registry,
            coordinator,
            limiter,
            agent_cache: ResponseCache::new(),
        }
    }

    /// Gateway configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Resolve the request's identity from its marker, if any
    #[must_use]
    pub fn resolve_identity(&self, marker: Option<&str>) -> ResolvedIdentity {
        self.resolver.resolve(marker)
    }

    /// The live lease for an identity, if an exchange is in flight
    #[must_use]
    pub fn active_lease(&self, identity: &Identity) -> Option<AttachmentLease> {
        self.coordinator.active_lease(identity)
    }

    /// The identity's block record, if one exists
    ///
    /// # Errors
    /// Returns `GatewayError::Store` on a store failure.
    pub fn block_record(&self, identity: &Identity) -> Result<Option<BlockRecord>, GatewayError> {
        self.registry.get(identity)
    }

    /// Send one user message to an agent
    ///
    /// The exchange runs with the identity's persona block attached and the
    /// block is detached on every outcome. The identity's cached listings
    /// are invalidated before the receipt is returned.
    ///
    /// # Errors
    /// - `RateLimited` when the send budget is spent
    /// - `InvalidInput` for empty or oversized text
    /// - `AgentNotFound` when the agent is missing or owned by someone else
    /// - `BlockAttachFailed` when attach failed (exchange never ran)
    /// - `UpstreamUnavailable` when the send itself failed (after detach)
    pub async fn send_message_for_identity(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
        text: &str,
    ) -> Result<SendReceipt, GatewayError> {
        self.check_rate(identity, OperationClass::Send)?;
        validate::validate_message_text(text)?;
        let agent = self.owned_agent(identity, agent_id).await?;

        let target = agent.id.clone();
        let messages = vec![OutboundMessage::user(text)];
        let outcome = self
            .coordinator
            .with_attached_block(identity.clone(), target.clone(), move |runtime| async move {
                runtime
                    .send_message(&target, &messages)
                    .await
                    .map_err(|err| {
                        if err.is_not_found() {
                            GatewayError::AgentNotFound(target.clone())
                        } else {
                            GatewayError::UpstreamUnavailable(err)
                        }
                    })
            })
            .await?;

        self.agent_cache
            .invalidate_prefix(&Self::agents_cache_key(identity));

        Ok(SendReceipt {
            messages: outcome.value,
            detach_warning: outcome.detach_warning,
        })
    }

    /// List the identity's agents, newest first
    ///
    /// Served from the response cache within the configured TTL; concurrent
    /// misses for one identity share a single upstream call.
    ///
    /// # Errors
    /// - `RateLimited` when the read budget is spent
    /// - `UpstreamUnavailable` when the listing cannot be fetched
    pub async fn list_agents_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<AgentSummary>, GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;

        let runtime = Arc::clone(&self.runtime);
        let tags = self.scope_tags(identity);
        self.agent_cache
            .get_or_compute(
                &Self::agents_cache_key(identity),
                self.config.agent_list_ttl(),
                move || async move {
                    let mut agents = runtime
                        .list_agents(&tags)
                        .await
                        .map_err(GatewayError::UpstreamUnavailable)?;
                    agents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                    Ok(agents)
                },
            )
            .await
    }

    /// Fetch one of the identity's agents
    ///
    /// # Errors
    /// `AgentNotFound` covers both a missing agent and one owned by a
    /// different identity; the two are indistinguishable to the caller.
    pub async fn get_agent_for_identity(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
    ) -> Result<AgentSummary, GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;
        self.owned_agent(identity, agent_id).await
    }

    /// Create an agent owned by the identity
    ///
    /// Empty draft fields are filled from the configured defaults; ownership
    /// tags are always forced to the identity's scope.
    ///
    /// # Errors
    /// - `RateLimited`, `InvalidInput`, `UpstreamUnavailable`
    pub async fn create_agent_for_identity(
        &self,
        identity: &Identity,
        mut draft: AgentDraft,
    ) -> Result<AgentSummary, GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;

        if draft.model.is_empty() {
            draft.model = self.config.default_model.clone();
        }
        if draft.embedding.is_empty() {
            draft.embedding = self.config.default_embedding.clone();
        }
        if draft.memory_blocks.is_empty() {
            draft.memory_blocks = self.config.default_memory_blocks.clone();
        }
        validate::validate_agent_draft(&draft, &self.config.model_catalogue)?;
        draft.tags = self.scope_tags(identity);

        let created = self
            .runtime
            .create_agent(&draft)
            .await
            .map_err(GatewayError::UpstreamUnavailable)?;

        self.agent_cache
            .invalidate_prefix(&Self::agents_cache_key(identity));
        tracing::info!("created agent {} for identity {}", created.id, identity);
        Ok(created)
    }

    /// Apply a partial update to one of the identity's agents
    ///
    /// # Errors
    /// - `RateLimited`, `InvalidInput`, `AgentNotFound`, `UpstreamUnavailable`
    pub async fn update_agent_for_identity(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
        update: AgentUpdate,
    ) -> Result<AgentSummary, GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;
        validate::validate_agent_update(&update, &self.config.model_catalogue)?;
        self.owned_agent(identity, agent_id).await?;

        let updated = self
            .runtime
            .update_agent(agent_id, &update)
            .await
            .map_err(|err| self.not_found_or_unavailable(agent_id, err))?;

        self.agent_cache
            .invalidate_prefix(&Self::agents_cache_key(identity));
        Ok(updated)
    }

    /// Delete one of the identity's agents
    ///
    /// The identity's persona block record is untouched: the block belongs
    /// to the identity, not to any single agent.
    ///
    /// # Errors
    /// - `RateLimited`, `AgentNotFound`, `UpstreamUnavailable`
    pub async fn delete_agent_for_identity(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
    ) -> Result<(), GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;
        self.owned_agent(identity, agent_id).await?;

        self.runtime
            .delete_agent(agent_id)
            .await
            .map_err(|err| self.not_found_or_unavailable(agent_id, err))?;

        self.agent_cache
            .invalidate_prefix(&Self::agents_cache_key(identity));
        tracing::info!("deleted agent {} for identity {}", agent_id, identity);
        Ok(())
    }

    /// The client-visible conversation with one of the identity's agents
    ///
    /// Runtime-internal traffic is filtered out and the rest is ordered by
    /// timestamp.
    ///
    /// # Errors
    /// - `RateLimited`, `AgentNotFound`, `UpstreamUnavailable`
    pub async fn conversation_for_identity(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
    ) -> Result<Vec<TranscriptEntry>, GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;
        self.owned_agent(identity, agent_id).await?;

        let messages = self
            .runtime
            .list_messages(agent_id, self.config.message_history_limit)
            .await
            .map_err(GatewayError::UpstreamUnavailable)?;

        let filtered = validate::filter_messages(messages);
        Ok(validate::to_transcript(&filtered))
    }

    /// The identity's agent's archival passages
    ///
    /// An agent without archival memory yields an empty list rather than an
    /// error.
    ///
    /// # Errors
    /// - `RateLimited`, `AgentNotFound`, `UpstreamUnavailable`
    pub async fn archival_memory_for_identity(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
    ) -> Result<Vec<Passage>, GatewayError> {
        self.check_rate(identity, OperationClass::Read)?;
        self.owned_agent(identity, agent_id).await?;

        match self
            .runtime
            .list_archival_memory(agent_id, self.config.archival_page_limit)
            .await
        {
            Ok(passages) => Ok(passages),
            Err(err) if err.is_not_found() => {
                tracing::debug!("no archival memory for agent {}", agent_id);
                Ok(Vec::new())
            }
            Err(err) => Err(GatewayError::UpstreamUnavailable(err)),
        }
    }

    /// Replace the identity's persona block content
    ///
    /// # Errors
    /// - `InvalidInput` for oversized content
    /// - `UpstreamUnavailable`, `Store`
    pub async fn update_persona_for_identity(
        &self,
        identity: &Identity,
        content: &str,
    ) -> Result<BlockRecord, GatewayError> {
        if content.chars().count() > validate::BLOCK_VALUE_MAX {
            return Err(GatewayError::InvalidInput(format!(
                "persona content exceeds {} characters",
                validate::BLOCK_VALUE_MAX
            )));
        }
        self.registry.update(identity, content).await
    }

    /// Explicit identity teardown: forget the local block record
    ///
    /// # Errors
    /// Returns `GatewayError::Store` on a store failure.
    pub fn teardown_identity(&self, identity: &Identity) -> Result<(), GatewayError> {
        self.registry.remove(identity)
    }

    /// Upstream deployment information for the collaborating web layer
    ///
    /// # Errors
    /// Returns `UpstreamUnavailable` when the runtime cannot be reached.
    pub async fn runtime_info(&self) -> Result<RuntimeInfo, GatewayError> {
        self.runtime
            .runtime_info()
            .await
            .map_err(GatewayError::UpstreamUnavailable)
    }

    /// Unused request budget for the identity and class
    #[must_use]
    pub fn remaining_budget(&self, identity: &Identity, class: OperationClass) -> u32 {
        self.limiter.remaining(identity, class)
    }

    /// A draft pre-filled with the configured defaults
    #[must_use]
    pub fn default_draft(&self) -> AgentDraft {
        AgentDraft {
            name: None,
            model: self.config.default_model.clone(),
            embedding: self.config.default_embedding.clone(),
            memory_blocks: self.config.default_memory_blocks.clone(),
            tags: Vec::new(),
        }
    }

    fn agents_cache_key(identity: &Identity) -> String {
        format!("agents:{identity}")
    }

    /// Tags that scope upstream resources to this identity
    fn scope_tags(&self, identity: &Identity) -> Vec<String> {
        if self.config.cookie_auth_enabled {
            vec![identity.tag()]
        } else {
            Vec::new()
        }
    }

    fn check_rate(&self, identity: &Identity, class: OperationClass) -> Result<(), GatewayError> {
        match self.limiter.check(identity, class) {
            Decision::Allowed => Ok(()),
            denied @ Decision::Denied { .. } => {
                let retry_after_secs = denied.retry_after_secs().unwrap_or(1);
                tracing::debug!("rate limited {} for {:?}", identity, class);
                Err(GatewayError::RateLimited { retry_after_secs })
            }
        }
    }

    fn not_found_or_unavailable(&self, agent_id: &AgentId, err: UpstreamError) -> GatewayError {
        if err.is_not_found() {
            GatewayError::AgentNotFound(agent_id.clone())
        } else {
            GatewayError::UpstreamUnavailable(err)
        }
    }

    /// Fetch an agent and enforce that the identity owns it
    async fn owned_agent(
        &self,
        identity: &Identity,
        agent_id: &AgentId,
    ) -> Result<AgentSummary, GatewayError> {
        let agent = self
            .runtime
            .get_agent(agent_id)
            .await
            .map_err(|err| self.not_found_or_unavailable(agent_id, err))?;

        if self.config.cookie_auth_enabled {
            let tag = identity.tag();
            if !agent.tags.iter().any(|t| t == &tag) {
                // Not owned reads the same as not existing
                return Err(GatewayError::AgentNotFound(agent_id.clone()));
            }
        }
        Ok(agent)
    }
}
