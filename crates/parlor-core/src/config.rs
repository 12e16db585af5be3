//! Gateway configuration
//!
//! Constructed once at startup and injected into the service object; the
//! binary fills it from environment variables.

use parlor_upstream::{MemoryBlockSeed, RuntimeEndpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request budget for one operation class
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateQuota {
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl RateQuota {
    /// Create a quota
    #[inline]
    #[must_use]
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    /// Window length as a duration
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Whether visitors get individual cookie-backed identities
    pub cookie_auth_enabled: bool,
    /// Lifetime of a freshly minted identity marker, in seconds
    pub marker_max_age_secs: u64,
    /// Budget for read operations (listings, history)
    pub read_quota: RateQuota,
    /// Budget for message sends
    pub send_quota: RateQuota,
    /// TTL for cached agent listings, in seconds
    pub agent_list_ttl_secs: u64,
    /// Label of the per-identity persona block
    pub persona_block_label: String,
    /// How many history messages to pull per conversation read
    pub message_history_limit: usize,
    /// How many archival passages to pull per read
    pub archival_page_limit: usize,
    /// Models agents may be created with
    pub model_catalogue: Vec<String>,
    /// Model applied when a draft names none
    pub default_model: String,
    /// Embedding model for new agents
    pub default_embedding: String,
    /// Memory blocks seeded into newly created agents
    pub default_memory_blocks: Vec<MemoryBlockSeed>,
}

impl GatewayConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cookie-based identities on or off
    #[inline]
    #[must_use]
    pub fn with_cookie_auth(mut self, enabled: bool) -> Self {
        self.cookie_auth_enabled = enabled;
        self
    }

    /// With read budget
    #[inline]
    #[must_use]
    pub fn with_read_quota(mut self, quota: RateQuota) -> Self {
        self.read_quota = quota;
        self
    }

    /// With send budget
    #[inline]
    #[must_use]
    pub fn with_send_quota(mut self, quota: RateQuota) -> Self {
        self.send_quota = quota;
        self
    }

    /// With agent-list cache TTL
    #[inline]
    #[must_use]
    pub fn with_agent_list_ttl(mut self, secs: u64) -> Self {
        self.agent_list_ttl_secs = secs;
        self
    }

    /// Marker lifetime as a duration
    #[inline]
    #[must_use]
    pub fn marker_max_age(&self) -> Duration {
        Duration::from_secs(self.marker_max_age_secs)
    }

    /// Agent-list TTL as a duration
    #[inline]
    #[must_use]
    pub fn agent_list_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_list_ttl_secs)
    }

    /// Read configuration overrides from the environment
    ///
    /// Unset or unparseable variables leave the defaults in place.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("USE_COOKIE_BASED_AUTHENTICATION") {
            config.cookie_auth_enabled = v.eq_ignore_ascii_case("true");
        }
        if let Some(limit) = env_parse("PARLOR_READ_LIMIT") {
            config.read_quota.limit = limit;
        }
        if let Some(limit) = env_parse("PARLOR_SEND_LIMIT") {
            config.send_quota.limit = limit;
        }
        if let Some(secs) = env_parse("PARLOR_AGENT_LIST_TTL_SECS") {
            config.agent_list_ttl_secs = secs;
        }
        config
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cookie_auth_enabled: true,
            marker_max_age_secs: 60 * 60 * 24 * 30,
            read_quota: RateQuota::new(200, 60),
            send_quota: RateQuota::new(30, 60),
            agent_list_ttl_secs: 60,
            persona_block_label: "persona".to_string(),
            message_history_limit: 100,
            archival_page_limit: 10,
            model_catalogue: vec![
                "letta/letta-free".to_string(),
                "letta/letta-pro".to_string(),
                "openai/gpt-4".to_string(),
                "openai/gpt-3.5-turbo".to_string(),
                "anthropic/claude-3-sonnet".to_string(),
                "anthropic/claude-3-haiku".to_string(),
            ],
            default_model: "letta/letta-free".to_string(),
            default_embedding: "letta/letta-free".to_string(),
            default_memory_blocks: vec![
                MemoryBlockSeed {
                    label: "human".to_string(),
                    value: String::new(),
                },
                MemoryBlockSeed {
                    label: "persona".to_string(),
                    value: "You are a helpful assistant.".to_string(),
                },
            ],
        }
    }
}

/// Build the upstream endpoint from the environment
#[must_use]
pub fn endpoint_from_env() -> RuntimeEndpoint {
    let base_url = std::env::var("AGENT_RUNTIME_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8283".to_string());
    let mut endpoint = RuntimeEndpoint::new(base_url);
    if let Ok(key) = std::env::var("AGENT_RUNTIME_API_KEY") {
        if !key.is_empty() {
            endpoint = endpoint.with_api_key(key);
        }
    }
    endpoint
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
