//! Parlor Core - Identity-Scoped Memory Block Lifecycle & Request Shaping
//!
//! The layer between a multi-user web frontend and a remote agent runtime:
//! - Maps anonymous visitors to stable per-user identities
//! - Owns the identity → persona memory-block mapping (local records are
//!   authoritative; the upstream enumeration capability is never trusted)
//! - Brackets every message exchange in attach → send → detach, with detach
//!   guaranteed on every exit path
//! - Shapes traffic with per-identity rate limits and a short-TTL response
//!   cache
//!
//! # Example
//!
//! ```rust,ignore
//! use parlor_core::{Gateway, GatewayConfig, SqliteBlockStore};
//! use parlor_upstream::{HttpAgentRuntime, RuntimeEndpoint};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = Arc::new(HttpAgentRuntime::new(RuntimeEndpoint::default())?);
//! let store = Arc::new(SqliteBlockStore::open("records.db")?);
//! let gateway = Gateway::new(GatewayConfig::from_env(), runtime, store);
//!
//! let resolved = gateway.resolve_identity(None);
//! let agents = gateway.list_agents_for_identity(&resolved.identity).await?;
//! println!("{} agents", agents.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod ratelimit;
pub mod registry;
pub mod store;
pub mod validate;

// Re-exports for convenience
pub use cache::ResponseCache;
pub use config::{endpoint_from_env, GatewayConfig, RateQuota};
pub use error::{GatewayError, StoreError};
pub use gateway::{Gateway, SendReceipt};
pub use identity::{Identity, IdentityResolver, MarkerDirective, ResolvedIdentity, SHARED_IDENTITY};
pub use lifecycle::{AttachmentLease, BlockLifecycleCoordinator, ExchangeOutcome};
pub use ratelimit::{Decision, OperationClass, RateLimiter};
pub use registry::BlockRegistry;
pub use store::{BlockRecord, BlockStore, MemoryBlockStore, SqliteBlockStore};
pub use validate::{TranscriptEntry, TranscriptRole};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the gateway core
    pub use crate::{
        Gateway, GatewayConfig, GatewayError, Identity, OperationClass, RateQuota,
        ResolvedIdentity, SendReceipt, SqliteBlockStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
