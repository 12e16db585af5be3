//! Parlor Upstream - typed client for the remote agent-runtime API
//!
//! Provides the calls the gateway core depends on:
//! - Memory block create/attach/detach/update
//! - Message send and history listing
//! - Agent CRUD with tag filtering
//! - Archival memory (passages, read-only)
//!
//! The [`AgentRuntime`] trait is the seam between the core and the wire:
//! production code uses [`HttpAgentRuntime`], tests substitute a scripted
//! implementation. Idempotent reads are retried at most once on transport
//! failure; attach/detach/send/create are never retried.

#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{AgentRuntime, HttpAgentRuntime, RuntimeEndpoint};
pub use error::UpstreamError;
pub use types::{
    AgentDraft, AgentId, AgentMessage, AgentSummary, AgentUpdate, BlockId, MemoryBlockSeed,
    MessageKind, MessageRole, OutboundMessage, Passage, RuntimeInfo,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
