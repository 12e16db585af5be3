//! Block registry
//!
//! Owns the identity → persona block mapping. The remote block is created
//! first and the record persisted only after the create succeeds; a block id
//! is never cached before the remote object exists. Creation races are
//! serialized per identity, never globally.

use crate::error::GatewayError;
use crate::identity::Identity;
use crate::store::{BlockRecord, BlockStore};
use chrono::Utc;
use dashmap::DashMap;
use parlor_upstream::AgentRuntime;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Content a persona block starts with
const PERSONA_SEED: &str = "New visitor. No persona details recorded yet.";

/// Identity → persona block registry
#[derive(Debug)]
pub struct BlockRegistry {
    runtime: Arc<dyn AgentRuntime>,
    store: Arc<dyn BlockStore>,
    persona_label: String,
    /// One creation lock per identity; removed once the record exists
    create_locks: DashMap<Identity, Arc<Mutex<()>>>,
}

impl BlockRegistry {
    /// Create a registry over the given store and runtime
    #[inline]
    #[must_use]
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        store: Arc<dyn BlockStore>,
        persona_label: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            store,
            persona_label: persona_label.into(),
            create_locks: DashMap::new(),
        }
    }

    /// Look up an identity's record without creating anything
    ///
    /// # Errors
    /// Returns `GatewayError::Store` on a store failure.
    pub fn get(&self, identity: &Identity) -> Result<Option<BlockRecord>, GatewayError> {
        Ok(self.store.load(identity)?)
    }

    /// Fetch the identity's record, creating the remote block on first use
    ///
    /// Idempotent under concurrency: racing callers for one identity
    /// serialize on that identity's creation lock and all but the first find
    /// the persisted record on their double-check, so exactly one remote
    /// block is ever created per identity.
    ///
    /// # Errors
    /// - `GatewayError::UpstreamUnavailable` if the remote create fails; no
    ///   record is persisted in that case
    /// - `GatewayError::Store` on a store failure
    pub async fn get_or_create(&self, identity: &Identity) -> Result<BlockRecord, GatewayError> {
        if let Some(record) = self.store.load(identity)? {
            return Ok(record);
        }

        let lock = self
            .create_locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Double-check: a racing caller may have created while we waited.
        if let Some(record) = self.store.load(identity)? {
            return Ok(record);
        }

        let block_id = self
            .runtime
            .create_block(&self.persona_label, PERSONA_SEED)
            .await
            .map_err(GatewayError::UpstreamUnavailable)?;

        let record = BlockRecord {
            identity: identity.clone(),
            remote_block_id: block_id,
            label: self.persona_label.clone(),
            last_synced_at: Utc::now(),
        };
        self.store.save(&record)?;
        tracing::info!(
            "created persona block {} for identity {}",
            record.remote_block_id,
            identity
        );

        // The record now exists; later callers short-circuit on the load.
        self.create_locks.remove(identity);

        Ok(record)
    }

    /// Push new content to the identity's block and bump the sync time
    ///
    /// Creates the block first if the identity has none.
    ///
    /// # Errors
    /// Propagates create/update failures as `UpstreamUnavailable` and store
    /// failures as `Store`.
    pub async fn update(
        &self,
        identity: &Identity,
        content: &str,
    ) -> Result<BlockRecord, GatewayError> {
        let mut record = self.get_or_create(identity).await?;

        self.runtime
            .update_block(&record.remote_block_id, content)
            .await
            .map_err(GatewayError::UpstreamUnavailable)?;

        record.last_synced_at = Utc::now();
        self.store.save(&record)?;
        Ok(record)
    }

    /// Explicit identity teardown: forget the local record
    ///
    /// The remote block is left for the reconciliation sweep; this layer
    /// never enumerates upstream state to chase it.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` on a store failure.
    pub fn remove(&self, identity: &Identity) -> Result<(), GatewayError> {
        self.store.remove(identity)?;
        Ok(())
    }
}
