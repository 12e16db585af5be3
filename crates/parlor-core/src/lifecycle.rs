//! Block lifecycle coordination
//!
//! Brackets every message exchange in attach → send → detach. Detach runs on
//! every exit path: success, upstream failure, a panic inside the exchange,
//! or cancellation of the inbound request. Exchanges for one identity are
//! serialized; different identities proceed concurrently.

use crate::error::GatewayError;
use crate::identity::Identity;
use crate::registry::BlockRegistry;
use crate::store::BlockRecord;
use dashmap::DashMap;
use parlor_upstream::{AgentId, AgentRuntime, BlockId};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// A block currently attached for an in-flight exchange
///
/// At most one lease exists per identity at any instant; the per-identity
/// exchange lock enforces this.
#[derive(Debug, Clone)]
pub struct AttachmentLease {
    /// Identity whose block is attached
    pub identity: Identity,
    /// The attached block
    pub remote_block_id: BlockId,
    /// Agent the block is attached to
    pub agent_id: AgentId,
    /// When the attach completed
    pub acquired_at: Instant,
}

/// Result of a completed exchange
#[derive(Debug)]
pub struct ExchangeOutcome<T> {
    /// The exchange's own result
    pub value: T,
    /// Set when detach failed after a successful exchange; the block may
    /// still be attached upstream and a reconciliation sweep should retry
    pub detach_warning: bool,
}

/// Coordinates attach/detach around message exchanges
#[derive(Debug)]
pub struct BlockLifecycleCoordinator {
    runtime: Arc<dyn AgentRuntime>,
    registry: Arc<BlockRegistry>,
    exchange_locks: DashMap<Identity, Arc<Mutex<()>>>,
    leases: Arc<DashMap<Identity, AttachmentLease>>,
}

impl BlockLifecycleCoordinator {
    /// Create a coordinator over the given runtime and registry
    #[inline]
    #[must_use]
    pub fn new(runtime: Arc<dyn AgentRuntime>, registry: Arc<BlockRegistry>) -> Self {
        Self {
            runtime,
            registry,
            exchange_locks: DashMap::new(),
            leases: Arc::new(DashMap::new()),
        }
    }

    /// The live lease for an identity, if an exchange is in flight
    #[must_use]
    pub fn active_lease(&self, identity: &Identity) -> Option<AttachmentLease> {
        self.leases.get(identity).map(|l| l.clone())
    }

    /// Number of in-flight exchanges across all identities
    #[inline]
    #[must_use]
    pub fn live_lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Run `exchange` with the identity's persona block attached
    ///
    /// # Workflow
    /// 1. Resolve or create the identity's block record
    /// 2. Acquire the identity's exchange lock
    /// 3. Attach the block to the target agent
    /// 4. Run the exchange
    /// 5. Detach on every outcome, before the lock is released
    /// 6. Propagate the exchange's result unchanged after detach
    ///
    /// The locked section runs on a spawned task: dropping the returned
    /// future (request cancellation, client disconnect) abandons the wait
    /// but never the detach.
    ///
    /// # Errors
    /// - `GatewayError::BlockAttachFailed` when attach fails; the exchange
    ///   never ran and may be retried
    /// - the exchange's own error, after detach has run
    pub async fn with_attached_block<T, F, Fut>(
        &self,
        identity: Identity,
        agent_id: AgentId,
        exchange: F,
    ) -> Result<ExchangeOutcome<T>, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn AgentRuntime>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let record = self.registry.get_or_create(&identity).await?;

        let lock = self
            .exchange_locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let runtime = Arc::clone(&self.runtime);
        let leases = Arc::clone(&self.leases);

        let handle = tokio::spawn(async move {
            let _guard = lock.lock().await;
            run_exchange(runtime, leases, identity, agent_id, record, exchange).await
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(GatewayError::Internal(format!(
                "exchange task failed: {join_err}"
            ))),
        }
    }
}

/// The locked section: attach, run, always detach
async fn run_exchange<T, F, Fut>(
    runtime: Arc<dyn AgentRuntime>,
    leases: Arc<DashMap<Identity, AttachmentLease>>,
    identity: Identity,
    agent_id: AgentId,
    record: BlockRecord,
    exchange: F,
) -> Result<ExchangeOutcome<T>, GatewayError>
where
    T: Send + 'static,
    F: FnOnce(Arc<dyn AgentRuntime>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
{
    let block_id = record.remote_block_id.clone();

    if let Err(err) = runtime.attach_block(&agent_id, &block_id).await {
        if err.is_retryable() {
            // A transport fault leaves the remote state ambiguous: the
            // attach may have landed. Issue a best-effort detach so no
            // block stays attached.
            if let Err(detach_err) = runtime.detach_block(&agent_id, &block_id).await {
                tracing::warn!(
                    "cleanup detach of block {} from agent {} failed: {}",
                    block_id,
                    agent_id,
                    detach_err
                );
            }
        }
        return Err(GatewayError::BlockAttachFailed(err));
    }

    leases.insert(
        identity.clone(),
        AttachmentLease {
            identity: identity.clone(),
            remote_block_id: block_id.clone(),
            agent_id: agent_id.clone(),
            acquired_at: Instant::now(),
        },
    );

    // Run the exchange on its own task so a panic is contained and cannot
    // unwind past the detach below.
    let result: Result<T, GatewayError> = match tokio::spawn(exchange(Arc::clone(&runtime))).await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            Err(GatewayError::Internal("exchange panicked".to_string()))
        }
        Err(join_err) => Err(GatewayError::Internal(format!(
            "exchange task failed: {join_err}"
        ))),
    };

    let detach_result = runtime.detach_block(&agent_id, &block_id).await;
    leases.remove(&identity);

    let detach_warning = match detach_result {
        Ok(()) => false,
        Err(err) => {
            tracing::warn!(
                "detach of block {} from agent {} failed: {}",
                block_id,
                agent_id,
                err
            );
            true
        }
    };

    match result {
        Ok(value) => Ok(ExchangeOutcome {
            value,
            detach_warning,
        }),
        Err(err) => Err(err),
    }
}
