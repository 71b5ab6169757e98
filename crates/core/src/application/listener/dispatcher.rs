// Bounded dispatch of received messages to their handlers

use super::registry::QueueDescriptor;
use crate::domain::{DeletionPolicy, Disposition, MessageEnvelope};
use crate::error::{ContainerError, Result};
use crate::port::{Acknowledgment, Transport};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Worker-pool bounds derived from the registered queue count and the
/// configured batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    /// One slot per queue polling loop plus headroom; kept for diagnostics.
    pub core_size: usize,
    /// Hard bound on concurrently executing handler invocations.
    pub max_size: usize,
}

impl PoolSizing {
    pub fn for_container(queue_count: usize, max_batch: u8) -> Self {
        Self {
            core_size: queue_count * 2,
            max_size: queue_count * (max_batch as usize + 1),
        }
    }
}

/// Shared bounded worker pool.
///
/// No backlog: `dispatch` waits for a free slot instead of buffering, so
/// accepted messages start executing immediately and each queue's next poll
/// is paced by dispatch completion rather than by queue growth.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    slots: Arc<Semaphore>,
    sizing: PoolSizing,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, sizing: PoolSizing) -> Self {
        Self {
            transport,
            // A registry that ended up empty still gets a usable pool.
            slots: Arc::new(Semaphore::new(sizing.max_size.max(1))),
            sizing,
        }
    }

    pub fn sizing(&self) -> PoolSizing {
        self.sizing
    }

    /// Number of currently free worker slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Submit one message for processing.
    ///
    /// Waits until a worker slot frees up, then runs the handler and applies
    /// the deletion decision on that worker. The returned handle completes
    /// when the message is fully accounted for; processing outcomes never
    /// escape it.
    pub async fn dispatch(
        &self,
        envelope: MessageEnvelope,
        descriptor: Arc<QueueDescriptor>,
    ) -> Result<JoinHandle<()>> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ContainerError::InvalidState("dispatcher has been shut down".into()))?;

        let transport = Arc::clone(&self.transport);
        Ok(tokio::spawn(async move {
            let _slot = slot;
            execute_message(transport, envelope, descriptor).await;
        }))
    }
}

/// Run the handler for one message and resolve the outcome into a deletion
/// decision.
async fn execute_message(
    transport: Arc<dyn Transport>,
    envelope: MessageEnvelope,
    descriptor: Arc<QueueDescriptor>,
) {
    let policy = descriptor.deletion_policy;
    let acknowledgment = (policy == DeletionPolicy::Never).then(|| {
        Acknowledgment::new(
            Arc::clone(&transport),
            descriptor.endpoint.clone(),
            envelope.ack_token.clone(),
        )
    });

    let disposition = match descriptor.handler.handle(&envelope, acknowledgment).await {
        Ok(()) => policy.decide(true, descriptor.has_redrive_policy),
        Err(e) => {
            let disposition = policy.decide(false, descriptor.has_redrive_policy);
            if disposition == Disposition::Keep && policy == DeletionPolicy::OnSuccess {
                error!(
                    queue = %descriptor.logical_name,
                    message_id = %envelope.message_id,
                    error = %e,
                    "Handler failed, message kept for redelivery"
                );
            } else {
                debug!(
                    queue = %descriptor.logical_name,
                    message_id = %envelope.message_id,
                    error = %e,
                    "Handler failed"
                );
            }
            disposition
        }
    };

    if disposition == Disposition::Delete {
        delete_message(transport, descriptor, envelope);
    }
}

/// Fire-and-forget delete; its own failure is logged, never retried here.
fn delete_message(
    transport: Arc<dyn Transport>,
    descriptor: Arc<QueueDescriptor>,
    envelope: MessageEnvelope,
) {
    tokio::spawn(async move {
        if let Err(e) = transport
            .delete_message(&descriptor.endpoint, &envelope.ack_token)
            .await
        {
            warn!(
                queue = %descriptor.logical_name,
                message_id = %envelope.message_id,
                error = %e,
                "Failed to delete message"
            );
        }
    });
}
