// Queue registry - frozen per-queue settings built at initialization

use super::config::ContainerConfig;
use crate::domain::{DeletionPolicy, QueueEndpoint};
use crate::error::Result;
use crate::port::{DestinationResolver, MessageHandler, ReceiveRequest, Transport};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable per-queue settings: physical endpoint, bound handler, deletion
/// policy, redrive presence and the shape of the batched receive.
pub struct QueueDescriptor {
    pub logical_name: String,
    pub endpoint: QueueEndpoint,
    pub handler: Arc<dyn MessageHandler>,
    /// Copied from the handler when the descriptor is frozen.
    pub deletion_policy: DeletionPolicy,
    pub has_redrive_policy: bool,
    pub max_number_of_messages: u8,
    pub visibility_timeout_seconds: Option<u32>,
    pub wait_time_seconds: Option<u32>,
}

impl QueueDescriptor {
    pub fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            endpoint: self.endpoint.clone(),
            max_messages: self.max_number_of_messages,
            visibility_timeout_seconds: self.visibility_timeout_seconds,
            wait_time_seconds: self.wait_time_seconds,
        }
    }
}

impl fmt::Debug for QueueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDescriptor")
            .field("logical_name", &self.logical_name)
            .field("endpoint", &self.endpoint)
            .field("deletion_policy", &self.deletion_policy)
            .field("has_redrive_policy", &self.has_redrive_policy)
            .field("max_number_of_messages", &self.max_number_of_messages)
            .field("visibility_timeout_seconds", &self.visibility_timeout_seconds)
            .field("wait_time_seconds", &self.wait_time_seconds)
            .finish_non_exhaustive()
    }
}

/// Build descriptors for every destination declared by the handlers.
///
/// A name that fails to resolve is logged and skipped; the remaining queues
/// still register (partial registration). The redrive-attribute probe is not
/// guarded: a transport failure there aborts initialization.
pub(crate) async fn build_registry(
    handlers: &[Arc<dyn MessageHandler>],
    resolver: &Arc<dyn DestinationResolver>,
    transport: &Arc<dyn Transport>,
    config: &ContainerConfig,
) -> Result<HashMap<String, Arc<QueueDescriptor>>> {
    let mut registry = HashMap::new();

    for handler in handlers {
        for queue in handler.destinations() {
            let endpoint = match resolver.resolve(&queue).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Ignoring queue: destination did not resolve");
                    continue;
                }
            };

            let has_redrive_policy = transport.has_redrive_policy(&endpoint).await?;
            let descriptor = QueueDescriptor {
                logical_name: queue.clone(),
                endpoint,
                deletion_policy: handler.deletion_policy(),
                handler: Arc::clone(handler),
                has_redrive_policy,
                max_number_of_messages: config.max_number_of_messages,
                visibility_timeout_seconds: config.visibility_timeout_seconds,
                wait_time_seconds: config.wait_time_seconds,
            };

            debug!(queue = %queue, endpoint = %descriptor.endpoint, "Registered queue");
            if registry.insert(queue.clone(), Arc::new(descriptor)).is_some() {
                warn!(queue = %queue, "Queue declared by more than one handler, keeping the last registration");
            }
        }
    }

    Ok(registry)
}
