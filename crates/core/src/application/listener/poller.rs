// Per-queue polling loop

use super::dispatcher::Dispatcher;
use super::registry::QueueDescriptor;
use crate::port::Transport;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One long-running polling loop bound to a single registered queue.
///
/// Two states: polling while the shared running flag stays true, stopped as
/// soon as the flag is observed false at the top of an iteration. Transport
/// errors never terminate the loop, they only delay the next poll.
pub(crate) struct QueuePoller {
    descriptor: Arc<QueueDescriptor>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    running_state: Arc<DashMap<String, bool>>,
    back_off_time: Duration,
}

impl QueuePoller {
    pub(crate) fn new(
        descriptor: Arc<QueueDescriptor>,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        running_state: Arc<DashMap<String, bool>>,
        back_off_time: Duration,
    ) -> Self {
        Self {
            descriptor,
            transport,
            dispatcher,
            running_state,
            back_off_time,
        }
    }

    pub(crate) async fn run(self) {
        let queue = self.descriptor.logical_name.clone();
        info!(queue = %queue, "Polling loop started");

        while self.is_queue_running() {
            if let Err(e) = self.poll_once().await {
                warn!(
                    queue = %queue,
                    error = %e,
                    back_off_ms = self.back_off_time.as_millis() as u64,
                    "Polling failed, retrying after back-off"
                );
                sleep(self.back_off_time).await;
            }
        }

        info!(queue = %queue, "Polling loop stopped");
    }

    /// One receive / dispatch / await-batch round.
    async fn poll_once(&self) -> crate::error::Result<()> {
        let batch = self
            .transport
            .receive_batch(&self.descriptor.receive_request())
            .await?;
        if batch.is_empty() {
            return Ok(());
        }

        debug!(
            queue = %self.descriptor.logical_name,
            batch_size = batch.len(),
            "Received batch"
        );

        let mut in_flight = Vec::with_capacity(batch.len());
        for envelope in batch {
            // Re-checked per message: a stop request can land mid-batch, in
            // which case the rest of the batch is left to redelivery.
            if !self.is_queue_running() {
                debug!(
                    queue = %self.descriptor.logical_name,
                    message_id = %envelope.message_id,
                    "Stop requested mid-batch, skipping message"
                );
                continue;
            }
            in_flight.push(
                self.dispatcher
                    .dispatch(envelope, Arc::clone(&self.descriptor))
                    .await?,
            );
        }

        // Barrier: the next receive is issued only once the whole batch has
        // settled, bounding in-flight work to one batch per queue.
        for completion in join_all(in_flight).await {
            if let Err(e) = completion {
                error!(
                    queue = %self.descriptor.logical_name,
                    error = %e,
                    "Dispatch task panicked"
                );
            }
        }

        Ok(())
    }

    fn is_queue_running(&self) -> bool {
        match self.running_state.get(&self.descriptor.logical_name) {
            Some(flag) => *flag,
            None => {
                warn!(
                    queue = %self.descriptor.logical_name,
                    "Queue is no longer listed in the running state, stopping"
                );
                false
            }
        }
    }
}
