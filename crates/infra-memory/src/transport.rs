// In-memory queue fabric
// Per-endpoint FIFO queues with delivery tracking and a redrive flag. Long
// polling is emulated with a Notify; a delivered message stays invisible
// until it is deleted or explicitly released back to the queue.

use async_trait::async_trait;
use conveyor_core::domain::{AckToken, MessageEnvelope, QueueEndpoint};
use conveyor_core::port::{ReceiveRequest, Transport, TransportError};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message at rest: the token is minted per delivery, not per message.
#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<StoredMessage>,
    /// Delivered but not yet deleted, keyed by the receipt token.
    in_flight: HashMap<String, StoredMessage>,
    has_redrive_policy: bool,
}

/// In-process `Transport` implementation.
///
/// Queues must be created before they are polled or sent to; an operation on
/// an unknown endpoint is a transport error, matching how a remote queue
/// rejects a bad URL.
pub struct InMemoryTransport {
    queues: DashMap<String, Mutex<QueueState>>,
    arrivals: Notify,
    receive_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            arrivals: Notify::new(),
            receive_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn create_queue(&self, endpoint: &QueueEndpoint) {
        self.queues
            .insert(endpoint.as_str().to_string(), Mutex::new(QueueState::default()));
    }

    pub fn create_queue_with_redrive(&self, endpoint: &QueueEndpoint) {
        let state = QueueState {
            has_redrive_policy: true,
            ..QueueState::default()
        };
        self.queues
            .insert(endpoint.as_str().to_string(), Mutex::new(state));
    }

    pub fn send_message(
        &self,
        endpoint: &QueueEndpoint,
        body: impl Into<String>,
    ) -> Result<String, TransportError> {
        self.send_message_with_attributes(endpoint, body, HashMap::new())
    }

    pub fn send_message_with_attributes(
        &self,
        endpoint: &QueueEndpoint,
        body: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> Result<String, TransportError> {
        let message_id = Uuid::new_v4().to_string();
        {
            let queue = self.queue(endpoint, |e, reason| TransportError::Receive {
                endpoint: e,
                reason,
            })?;
            locked(&queue).visible.push_back(StoredMessage {
                message_id: message_id.clone(),
                body: body.into(),
                attributes,
            });
        }
        self.arrivals.notify_waiters();
        Ok(message_id)
    }

    /// Return every in-flight message of a queue to its visible tail, as a
    /// visibility-timeout expiry would. Returns how many were released.
    pub fn release_in_flight(&self, endpoint: &QueueEndpoint) -> usize {
        let Some(queue) = self.queues.get(endpoint.as_str()) else {
            return 0;
        };
        let released = {
            let mut state = locked(&queue);
            let released: Vec<StoredMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
            let count = released.len();
            state.visible.extend(released);
            count
        };
        drop(queue);
        if released > 0 {
            self.arrivals.notify_waiters();
        }
        released
    }

    pub fn visible_count(&self, endpoint: &QueueEndpoint) -> usize {
        self.queues
            .get(endpoint.as_str())
            .map(|queue| locked(&queue).visible.len())
            .unwrap_or(0)
    }

    pub fn in_flight_count(&self, endpoint: &QueueEndpoint) -> usize {
        self.queues
            .get(endpoint.as_str())
            .map(|queue| locked(&queue).in_flight.len())
            .unwrap_or(0)
    }

    pub fn receive_call_count(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn queue(
        &self,
        endpoint: &QueueEndpoint,
        error: impl Fn(String, String) -> TransportError,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Mutex<QueueState>>, TransportError> {
        self.queues.get(endpoint.as_str()).ok_or_else(|| {
            error(
                endpoint.as_str().to_string(),
                "unknown endpoint".to_string(),
            )
        })
    }

    /// Move up to `max_messages` visible messages into the in-flight set,
    /// minting one receipt token per delivery.
    fn take_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<MessageEnvelope>, TransportError> {
        let queue = self.queue(&request.endpoint, |endpoint, reason| {
            TransportError::Receive { endpoint, reason }
        })?;
        let mut state = locked(&queue);

        let mut batch = Vec::new();
        while batch.len() < request.max_messages as usize {
            let Some(message) = state.visible.pop_front() else {
                break;
            };
            let token = AckToken::new(Uuid::new_v4().to_string());
            state
                .in_flight
                .insert(token.as_str().to_string(), message.clone());

            let mut envelope =
                MessageEnvelope::new(message.message_id, message.body, token);
            envelope.attributes = message.attributes;
            batch.push(envelope);
        }
        Ok(batch)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<MessageEnvelope>, TransportError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        let wait = Duration::from_secs(u64::from(request.wait_time_seconds.unwrap_or(0)));
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let batch = self.take_batch(request)?;
            if !batch.is_empty() {
                debug!(
                    endpoint = %request.endpoint,
                    batch_size = batch.len(),
                    "Delivered batch"
                );
                return Ok(batch);
            }

            // Long poll: park until something arrives or the wait elapses.
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            tokio::select! {
                _ = self.arrivals.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(Vec::new()),
            }
        }
    }

    async fn delete_message(
        &self,
        endpoint: &QueueEndpoint,
        token: &AckToken,
    ) -> Result<(), TransportError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let queue = self.queue(endpoint, |endpoint, reason| TransportError::Delete {
            endpoint,
            reason,
        })?;
        let removed = locked(&queue).in_flight.remove(token.as_str());
        match removed {
            Some(message) => {
                debug!(endpoint = %endpoint, message_id = %message.message_id, "Deleted message");
                Ok(())
            }
            None => Err(TransportError::Delete {
                endpoint: endpoint.as_str().to_string(),
                reason: format!("no in-flight delivery for token '{token}'"),
            }),
        }
    }

    async fn has_redrive_policy(&self, endpoint: &QueueEndpoint) -> Result<bool, TransportError> {
        let queue = self.queue(endpoint, |endpoint, reason| TransportError::Attributes {
            endpoint,
            reason,
        })?;
        let has_redrive = locked(&queue).has_redrive_policy;
        Ok(has_redrive)
    }
}
