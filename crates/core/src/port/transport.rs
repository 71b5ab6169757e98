// Transport Port
// Abstraction over the queueing system: batched long-poll receive plus
// delete-by-token. Wire formats and client plumbing stay on the host side.

use crate::domain::{AckToken, MessageEnvelope, QueueEndpoint};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Parameters of one batched receive, frozen per queue at initialization.
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    pub endpoint: QueueEndpoint,
    /// Upper bound on the batch size (the transport may return fewer).
    pub max_messages: u8,
    /// Seconds the delivered messages stay hidden from other consumers.
    pub visibility_timeout_seconds: Option<u32>,
    /// Long-poll duration; `None` means the receive returns immediately.
    pub wait_time_seconds: Option<u32>,
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Receive failed on '{endpoint}': {reason}")]
    Receive { endpoint: String, reason: String },

    #[error("Delete failed on '{endpoint}': {reason}")]
    Delete { endpoint: String, reason: String },

    #[error("Attribute query failed on '{endpoint}': {reason}")]
    Attributes { endpoint: String, reason: String },
}

/// Queue transport trait
///
/// Implementations:
/// - InMemoryTransport (conveyor-infra-memory): in-process fabric for tests
///   and embedded hosts
/// - any remote queue client wrapped by the host process
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receive up to `request.max_messages` messages, blocking up to
    /// `wait_time_seconds` when the queue is empty (long poll).
    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<MessageEnvelope>, TransportError>;

    /// Delete (acknowledge) one message by the token of its delivery.
    async fn delete_message(
        &self,
        endpoint: &QueueEndpoint,
        token: &AckToken,
    ) -> Result<(), TransportError>;

    /// Whether a redrive/dead-letter policy is configured on the queue.
    async fn has_redrive_policy(&self, endpoint: &QueueEndpoint) -> Result<bool, TransportError>;
}

/// Deletion handle given to handlers registered with `DeletionPolicy::Never`.
///
/// Wraps the transport, endpoint and token of one delivery so the handler can
/// acknowledge explicitly once it has durably processed the message.
#[derive(Clone)]
pub struct Acknowledgment {
    transport: Arc<dyn Transport>,
    endpoint: QueueEndpoint,
    token: AckToken,
}

impl Acknowledgment {
    pub fn new(transport: Arc<dyn Transport>, endpoint: QueueEndpoint, token: AckToken) -> Self {
        Self {
            transport,
            endpoint,
            token,
        }
    }

    pub fn token(&self) -> &AckToken {
        &self.token
    }

    /// Delete the message this handle was minted for.
    pub async fn acknowledge(&self) -> Result<(), TransportError> {
        self.transport
            .delete_message(&self.endpoint, &self.token)
            .await
    }
}

impl fmt::Debug for Acknowledgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledgment")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Pause returned for an unscripted receive, standing in for an idle
    /// long poll so test loops don't spin hot.
    const IDLE_RECEIVE_PAUSE: Duration = Duration::from_millis(20);

    /// Scripted outcome of one receive call
    #[derive(Debug)]
    pub enum ScriptedReceive {
        Batch(Vec<MessageEnvelope>),
        Error(String),
    }

    /// Mock transport driven by a script of receive outcomes.
    ///
    /// Each `receive_batch` consumes the next scripted entry; once the script
    /// is exhausted every receive returns an empty batch after a short pause.
    /// Deletes are recorded, never fail.
    pub struct MockTransport {
        script: Mutex<VecDeque<ScriptedReceive>>,
        redrive_endpoints: Mutex<HashSet<String>>,
        receive_calls: AtomicUsize,
        deleted: Mutex<Vec<AckToken>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                redrive_endpoints: Mutex::new(HashSet::new()),
                receive_calls: AtomicUsize::new(0),
                deleted: Mutex::new(Vec::new()),
            }
        }

        pub fn mark_redrive(&self, endpoint: &QueueEndpoint) {
            self.redrive_endpoints
                .lock()
                .unwrap()
                .insert(endpoint.as_str().to_string());
        }

        pub fn script_batch(&self, batch: Vec<MessageEnvelope>) {
            self.script
                .lock()
                .unwrap()
                .push_back(ScriptedReceive::Batch(batch));
        }

        pub fn script_error(&self, reason: impl Into<String>) {
            self.script
                .lock()
                .unwrap()
                .push_back(ScriptedReceive::Error(reason.into()));
        }

        pub fn receive_call_count(&self) -> usize {
            self.receive_calls.load(Ordering::SeqCst)
        }

        pub fn deleted_tokens(&self) -> Vec<AckToken> {
            self.deleted.lock().unwrap().clone()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn receive_batch(
            &self,
            request: &ReceiveRequest,
        ) -> Result<Vec<MessageEnvelope>, TransportError> {
            self.receive_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(ScriptedReceive::Batch(batch)) => Ok(batch),
                Some(ScriptedReceive::Error(reason)) => Err(TransportError::Receive {
                    endpoint: request.endpoint.as_str().to_string(),
                    reason,
                }),
                None => {
                    tokio::time::sleep(IDLE_RECEIVE_PAUSE).await;
                    Ok(Vec::new())
                }
            }
        }

        async fn delete_message(
            &self,
            _endpoint: &QueueEndpoint,
            token: &AckToken,
        ) -> Result<(), TransportError> {
            self.deleted.lock().unwrap().push(token.clone());
            Ok(())
        }

        async fn has_redrive_policy(
            &self,
            endpoint: &QueueEndpoint,
        ) -> Result<bool, TransportError> {
            Ok(self
                .redrive_endpoints
                .lock()
                .unwrap()
                .contains(endpoint.as_str()))
        }
    }

    /// Shorthand for building an envelope with a derived receipt token.
    pub fn envelope(message_id: &str, body: &str) -> MessageEnvelope {
        MessageEnvelope::new(message_id, body, AckToken::new(format!("rh-{message_id}")))
    }
}
