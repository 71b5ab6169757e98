// Message Handler Port
// The application-supplied processing side of the container.

use crate::domain::{DeletionPolicy, MessageEnvelope};
use crate::port::transport::Acknowledgment;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

/// Messaging-level failure raised by a handler for one message.
///
/// Resolved entirely through the deletion policy: the container logs the
/// failure and decides delete-vs-keep, it never re-enqueues or retries.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Processing failed: {0}")]
    Failed(String),
}

/// Message handler trait
///
/// One handler may serve several logical queues; the deletion policy is fixed
/// per handler and copied into every descriptor built from it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Logical queue names this handler consumes from.
    fn destinations(&self) -> HashSet<String>;

    /// Acknowledgment behaviour for messages processed by this handler.
    fn deletion_policy(&self) -> DeletionPolicy {
        DeletionPolicy::default()
    }

    /// Process one message.
    ///
    /// `acknowledgment` is `Some` only under `DeletionPolicy::Never`, in
    /// which case deleting the message is the handler's responsibility.
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        acknowledgment: Option<Acknowledgment>,
    ) -> Result<(), HandlerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return success immediately
        Succeed,
        /// Sleep, then succeed (for concurrency probes)
        Delay(Duration),
        /// Fail with a messaging-level error
        Fail(String),
        /// Panic (for dispatch isolation testing)
        Panic(String),
        /// Acknowledge through the handle, then succeed
        Acknowledge,
    }

    /// Mock Message Handler for testing
    pub struct MockMessageHandler {
        destinations: HashSet<String>,
        policy: DeletionPolicy,
        behavior: MockBehavior,
        handled: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        seen_message_ids: Mutex<Vec<String>>,
    }

    impl MockMessageHandler {
        pub fn new(
            destination: impl Into<String>,
            policy: DeletionPolicy,
            behavior: MockBehavior,
        ) -> Self {
            Self::with_destinations(
                HashSet::from([destination.into()]),
                policy,
                behavior,
            )
        }

        pub fn with_destinations(
            destinations: HashSet<String>,
            policy: DeletionPolicy,
            behavior: MockBehavior,
        ) -> Self {
            Self {
                destinations,
                policy,
                behavior,
                handled: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                seen_message_ids: Mutex::new(Vec::new()),
            }
        }

        /// Completed invocations (success and failure alike).
        pub fn handled_count(&self) -> usize {
            self.handled.load(Ordering::SeqCst)
        }

        /// Highest number of concurrent invocations observed.
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        pub fn seen_message_ids(&self) -> Vec<String> {
            self.seen_message_ids.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageHandler for MockMessageHandler {
        fn destinations(&self) -> HashSet<String> {
            self.destinations.clone()
        }

        fn deletion_policy(&self) -> DeletionPolicy {
            self.policy
        }

        async fn handle(
            &self,
            envelope: &MessageEnvelope,
            acknowledgment: Option<Acknowledgment>,
        ) -> Result<(), HandlerError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            self.seen_message_ids
                .lock()
                .unwrap()
                .push(envelope.message_id.clone());

            let result = match &self.behavior {
                MockBehavior::Succeed => Ok(()),
                MockBehavior::Delay(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                MockBehavior::Fail(reason) => Err(HandlerError::Failed(reason.clone())),
                MockBehavior::Panic(reason) => {
                    panic!("{}", reason);
                }
                MockBehavior::Acknowledge => match acknowledgment {
                    Some(ack) => ack
                        .acknowledge()
                        .await
                        .map_err(|e| HandlerError::Failed(e.to_string())),
                    None => Err(HandlerError::Failed(
                        "no acknowledgment handle was provided".to_string(),
                    )),
                },
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.handled.fetch_add(1, Ordering::SeqCst);
            result
        }
    }
}
