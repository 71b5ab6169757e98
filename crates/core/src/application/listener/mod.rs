// Listener - lifecycle controller over per-queue polling loops

pub mod config;
pub mod constants;
mod dispatcher;
mod poller;
mod registry;

pub use config::ContainerConfig;
pub use dispatcher::{Dispatcher, PoolSizing};
pub use registry::QueueDescriptor;

use crate::error::{ContainerError, Result};
use crate::port::{DestinationResolver, MessageHandler, Transport};
use async_trait::async_trait;
use dashmap::DashMap;
use poller::QueuePoller;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Lock a mutex, recovering the guard if a panicking task poisoned it.
fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Container lifecycle: an explicit four-operation state machine plus a
/// global running probe. `initialize` must run before `start`.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn destroy(&self) -> Result<()>;
    fn is_running(&self) -> bool;
}

/// Concurrent polling message-consumer container.
///
/// Owns one polling loop per registered queue and a shared bounded dispatcher.
/// Queues can be started and stopped individually; stopping is cooperative
/// and bounded by `queue_stop_timeout`, never preemptive. Steady-state
/// transport and handler failures are absorbed and logged, so a started
/// container runs indefinitely without external supervision.
pub struct MessageListenerContainer {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn DestinationResolver>,
    handlers: Vec<Arc<dyn MessageHandler>>,
    config: ContainerConfig,

    registry: DashMap<String, Arc<QueueDescriptor>>,
    /// Written by the controller, read by every polling loop on each
    /// iteration; the only state shared across those tasks.
    running_state: Arc<DashMap<String, bool>>,
    poller_handles: Arc<DashMap<String, JoinHandle<()>>>,
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,

    /// Serializes the lifecycle operations, mirroring their host-facing
    /// one-at-a-time contract.
    lifecycle_monitor: tokio::sync::Mutex<()>,
    active: AtomicBool,
    running: AtomicBool,
}

impl MessageListenerContainer {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn DestinationResolver>,
        handlers: Vec<Arc<dyn MessageHandler>>,
        config: ContainerConfig,
    ) -> Result<Self> {
        config.validate()?;
        if handlers.is_empty() {
            return Err(ContainerError::Validation(
                "at least one message handler must be registered".to_string(),
            ));
        }

        Ok(Self {
            transport,
            resolver,
            handlers,
            config,
            registry: DashMap::new(),
            running_state: Arc::new(DashMap::new()),
            poller_handles: Arc::new(DashMap::new()),
            dispatcher: Mutex::new(None),
            lifecycle_monitor: tokio::sync::Mutex::new(()),
            active: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Logical names that survived registration.
    pub fn registered_queues(&self) -> Vec<String> {
        self.registry.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Worker-pool bounds, available once the container is initialized.
    pub fn pool_sizing(&self) -> Option<PoolSizing> {
        locked(&self.dispatcher).as_ref().map(|d| d.sizing())
    }

    /// Whether `initialize` has run and `destroy` has not.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Build the registry and seed one running-state entry (flag false) per
    /// resolved queue. Idempotent; must run before `start`.
    pub async fn initialize(&self) -> Result<()> {
        let _lifecycle = self.lifecycle_monitor.lock().await;
        if self.active.load(Ordering::SeqCst) {
            debug!("Container already initialized");
            return Ok(());
        }

        let registry = registry::build_registry(
            &self.handlers,
            &self.resolver,
            &self.transport,
            &self.config,
        )
        .await?;
        let sizing = PoolSizing::for_container(registry.len(), self.config.max_number_of_messages);

        for (name, descriptor) in registry {
            self.running_state.insert(name.clone(), false);
            self.registry.insert(name, descriptor);
        }
        *locked(&self.dispatcher) = Some(Arc::new(Dispatcher::new(
            Arc::clone(&self.transport),
            sizing,
        )));
        self.active.store(true, Ordering::SeqCst);

        info!(
            queues = self.registry.len(),
            core_size = sizing.core_size,
            max_size = sizing.max_size,
            "Container initialized"
        );
        Ok(())
    }

    /// Start a polling loop for every registered queue not already running.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle_monitor.lock().await;
        if !self.active.load(Ordering::SeqCst) {
            return Err(ContainerError::InvalidState(
                "initialize must run before start".to_string(),
            ));
        }
        debug!("Starting container");

        for name in self.registered_queues() {
            self.start_queue(&name).await?;
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Signal every queue to stop, then wait for each loop to wind down,
    /// bounded per queue by `queue_stop_timeout`.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle_monitor.lock().await;
        debug!("Stopping container");
        self.stop_all_queues().await;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// `stop` followed by releasing the worker pool and the registry. A
    /// destroyed container can be re-initialized.
    pub async fn destroy(&self) -> Result<()> {
        let _lifecycle = self.lifecycle_monitor.lock().await;
        self.stop_all_queues().await;
        self.running.store(false, Ordering::SeqCst);

        *locked(&self.dispatcher) = None;
        self.registry.clear();
        self.running_state.clear();
        self.active.store(false, Ordering::SeqCst);
        info!("Container destroyed");
        Ok(())
    }

    /// Whether the container as a whole has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the polling task for one queue is still alive.
    pub fn is_queue_running(&self, queue_name: &str) -> bool {
        self.poller_handles
            .get(queue_name)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start polling one queue. A no-op when the queue is already flagged as
    /// running; an error when the name was never registered.
    pub async fn start_queue(&self, queue_name: &str) -> Result<()> {
        let descriptor = match self.registry.get(queue_name) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Err(ContainerError::UnknownQueue(queue_name.to_string())),
        };
        let dispatcher = self.dispatcher()?;

        let previously_running = match self.running_state.get_mut(queue_name) {
            Some(mut flag) => std::mem::replace(flag.value_mut(), true),
            None => return Err(ContainerError::UnknownQueue(queue_name.to_string())),
        };
        if previously_running {
            debug!(queue = %queue_name, "Queue already polling, start is a no-op");
            return Ok(());
        }

        let poller = QueuePoller::new(
            descriptor,
            Arc::clone(&self.transport),
            dispatcher,
            Arc::clone(&self.running_state),
            self.config.back_off_time,
        );
        let handles = Arc::clone(&self.poller_handles);
        let name = queue_name.to_string();
        let handle = tokio::spawn(async move {
            poller.run().await;
            // The loop clears its own bookkeeping on a voluntary exit.
            handles.remove(&name);
        });
        self.poller_handles.insert(queue_name.to_string(), handle);
        Ok(())
    }

    /// Request one queue to stop and wait for its loop to exit, up to
    /// `queue_stop_timeout`. On timeout the loop is left to finish its
    /// current batch; it is never aborted. Idempotent on stopped queues.
    pub async fn stop_queue(&self, queue_name: &str) -> Result<()> {
        match self.running_state.get_mut(queue_name) {
            Some(mut flag) => *flag.value_mut() = false,
            None => return Err(ContainerError::UnknownQueue(queue_name.to_string())),
        }
        self.wait_for_queue_to_stop(queue_name).await;
        Ok(())
    }

    fn dispatcher(&self) -> Result<Arc<Dispatcher>> {
        locked(&self.dispatcher)
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| {
                ContainerError::InvalidState("initialize must run before start".to_string())
            })
    }

    async fn stop_all_queues(&self) {
        // Flip every flag first so all loops wind down in parallel...
        let names: Vec<String> = self
            .running_state
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in &names {
            if let Some(mut flag) = self.running_state.get_mut(name) {
                *flag.value_mut() = false;
            }
        }
        // ...then wait for each, bounded by the per-queue stop timeout.
        for name in &names {
            self.wait_for_queue_to_stop(name).await;
        }
    }

    async fn wait_for_queue_to_stop(&self, queue_name: &str) {
        if let Some((_, handle)) = self.poller_handles.remove(queue_name) {
            match timeout(self.config.queue_stop_timeout, handle).await {
                Ok(Ok(())) => debug!(queue = %queue_name, "Queue stopped"),
                Ok(Err(e)) => warn!(
                    queue = %queue_name,
                    error = %e,
                    "Polling task ended abnormally while stopping"
                ),
                Err(_) => warn!(
                    queue = %queue_name,
                    timeout_ms = self.config.queue_stop_timeout.as_millis() as u64,
                    "Timed out waiting for queue to stop; the loop exits after its current batch"
                ),
            }
        }
    }
}

#[async_trait]
impl Lifecycle for MessageListenerContainer {
    async fn initialize(&self) -> Result<()> {
        MessageListenerContainer::initialize(self).await
    }

    async fn start(&self) -> Result<()> {
        MessageListenerContainer::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        MessageListenerContainer::stop(self).await
    }

    async fn destroy(&self) -> Result<()> {
        MessageListenerContainer::destroy(self).await
    }

    fn is_running(&self) -> bool {
        MessageListenerContainer::is_running(self)
    }
}
