// Container lifecycle contract, wired through the in-memory adapter

use conveyor_core::application::{ContainerConfig, Lifecycle, MessageListenerContainer};
use conveyor_core::domain::{DeletionPolicy, QueueEndpoint};
use conveyor_core::port::handler::mocks::{MockBehavior, MockMessageHandler};
use conveyor_core::port::{DestinationResolver, MessageHandler, Transport};
use conveyor_core::ContainerError;
use conveyor_infra_memory::{InMemoryTransport, StaticDestinationResolver};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

struct Fixture {
    transport: Arc<InMemoryTransport>,
    handler: Arc<MockMessageHandler>,
    container: MessageListenerContainer,
    endpoint: QueueEndpoint,
}

/// One queue named `orders` backed by `mem://orders`, succeed-everything
/// handler, short stop timeout and a one-second long poll.
fn fixture(policy: DeletionPolicy, behavior: MockBehavior) -> Fixture {
    init_tracing();

    let transport = Arc::new(InMemoryTransport::new());
    let endpoint = QueueEndpoint::new("mem://orders");
    transport.create_queue(&endpoint);

    let resolver: Arc<dyn DestinationResolver> =
        Arc::new(StaticDestinationResolver::new().route("orders", endpoint.clone()));
    let handler = Arc::new(MockMessageHandler::new("orders", policy, behavior));

    let container = MessageListenerContainer::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        resolver,
        vec![Arc::clone(&handler) as Arc<dyn MessageHandler>],
        ContainerConfig::default()
            .with_wait_time_seconds(1)
            .with_queue_stop_timeout(Duration::from_secs(3)),
    )
    .unwrap();

    Fixture {
        transport,
        handler,
        container,
        endpoint,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_lifecycle_round_trip() {
    let f = fixture(DeletionPolicy::OnSuccess, MockBehavior::Succeed);

    f.container.initialize().await.unwrap();
    assert!(f.container.is_active());
    assert!(!f.container.is_running());

    f.container.start().await.unwrap();
    assert!(f.container.is_running());
    assert!(f.container.is_queue_running("orders"));

    f.transport.send_message(&f.endpoint, "hello").unwrap();
    assert!(wait_until(2_000, || f.handler.handled_count() == 1).await);

    f.container.stop().await.unwrap();
    assert!(!f.container.is_running());
    assert!(!f.container.is_queue_running("orders"));

    f.container.destroy().await.unwrap();
    assert!(!f.container.is_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_receive_calls_after_stop_until_restart() {
    let f = fixture(DeletionPolicy::OnSuccess, MockBehavior::Succeed);
    f.container.initialize().await.unwrap();
    f.container.start_queue("orders").await.unwrap();

    f.transport.send_message(&f.endpoint, "one").unwrap();
    assert!(wait_until(2_000, || f.handler.handled_count() == 1).await);

    f.container.stop_queue("orders").await.unwrap();
    assert!(!f.container.is_queue_running("orders"));

    // With the loop gone, the receive counter must freeze even though a
    // message is waiting.
    let calls_after_stop = f.transport.receive_call_count();
    f.transport.send_message(&f.endpoint, "two").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.transport.receive_call_count(), calls_after_stop);
    assert_eq!(f.handler.handled_count(), 1);

    // Restarting resumes consumption.
    f.container.start_queue("orders").await.unwrap();
    assert!(wait_until(2_000, || f.handler.handled_count() == 2).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_stop_and_double_start_are_benign() {
    let f = fixture(DeletionPolicy::OnSuccess, MockBehavior::Succeed);
    f.container.initialize().await.unwrap();

    tokio_test::assert_ok!(f.container.start_queue("orders").await);
    tokio_test::assert_ok!(f.container.start_queue("orders").await);
    assert!(f.container.is_queue_running("orders"));

    tokio_test::assert_ok!(f.container.stop_queue("orders").await);
    tokio_test::assert_ok!(f.container.stop_queue("orders").await);
    assert!(!f.container.is_queue_running("orders"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_times_out_on_a_slow_batch() {
    let f = fixture(
        DeletionPolicy::OnSuccess,
        MockBehavior::Delay(Duration::from_secs(2)),
    );
    let container = MessageListenerContainer::new(
        Arc::clone(&f.transport) as Arc<dyn Transport>,
        Arc::new(StaticDestinationResolver::new().route("orders", f.endpoint.clone())),
        vec![Arc::clone(&f.handler) as Arc<dyn MessageHandler>],
        ContainerConfig::default()
            .with_wait_time_seconds(1)
            .with_queue_stop_timeout(Duration::from_millis(100)),
    )
    .unwrap();

    container.initialize().await.unwrap();
    container.start_queue("orders").await.unwrap();
    f.transport.send_message(&f.endpoint, "slow").unwrap();
    assert!(wait_until(2_000, || f.transport.in_flight_count(&f.endpoint) == 1).await);

    // The handler needs two seconds; the stop gives up after 100ms and
    // returns without killing the loop.
    let started = tokio::time::Instant::now();
    container.stop_queue("orders").await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(1), "stop should not wait out the batch");
    assert!(!container.is_queue_running("orders"));

    // The in-flight message still completes after the timeout.
    assert!(wait_until(4_000, || f.handler.handled_count() == 1).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unresolvable_queue_is_skipped_not_fatal() {
    init_tracing();

    let transport = Arc::new(InMemoryTransport::new());
    let endpoint = QueueEndpoint::new("mem://orders");
    transport.create_queue(&endpoint);

    // Only `orders` has a route; `missing` will not resolve.
    let resolver: Arc<dyn DestinationResolver> =
        Arc::new(StaticDestinationResolver::new().route("orders", endpoint.clone()));
    let handlers: Vec<Arc<dyn MessageHandler>> = vec![
        Arc::new(MockMessageHandler::new(
            "orders",
            DeletionPolicy::OnSuccess,
            MockBehavior::Succeed,
        )),
        Arc::new(MockMessageHandler::new(
            "missing",
            DeletionPolicy::OnSuccess,
            MockBehavior::Succeed,
        )),
    ];

    let container = MessageListenerContainer::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        resolver,
        handlers,
        ContainerConfig::default().with_wait_time_seconds(1),
    )
    .unwrap();

    container.initialize().await.unwrap();
    assert_eq!(container.registered_queues(), vec!["orders".to_string()]);

    assert!(matches!(
        container.start_queue("missing").await,
        Err(ContainerError::UnknownQueue(_))
    ));
    container.start_queue("orders").await.unwrap();
    container.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lifecycle_trait_object() {
    let f = fixture(DeletionPolicy::OnSuccess, MockBehavior::Succeed);
    let lifecycle: Arc<dyn Lifecycle> = Arc::new(f.container);

    lifecycle.initialize().await.unwrap();
    lifecycle.start().await.unwrap();
    assert!(lifecycle.is_running());
    lifecycle.stop().await.unwrap();
    assert!(!lifecycle.is_running());
    lifecycle.destroy().await.unwrap();
}
