// Listener defaults (no magic values)
use std::time::Duration;

/// Default and upper bound for one batched receive (transport batch limit).
pub const DEFAULT_MAX_NUMBER_OF_MESSAGES: u8 = 10;

/// Sleep after a transport error before the next poll attempt (10s).
pub const DEFAULT_BACK_OFF_TIME: Duration = Duration::from_millis(10_000);

/// Maximum wait for a polling loop to observe a stop request (10s).
pub const DEFAULT_QUEUE_STOP_TIMEOUT: Duration = Duration::from_millis(10_000);
