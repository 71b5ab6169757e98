// Container configuration

use super::constants::{
    DEFAULT_BACK_OFF_TIME, DEFAULT_MAX_NUMBER_OF_MESSAGES, DEFAULT_QUEUE_STOP_TIMEOUT,
};
use crate::error::{ContainerError, Result};
use std::time::Duration;

/// Operational settings shared by every queue registered on one container.
///
/// Frozen into the per-queue descriptors at `initialize`; changing the config
/// afterwards has no effect on already-registered queues.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Maximum number of messages retrieved in one poll (1-10).
    pub max_number_of_messages: u8,
    /// Seconds received messages stay hidden from subsequent polls.
    pub visibility_timeout_seconds: Option<u32>,
    /// Long-poll duration in seconds; `None` falls back to short polling.
    pub wait_time_seconds: Option<u32>,
    /// Sleep after a transport error before the poll is retried.
    pub back_off_time: Duration,
    /// Maximum wait for one queue to stop gracefully.
    pub queue_stop_timeout: Duration,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_number_of_messages: DEFAULT_MAX_NUMBER_OF_MESSAGES,
            visibility_timeout_seconds: None,
            wait_time_seconds: None,
            back_off_time: DEFAULT_BACK_OFF_TIME,
            queue_stop_timeout: DEFAULT_QUEUE_STOP_TIMEOUT,
        }
    }
}

impl ContainerConfig {
    pub fn with_max_number_of_messages(mut self, max: u8) -> Self {
        self.max_number_of_messages = max;
        self
    }

    pub fn with_visibility_timeout_seconds(mut self, seconds: u32) -> Self {
        self.visibility_timeout_seconds = Some(seconds);
        self
    }

    pub fn with_wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    pub fn with_back_off_time(mut self, back_off: Duration) -> Self {
        self.back_off_time = back_off;
        self
    }

    pub fn with_queue_stop_timeout(mut self, timeout: Duration) -> Self {
        self.queue_stop_timeout = timeout;
        self
    }

    /// Validate bounds. Run once when the container is constructed.
    pub fn validate(&self) -> Result<()> {
        if !(1..=DEFAULT_MAX_NUMBER_OF_MESSAGES).contains(&self.max_number_of_messages) {
            return Err(ContainerError::Validation(format!(
                "max_number_of_messages must be between 1 and {}, got {}",
                DEFAULT_MAX_NUMBER_OF_MESSAGES, self.max_number_of_messages
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_default_config_is_valid() {
        let config = ContainerConfig::default();
        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.max_number_of_messages, 10);
        assert_eq!(config.back_off_time, Duration::from_millis(10_000));
        assert_eq!(config.queue_stop_timeout, Duration::from_millis(10_000));
        assert!(config.visibility_timeout_seconds.is_none());
        assert!(config.wait_time_seconds.is_none());
    }

    #[test]
    fn test_batch_size_bounds() {
        for valid in 1..=10u8 {
            let config = ContainerConfig::default().with_max_number_of_messages(valid);
            assert!(config.validate().is_ok(), "batch size {valid} should pass");
        }

        for invalid in [0u8, 11, 100] {
            let config = ContainerConfig::default().with_max_number_of_messages(invalid);
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ContainerError::Validation(_)),
                "batch size {invalid} should fail validation"
            );
        }
    }

    #[test]
    fn test_builder_style_overrides() {
        let config = ContainerConfig::default()
            .with_max_number_of_messages(5)
            .with_visibility_timeout_seconds(30)
            .with_wait_time_seconds(20)
            .with_back_off_time(Duration::from_millis(250))
            .with_queue_stop_timeout(Duration::from_secs(2));

        assert_eq!(config.max_number_of_messages, 5);
        assert_eq!(config.visibility_timeout_seconds, Some(30));
        assert_eq!(config.wait_time_seconds, Some(20));
        assert_eq!(config.back_off_time, Duration::from_millis(250));
        assert_eq!(config.queue_stop_timeout, Duration::from_secs(2));
    }
}
