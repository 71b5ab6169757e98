// Central Error Type for the Container

use thiserror::Error;

/// Container-level error type
///
/// Only configuration and precondition failures surface here. Steady-state
/// runtime errors (transport hiccups, handler failures) are absorbed by the
/// polling loops and the dispatcher and resolved through logs and the
/// deletion policy, never raised to the host.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Queue with name '{0}' is not registered")]
    UnknownQueue(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::port::TransportError),
}

/// Result type alias using ContainerError
pub type Result<T> = std::result::Result<T, ContainerError>;
