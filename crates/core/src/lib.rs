// Conveyor Core - Domain Logic & Ports
// NO transport SDK dependencies: the queue system, the destination resolver
// and the message handlers are supplied by the host through the port layer.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{ContainerError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
