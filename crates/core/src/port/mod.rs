// Port Layer - Interfaces for external collaborators

pub mod destination_resolver;
pub mod handler;
pub mod transport;

// Re-exports
pub use destination_resolver::{CachingDestinationResolver, DestinationResolver, ResolutionError};
pub use handler::{HandlerError, MessageHandler};
pub use transport::{Acknowledgment, ReceiveRequest, Transport, TransportError};
