// Static destination resolver
// Maps logical queue names to in-memory endpoints through a fixed table.

use async_trait::async_trait;
use conveyor_core::domain::QueueEndpoint;
use conveyor_core::port::{DestinationResolver, ResolutionError};
use dashmap::DashMap;

/// Resolver backed by a routing table populated by the host.
///
/// Unregistered names resolve to `NotFound`, which the container's registry
/// treats as "skip this queue".
pub struct StaticDestinationResolver {
    routes: DashMap<String, QueueEndpoint>,
}

impl StaticDestinationResolver {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }

    pub fn route(self, logical_name: impl Into<String>, endpoint: QueueEndpoint) -> Self {
        self.routes.insert(logical_name.into(), endpoint);
        self
    }

    pub fn add_route(&self, logical_name: impl Into<String>, endpoint: QueueEndpoint) {
        self.routes.insert(logical_name.into(), endpoint);
    }
}

impl Default for StaticDestinationResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DestinationResolver for StaticDestinationResolver {
    async fn resolve(&self, logical_name: &str) -> Result<QueueEndpoint, ResolutionError> {
        self.routes
            .get(logical_name)
            .map(|endpoint| endpoint.clone())
            .ok_or_else(|| ResolutionError::NotFound(logical_name.to_string()))
    }
}
