// Destination Resolver Port
// Maps application-facing logical queue names to physical endpoints.

use crate::domain::QueueEndpoint;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Resolution errors
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Destination '{0}' does not exist")]
    NotFound(String),

    #[error("Resolution of '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Destination resolver trait
///
/// The registry treats `NotFound` (and any other resolution failure) as
/// "skip this queue": registration is partial, not all-or-nothing.
#[async_trait]
pub trait DestinationResolver: Send + Sync {
    /// Resolve a logical queue name to its physical endpoint.
    async fn resolve(&self, logical_name: &str) -> Result<QueueEndpoint, ResolutionError>;
}

/// Caching decorator over another resolver.
///
/// Successful resolutions are memoized; failures are not cached, so a later
/// `resolve` retries the inner resolver.
pub struct CachingDestinationResolver<R> {
    inner: R,
    cache: DashMap<String, QueueEndpoint>,
}

impl<R: DestinationResolver> CachingDestinationResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }
}

#[async_trait]
impl<R: DestinationResolver> DestinationResolver for CachingDestinationResolver<R> {
    async fn resolve(&self, logical_name: &str) -> Result<QueueEndpoint, ResolutionError> {
        if let Some(endpoint) = self.cache.get(logical_name) {
            return Ok(endpoint.clone());
        }
        let endpoint = self.inner.resolve(logical_name).await?;
        self.cache.insert(logical_name.to_string(), endpoint.clone());
        Ok(endpoint)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock resolver backed by a fixed routing table.
    ///
    /// Names without a route resolve to `NotFound`, which exercises the
    /// registry's skip-on-unresolved path.
    pub struct MockDestinationResolver {
        routes: DashMap<String, QueueEndpoint>,
        call_count: AtomicUsize,
    }

    impl MockDestinationResolver {
        pub fn new() -> Self {
            Self {
                routes: DashMap::new(),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn route(self, logical_name: impl Into<String>, endpoint: QueueEndpoint) -> Self {
            self.routes.insert(logical_name.into(), endpoint);
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    impl Default for MockDestinationResolver {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DestinationResolver for MockDestinationResolver {
        async fn resolve(&self, logical_name: &str) -> Result<QueueEndpoint, ResolutionError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.routes
                .get(logical_name)
                .map(|endpoint| endpoint.clone())
                .ok_or_else(|| ResolutionError::NotFound(logical_name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockDestinationResolver;
    use super::*;

    #[tokio::test]
    async fn test_caching_resolver_hits_inner_once() {
        let inner = MockDestinationResolver::new().route("orders", QueueEndpoint::new("mem://orders"));
        let caching = CachingDestinationResolver::new(inner);

        let first = caching.resolve("orders").await.unwrap();
        let second = caching.resolve("orders").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(caching.inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_caching_resolver_does_not_cache_failures() {
        let inner = MockDestinationResolver::new();
        let caching = CachingDestinationResolver::new(inner);

        assert!(matches!(
            caching.resolve("missing").await,
            Err(ResolutionError::NotFound(_))
        ));
        assert!(caching.resolve("missing").await.is_err());
        // Both attempts reached the inner resolver.
        assert_eq!(caching.inner.call_count(), 2);
    }
}
