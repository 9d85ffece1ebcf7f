//! Process-wide adapter registry.
//!
//! Populated once at startup and read-mostly thereafter. Per-adapter calls
//! are sequential; fan-outs across adapters carry no ordering guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use crate::providers::adapter::StorageAdapter;
use crate::providers::error::{AdapterError, AdapterResult};

struct Entry {
    adapter: Arc<dyn StorageAdapter>,
    degraded: bool,
}

pub struct AdapterRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Initialize and register an adapter. Initialization failure is
    /// non-fatal: the adapter is kept, flagged degraded, so the other
    /// providers keep working.
    pub async fn register(&mut self, adapter: Arc<dyn StorageAdapter>) {
        let slug = adapter.slug();
        let degraded = match adapter.initialize().await {
            Ok(()) => {
                info!(provider = slug, "adapter initialized");
                false
            }
            Err(e) => {
                warn!(provider = slug, error = %e, "adapter initialization failed, continuing degraded");
                true
            }
        };
        self.entries.insert(slug, Entry { adapter, degraded });
    }

    pub fn get(&self, slug: &str) -> AdapterResult<Arc<dyn StorageAdapter>> {
        self.entries
            .get(slug)
            .map(|entry| entry.adapter.clone())
            .ok_or_else(|| AdapterError::unknown_provider(slug))
    }

    pub fn get_opt(&self, slug: &str) -> Option<Arc<dyn StorageAdapter>> {
        self.entries.get(slug).map(|entry| entry.adapter.clone())
    }

    pub fn all(&self) -> Vec<Arc<dyn StorageAdapter>> {
        self.entries
            .values()
            .map(|entry| entry.adapter.clone())
            .collect()
    }

    pub fn slugs(&self) -> Vec<&'static str> {
        let mut slugs: Vec<_> = self.entries.keys().copied().collect();
        slugs.sort_unstable();
        slugs
    }

    pub fn is_degraded(&self, slug: &str) -> bool {
        self.entries
            .get(slug)
            .map(|entry| entry.degraded)
            .unwrap_or(true)
    }

    /// Adapters currently answering their liveness probe. Probes run with
    /// bounded concurrency; order of the result is unspecified.
    pub async fn available(&self) -> Vec<Arc<dyn StorageAdapter>> {
        let mut result = Vec::new();
        for chunk in self.all().chunks(4) {
            let mut probes = FuturesUnordered::new();
            for adapter in chunk {
                let adapter = adapter.clone();
                probes.push(async move {
                    let up = adapter.is_available().await;
                    (adapter, up)
                });
            }
            while let Some((adapter, up)) = probes.next().await {
                if up {
                    result.push(adapter);
                }
            }
        }
        result
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::adapter::testing::MockAdapter;

    #[tokio::test]
    async fn get_errors_on_unknown_slug() {
        let registry = AdapterRegistry::new();
        assert!(registry.get("ghost").is_err());
        assert!(registry.get_opt("ghost").is_none());
    }

    #[tokio::test]
    async fn registered_adapters_are_resolvable() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MockAdapter::new("mock-a"))).await;
        registry.register(Arc::new(MockAdapter::new("mock-b"))).await;

        assert!(registry.get("mock-a").is_ok());
        assert_eq!(registry.slugs(), vec!["mock-a", "mock-b"]);
        assert_eq!(registry.all().len(), 2);
        assert!(!registry.is_degraded("mock-a"));
    }

    #[tokio::test]
    async fn available_filters_unreachable_adapters() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MockAdapter::new("up"))).await;
        let mut down = MockAdapter::new("down");
        down.available = false;
        registry.register(Arc::new(down)).await;

        let available = registry.available().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].slug(), "up");
    }
}
