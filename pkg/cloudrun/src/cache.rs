use pkg_types::ApiError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::client::ServiceResolver;

#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    stored_at: Instant,
}

/// Service name → URL memo shared by all requests of a transport.
///
/// Entries never expire unless a TTL is configured. Failed lookups are
/// never stored.
#[derive(Debug, Default)]
pub struct ServiceUrlCache {
    entries: RwLock<HashMap<String, CachedUrl>>,
    ttl: Option<Duration>,
}

impl ServiceUrlCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached URL for `name`, if present and not expired.
    pub fn get(&self, name: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(name)?;
        match self.ttl {
            Some(ttl) if entry.stored_at.elapsed() >= ttl => None,
            _ => Some(entry.url.clone()),
        }
    }

    pub fn set(&self, name: &str, url: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                CachedUrl {
                    url: url.to_string(),
                    stored_at: Instant::now(),
                },
            );
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, name: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache-first service name resolution.
pub struct ServiceNameResolver {
    resolver: Arc<dyn ServiceResolver>,
    cache: ServiceUrlCache,
}

impl ServiceNameResolver {
    pub fn new(resolver: Arc<dyn ServiceResolver>, ttl: Option<Duration>) -> Self {
        Self {
            resolver,
            cache: ServiceUrlCache::new(ttl),
        }
    }

    /// URL of `name`, from the cache or from the resolver on a miss.
    pub async fn resolve(&self, name: &str) -> Result<String, ApiError> {
        if let Some(url) = self.cache.get(name) {
            return Ok(url);
        }

        let url = self.resolver.resolve_service_url(name, None, None).await?;
        debug!("Resolved service {} to {}", name, url);
        self.cache.set(name, &url);
        Ok(url)
    }

    pub fn cache(&self) -> &ServiceUrlCache {
        &self.cache
    }
}
