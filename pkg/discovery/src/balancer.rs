use pkg_types::endpoint::Endpoint;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::DiscoveryError;
use crate::directory::EndpointDirectory;

/// An ordered, non-empty endpoint list with a cursor.
///
/// The cursor always points inside the list, so `next` can never read
/// out of range.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl EndpointSet {
    /// Returns `None` for an empty list.
    pub fn new(endpoints: Vec<Endpoint>) -> Option<Self> {
        if endpoints.is_empty() {
            return None;
        }
        Some(Self {
            endpoints,
            cursor: 0,
        })
    }

    /// Endpoint at the cursor; the cursor advances and wraps to zero.
    pub fn next(&mut self) -> Endpoint {
        let endpoint = self.endpoints[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        endpoint
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Round-robin selector over the endpoints of one `(service, namespace)`.
///
/// The list and cursor live behind one mutex and are swapped together on
/// refresh, so a concurrent `next` sees either the old set or the new one.
pub struct RoundRobinLoadBalancer {
    service: String,
    namespace: String,
    directory: Arc<dyn EndpointDirectory>,
    set: Mutex<EndpointSet>,
}

impl RoundRobinLoadBalancer {
    /// Look up the service's endpoints and build a balancer over them.
    ///
    /// An empty lookup result is a configuration error.
    pub async fn new(
        service: &str,
        namespace: &str,
        directory: Arc<dyn EndpointDirectory>,
    ) -> Result<Self, DiscoveryError> {
        let endpoints = directory.list_endpoints(namespace, service).await?;
        let set = EndpointSet::new(endpoints).ok_or_else(|| DiscoveryError::NoEndpoints {
            service: service.to_string(),
            namespace: namespace.to_string(),
        })?;

        info!(
            "Load balancer for {}.{} created with {} endpoints",
            service,
            namespace,
            set.len()
        );

        Ok(Self {
            service: service.to_string(),
            namespace: namespace.to_string(),
            directory,
            set: Mutex::new(set),
        })
    }

    /// `service.namespace`
    pub fn key(&self) -> String {
        format!("{}.{}", self.service, self.namespace)
    }

    /// Hand out the next endpoint in rotation.
    pub fn next(&self) -> Endpoint {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next()
    }

    /// Snapshot of the current endpoint list.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .endpoints()
            .to_vec()
    }

    /// Fetch a fresh endpoint list and swap it in with the cursor reset.
    /// On error, or on an empty result, the current list stays in place.
    pub async fn refresh(&self) -> Result<usize, DiscoveryError> {
        let endpoints = self
            .directory
            .list_endpoints(&self.namespace, &self.service)
            .await?;
        let set = EndpointSet::new(endpoints).ok_or_else(|| DiscoveryError::NoEndpoints {
            service: self.service.clone(),
            namespace: self.namespace.clone(),
        })?;

        let count = set.len();
        *self.set.lock().unwrap_or_else(PoisonError::into_inner) = set;
        debug!("Refreshed endpoints for {}: {} endpoints", self.key(), count);
        Ok(count)
    }

    /// Spawn the background refresh loop.
    ///
    /// The loop ends when `shutdown` is cancelled or the balancer is dropped.
    /// Refresh failures are logged and the loop carries on.
    pub fn start(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let balancer = Arc::downgrade(self);
        let key = self.key();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(balancer) = balancer.upgrade() else {
                    break;
                };
                if let Err(e) = balancer.refresh().await {
                    warn!("Error refreshing endpoints for {}: {}", key, e);
                }
            }

            debug!("Endpoint refresh loop for {} stopped", key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pkg_types::ApiError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory returning queued responses; repeats the last one when drained.
    struct ScriptedDirectory {
        responses: Mutex<VecDeque<Result<Vec<Endpoint>, u16>>>,
        calls: AtomicUsize,
    }

    impl ScriptedDirectory {
        fn new(responses: Vec<Result<Vec<Endpoint>, u16>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EndpointDirectory for ScriptedDirectory {
        async fn list_endpoints(
            &self,
            _namespace: &str,
            _service: &str,
        ) -> Result<Vec<Endpoint>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            };
            response.map_err(|status| ApiError::from_status(status, "endpoints").unwrap())
        }
    }

    fn endpoints(prefix: &str, n: usize) -> Vec<Endpoint> {
        (0..n)
            .map(|i| Endpoint::new(&format!("{}-{}", prefix, i), &format!("10.0.0.{}", i + 1), 8080))
            .collect()
    }

    #[test]
    fn test_endpoint_set_cycles_in_order() {
        let mut set = EndpointSet::new(endpoints("a", 3)).unwrap();
        let names: Vec<String> = (0..4).map(|_| set.next().name).collect();
        assert_eq!(names, vec!["a-0", "a-1", "a-2", "a-0"]);
        assert_eq!(set.cursor(), 1);
    }

    #[test]
    fn test_endpoint_set_rejects_empty() {
        assert!(EndpointSet::new(vec![]).is_none());
    }

    #[tokio::test]
    async fn test_each_endpoint_once_per_cycle() {
        let directory = ScriptedDirectory::new(vec![Ok(endpoints("a", 5))]);
        let lb = RoundRobinLoadBalancer::new("test", "default", directory)
            .await
            .unwrap();

        let first: Vec<String> = (0..5).map(|_| lb.next().name).collect();
        assert_eq!(first, vec!["a-0", "a-1", "a-2", "a-3", "a-4"]);
        assert_eq!(lb.next().name, "a-0");
    }

    #[tokio::test]
    async fn test_new_fails_on_lookup_error() {
        let directory = ScriptedDirectory::new(vec![Err(404)]);
        let err = RoundRobinLoadBalancer::new("test", "default", directory)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DiscoveryError::Lookup(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_new_fails_on_empty_list() {
        let directory = ScriptedDirectory::new(vec![Ok(vec![])]);
        let err = RoundRobinLoadBalancer::new("test", "default", directory)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DiscoveryError::NoEndpoints { .. }));
    }

    #[tokio::test]
    async fn test_refresh_resets_cursor() {
        let directory = ScriptedDirectory::new(vec![Ok(endpoints("old", 3)), Ok(endpoints("new", 2))]);
        let lb = RoundRobinLoadBalancer::new("test", "default", directory)
            .await
            .unwrap();

        lb.next();
        lb.next();
        assert_eq!(lb.refresh().await.unwrap(), 2);
        assert_eq!(lb.next().name, "new-0");
        assert_eq!(lb.next().name, "new-1");
        assert_eq!(lb.next().name, "new-0");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let directory = ScriptedDirectory::new(vec![Ok(endpoints("old", 2)), Err(500), Ok(vec![])]);
        let lb = RoundRobinLoadBalancer::new("test", "default", directory)
            .await
            .unwrap();

        assert_eq!(lb.next().name, "old-0");
        assert!(lb.refresh().await.is_err());
        assert_eq!(lb.next().name, "old-1");
        assert!(matches!(
            lb.refresh().await,
            Err(DiscoveryError::NoEndpoints { .. })
        ));
        assert_eq!(lb.next().name, "old-0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_swaps_list() {
        let directory = ScriptedDirectory::new(vec![
            Ok(endpoints("old", 3)),
            Err(503),
            Ok(endpoints("new", 2)),
        ]);
        let lb = Arc::new(
            RoundRobinLoadBalancer::new("test", "default", directory.clone())
                .await
                .unwrap(),
        );
        lb.next();

        let shutdown = CancellationToken::new();
        let handle = lb.start(Duration::from_secs(10), shutdown.clone());

        // First tick fails; the old list and cursor survive.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(lb.next().name, "old-1");

        // Second tick succeeds; selection restarts at index 0 of the new list.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), 3);
        assert_eq!(lb.next().name, "new-0");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_stops_when_balancer_dropped() {
        let directory = ScriptedDirectory::new(vec![Ok(endpoints("a", 1))]);
        let lb = Arc::new(
            RoundRobinLoadBalancer::new("test", "default", directory.clone())
                .await
                .unwrap(),
        );
        let handle = lb.start(Duration::from_secs(10), CancellationToken::new());
        drop(lb);

        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_next_is_fair() {
        let directory = ScriptedDirectory::new(vec![Ok(endpoints("a", 4))]);
        let lb = Arc::new(
            RoundRobinLoadBalancer::new("test", "default", directory)
                .await
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let lb = lb.clone();
            tasks.push(tokio::spawn(async move {
                (0..100).map(|_| lb.next().name).collect::<Vec<_>>()
            }));
        }

        let mut counts = std::collections::HashMap::new();
        for task in tasks {
            for name in task.await.unwrap() {
                *counts.entry(name).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|c| *c == 200));
    }
}
