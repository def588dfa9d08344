use async_trait::async_trait;
use pkg_cloudrun::ServiceNameResolver;
use pkg_constants::timing;
use pkg_discovery::{EndpointDirectory, RoundRobinLoadBalancer};
use pkg_metadata::TokenSource;
use pkg_types::endpoint::Endpoint;
use reqwest::header::{AUTHORIZATION, HOST, HeaderValue};
use reqwest::{Request, Response, Url};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hostname::{Hostname, HostnameParser};
use crate::round_trip::RoundTrip;
use crate::TransportError;

/// How logical service names are turned into network destinations.
pub enum NameResolution {
    /// Hosts are sent as-is.
    Disabled,
    /// Names resolve to Service Directory endpoints, balanced round-robin.
    /// The request is authenticated for the logical host, then rewritten.
    ServiceDirectory(Arc<dyn EndpointDirectory>),
    /// Bare names resolve to Cloud Run service URLs. The request is
    /// rewritten first and authenticated for the resolved URL.
    CloudRun(Arc<ServiceNameResolver>),
}

/// Request interceptor attaching identity tokens and resolving service names.
///
/// One load balancer is created per distinct `service.namespace` contacted.
/// Construction of one balancer never blocks requests for another.
/// Their refresh loops stop on [`AuthTransport::shutdown`] or when the
/// transport is dropped.
pub struct AuthTransport {
    next: Arc<dyn RoundTrip>,
    tokens: Arc<dyn TokenSource>,
    resolution: NameResolution,
    parser: HostnameParser,
    balancers: Mutex<HashMap<String, Arc<OnceCell<Arc<RoundRobinLoadBalancer>>>>>,
    refresh_interval: Duration,
    inject_authorization: bool,
    shutdown: CancellationToken,
}

impl AuthTransport {
    pub fn new(
        next: Arc<dyn RoundTrip>,
        tokens: Arc<dyn TokenSource>,
        parser: HostnameParser,
    ) -> Self {
        Self {
            next,
            tokens,
            resolution: NameResolution::Disabled,
            parser,
            balancers: Mutex::new(HashMap::new()),
            refresh_interval: Duration::from_secs(timing::ENDPOINT_REFRESH_INTERVAL_SECS),
            inject_authorization: true,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_resolution(mut self, resolution: NameResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Leave the `Authorization` header alone on every request.
    pub fn without_authorization(mut self) -> Self {
        self.inject_authorization = false;
        self
    }

    /// Stop every background refresh loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Keys of the load balancers created so far.
    pub async fn balancer_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .balancers
            .lock()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    async fn authorize(&self, request: &mut Request) -> Result<(), TransportError> {
        if !self.inject_authorization || request.headers().contains_key(AUTHORIZATION) {
            return Ok(());
        }

        let audience = audience(request.url());
        let token = self
            .tokens
            .identity_token(&audience)
            .await
            .map_err(TransportError::Token)?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    async fn balancer(
        &self,
        directory: &Arc<dyn EndpointDirectory>,
        hostname: &Hostname,
    ) -> Result<Arc<RoundRobinLoadBalancer>, TransportError> {
        let key = hostname.key();
        let cell = self
            .balancers
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone();

        // A failed construction leaves the cell empty for the next request.
        let balancer = cell
            .get_or_try_init(|| async {
                let balancer = Arc::new(
                    RoundRobinLoadBalancer::new(
                        &hostname.service,
                        &hostname.namespace,
                        directory.clone(),
                    )
                    .await?,
                );
                balancer.start(self.refresh_interval, self.shutdown.child_token());
                info!("Started endpoint refresh for {}", key);
                Ok::<_, TransportError>(balancer)
            })
            .await?;
        Ok(balancer.clone())
    }

    async fn route_to_endpoint(
        &self,
        directory: &Arc<dyn EndpointDirectory>,
        mut request: Request,
    ) -> Result<Request, TransportError> {
        let Some(host) = authority(request.url()) else {
            return Ok(request);
        };
        let hostname = match self.parser.parse(&host) {
            Ok(hostname) => hostname,
            Err(e) => {
                debug!("Sending {} unresolved: {}", host, e);
                return Ok(request);
            }
        };

        let endpoint = self.balancer(directory, &hostname).await?.next();
        rewrite_to_endpoint(&mut request, &endpoint, &host)?;
        debug!("Routed {} to {}", host, endpoint.authority());
        Ok(request)
    }

    async fn route_to_service_url(
        &self,
        resolver: &ServiceNameResolver,
        mut request: Request,
    ) -> Result<Request, TransportError> {
        let Some(host) = authority(request.url()) else {
            return Ok(request);
        };
        let hostname = match self.parser.parse(&host) {
            Ok(hostname) if hostname.is_bare() => hostname,
            Ok(_) => return Ok(request),
            Err(e) => {
                debug!("Sending {} unresolved: {}", host, e);
                return Ok(request);
            }
        };

        let base = resolver
            .resolve(&hostname.service)
            .await
            .map_err(|source| TransportError::Resolution {
                service: hostname.service.clone(),
                source,
            })?;
        let base = Url::parse(&base).map_err(|e| TransportError::Rewrite(e.to_string()))?;
        rewrite_to_url(request.url_mut(), &base)?;
        debug!("Routed {} to {}", host, base);
        Ok(request)
    }
}

#[async_trait]
impl RoundTrip for AuthTransport {
    async fn round_trip(&self, mut request: Request) -> Result<Response, TransportError> {
        match &self.resolution {
            NameResolution::Disabled => self.authorize(&mut request).await?,
            NameResolution::ServiceDirectory(directory) => {
                self.authorize(&mut request).await?;
                request = self.route_to_endpoint(directory, request).await?;
            }
            NameResolution::CloudRun(resolver) => {
                request = self.route_to_service_url(resolver, request).await?;
                self.authorize(&mut request).await?;
            }
        }

        self.next.round_trip(request).await
    }
}

impl Drop for AuthTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Host, plus the port when it is not the scheme default.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// `scheme://authority` of the request target.
fn audience(url: &Url) -> String {
    format!("{}://{}", url.scheme(), authority(url).unwrap_or_default())
}

fn rewrite_to_endpoint(
    request: &mut Request,
    endpoint: &Endpoint,
    original_host: &str,
) -> Result<(), TransportError> {
    let url = request.url_mut();
    let host_set = match endpoint.address.parse::<IpAddr>() {
        Ok(ip) => url.set_ip_host(ip),
        Err(_) => url.set_host(Some(&endpoint.address)).map_err(|_| ()),
    };
    host_set.map_err(|_| {
        TransportError::Rewrite(format!("invalid endpoint address {}", endpoint.address))
    })?;
    url.set_port(Some(endpoint.port))
        .map_err(|_| TransportError::Rewrite(format!("cannot set port on {}", url)))?;

    request
        .headers_mut()
        .insert(HOST, HeaderValue::from_str(original_host)?);
    Ok(())
}

fn rewrite_to_url(url: &mut Url, base: &Url) -> Result<(), TransportError> {
    url.set_scheme(base.scheme())
        .map_err(|_| TransportError::Rewrite(format!("cannot switch to scheme {}", base.scheme())))?;
    url.set_host(base.host_str())
        .map_err(|e| TransportError::Rewrite(e.to_string()))?;
    url.set_port(base.port())
        .map_err(|_| TransportError::Rewrite(format!("cannot set port on {}", url)))?;
    Ok(())
}
