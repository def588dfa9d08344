use pkg_cloudrun::{CloudRunClient, ServiceNameResolver};
use pkg_discovery::ServiceDirectoryClient;
use pkg_metadata::MetadataClient;
use pkg_pki::MtlsConfigManager;
use pkg_types::config::RuntimeConfig;
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response};
use std::sync::Arc;

use crate::auth::{AuthTransport, NameResolution};
use crate::hostname::HostnameParser;
use crate::round_trip::{HttpTransport, RoundTrip};
use crate::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionMode {
    Disabled,
    #[default]
    ServiceDirectory,
    CloudRun,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub inject_authorization: bool,
    pub resolution: ResolutionMode,
    /// Use the manager's certificate for outbound TLS and verify servers
    /// against its allow list.
    pub mtls: Option<Arc<MtlsConfigManager>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            inject_authorization: true,
            resolution: ResolutionMode::default(),
            mtls: None,
        }
    }
}

/// HTTP client whose requests all go through an [`AuthTransport`].
pub struct Client {
    http: reqwest::Client,
    transport: Arc<AuthTransport>,
}

impl Client {
    pub fn new(config: &RuntimeConfig, metadata: Arc<MetadataClient>) -> Result<Self, TransportError> {
        Self::with_options(config, metadata, ClientOptions::default())
    }

    pub fn with_options(
        config: &RuntimeConfig,
        metadata: Arc<MetadataClient>,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        let base = match &options.mtls {
            Some(manager) => HttpTransport::with_mtls(manager)?,
            None => HttpTransport::new()?,
        };
        let http = base.client().clone();

        let resolution = match options.resolution {
            ResolutionMode::Disabled => NameResolution::Disabled,
            ResolutionMode::ServiceDirectory => {
                let directory = ServiceDirectoryClient::new(
                    &config.service_directory_endpoint,
                    metadata.clone(),
                    metadata.clone(),
                )
                .map_err(TransportError::Setup)?;
                NameResolution::ServiceDirectory(Arc::new(directory))
            }
            ResolutionMode::CloudRun => {
                let cloud_run = CloudRunClient::new(
                    config.cloud_run_endpoint.as_deref(),
                    metadata.clone(),
                    metadata.clone(),
                )
                .map_err(TransportError::Setup)?;
                NameResolution::CloudRun(Arc::new(ServiceNameResolver::new(
                    Arc::new(cloud_run),
                    config.service_url_ttl,
                )))
            }
        };

        let mut transport = AuthTransport::new(
            Arc::new(base),
            metadata,
            HostnameParser::from_config(config),
        )
        .with_resolution(resolution)
        .with_refresh_interval(config.endpoint_refresh_interval);
        if !options.inject_authorization {
            transport = transport.without_authorization();
        }

        Ok(Self::from_transport(http, Arc::new(transport)))
    }

    /// `http` only builds requests; sending always goes through `transport`.
    pub fn from_transport(http: reqwest::Client, transport: Arc<AuthTransport>) -> Self {
        Self { http, transport }
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.http.request(method, url)
    }

    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.transport.round_trip(request).await
    }

    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Response, TransportError> {
        let request = self.http.get(url).build()?;
        self.execute(request).await
    }

    pub fn transport(&self) -> &Arc<AuthTransport> {
        &self.transport
    }

    /// Stop the background endpoint refresh of every balancer.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn metadata_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/service-accounts/default/identity"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("id-token"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_client_authenticates_with_metadata_token() {
        let metadata_server = metadata_server().await;
        let backend = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(header("authorization", "Bearer id-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("up"))
            .expect(1)
            .mount(&backend)
            .await;

        let config = RuntimeConfig::default();
        let metadata = Arc::new(MetadataClient::new(&metadata_server.uri()).unwrap());
        let client = Client::new(&config, metadata).unwrap();

        let response = client
            .get(format!("{}/status", backend.uri()))
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "up");

        client.shutdown();
        assert!(client.transport().is_shutdown());
    }

    #[tokio::test]
    async fn test_client_without_authorization() {
        let metadata_server = metadata_server().await;
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&backend)
            .await;

        let metadata = Arc::new(MetadataClient::new(&metadata_server.uri()).unwrap());
        let options = ClientOptions {
            inject_authorization: false,
            resolution: ResolutionMode::Disabled,
            mtls: None,
        };
        let client = Client::with_options(&RuntimeConfig::default(), metadata, options).unwrap();

        let request = client
            .request(Method::POST, backend.uri())
            .body("payload")
            .build()
            .unwrap();
        let response = client.execute(request).await.unwrap();
        assert_eq!(response.status(), 201);

        let received = backend.received_requests().await.unwrap();
        assert!(!received[0].headers.contains_key("authorization"));
        assert!(metadata_server.received_requests().await.unwrap().is_empty());
    }
}
