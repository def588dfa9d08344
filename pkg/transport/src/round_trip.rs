use async_trait::async_trait;
use pkg_constants::{auth, timing};
use pkg_pki::MtlsConfigManager;
use reqwest::{Request, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::TransportError;

/// One link of the outbound request chain.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError>;
}

/// Terminal link: sends the request over the network.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Self::builder().build()?;
        Ok(Self { client })
    }

    /// Present the workload certificate and verify servers by SPIFFE id.
    pub fn with_mtls(manager: &Arc<MtlsConfigManager>) -> Result<Self, TransportError> {
        let tls = manager.client_config()?;
        let client = Self::builder().use_preconfigured_tls(tls).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(auth::USER_AGENT)
            .timeout(Duration::from_secs(timing::REQUEST_TIMEOUT_SECS))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl RoundTrip for HttpTransport {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}
