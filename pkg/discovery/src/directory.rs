use async_trait::async_trait;
use pkg_constants::{auth, env, timing};
use pkg_metadata::{InstanceMetadata, TokenSource};
use pkg_types::ApiError;
use pkg_types::endpoint::{Endpoint, ListEndpoints};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::DiscoveryError;
use crate::network::{self, is_rfc1918};

/// Source of the live endpoint list for a logical service.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    async fn list_endpoints(&self, namespace: &str, service: &str)
    -> Result<Vec<Endpoint>, ApiError>;
}

/// The calling instance, as advertised to Service Directory.
#[derive(Debug, Clone)]
pub struct EndpointRegistration {
    pub service: String,
    pub address: IpAddr,
    pub port: u16,
    pub instance_id: String,
}

/// Client for the Service Directory REST API.
pub struct ServiceDirectoryClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
    instance: Arc<dyn InstanceMetadata>,
}

impl ServiceDirectoryClient {
    pub fn new(
        endpoint: &str,
        tokens: Arc<dyn TokenSource>,
        instance: Arc<dyn InstanceMetadata>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(auth::USER_AGENT)
            .timeout(Duration::from_secs(timing::SERVICE_DIRECTORY_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::request("service directory client", e))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            tokens,
            instance,
        })
    }

    /// `{base}/v1/projects/{p}/locations/{r}/namespaces/{ns}/services/{svc}/endpoints`
    async fn endpoints_url(&self, namespace: &str, service: &str) -> Result<String, ApiError> {
        let project = self.instance.project_id().await?;
        let region = self.instance.region().await?;
        Ok(format!(
            "{}/v1/projects/{}/locations/{}/namespaces/{}/services/{}/endpoints",
            self.endpoint, project, region, namespace, service
        ))
    }

    async fn bearer(&self) -> Result<String, ApiError> {
        let token = self
            .tokens
            .access_token(&[auth::CLOUD_PLATFORM_SCOPE])
            .await?;
        Ok(token.bearer())
    }

    /// Register the calling instance as an endpoint of `registration.service`.
    /// Returns the endpoint id.
    pub async fn register_endpoint(
        &self,
        namespace: &str,
        registration: &EndpointRegistration,
    ) -> Result<String, DiscoveryError> {
        if !is_rfc1918(registration.address) {
            return Err(DiscoveryError::UnroutableAddress(registration.address));
        }

        let id = endpoint_id(&registration.service, registration.address);
        let url = self
            .endpoints_url(namespace, &registration.service)
            .await?;
        let resource = format!("endpoint {}", id);

        let mut annotations = HashMap::new();
        annotations.insert(
            auth::INSTANCE_ID_ANNOTATION.to_string(),
            registration.instance_id.clone(),
        );
        let body = Endpoint {
            address: registration.address.to_string(),
            port: registration.port,
            annotations,
            ..Default::default()
        };

        let response = self
            .http
            .post(&url)
            .query(&[("endpointId", id.as_str())])
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;

        let status = response.status();
        if let Some(err) = ApiError::from_status(status.as_u16(), &resource) {
            let detail = response.text().await.unwrap_or_default();
            error!("Unable to register endpoint {}: {} {}", id, status, detail);
            return Err(err.into());
        }

        info!("Successfully registered endpoint: {}", id);
        Ok(id)
    }

    /// Register the running instance under its `K_SERVICE` name, advertising
    /// its own RFC 1918 address.
    pub async fn register_instance(
        &self,
        namespace: &str,
        port: u16,
    ) -> Result<String, DiscoveryError> {
        let service = std::env::var(env::K_SERVICE)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(DiscoveryError::MissingServiceName)?;
        let address = network::ip_address()?;
        self.register_as(namespace, &service, address, port).await
    }

    async fn register_as(
        &self,
        namespace: &str,
        service: &str,
        address: IpAddr,
        port: u16,
    ) -> Result<String, DiscoveryError> {
        let instance_id = self.instance.instance_id().await?;
        let registration = EndpointRegistration {
            service: service.to_string(),
            address,
            port,
            instance_id,
        };
        self.register_endpoint(namespace, &registration).await
    }

    /// Remove the endpoint previously registered for `address`.
    pub async fn deregister_endpoint(
        &self,
        namespace: &str,
        service: &str,
        address: IpAddr,
    ) -> Result<(), DiscoveryError> {
        let id = endpoint_id(service, address);
        let url = format!("{}/{}", self.endpoints_url(namespace, service).await?, id);
        let resource = format!("endpoint {}", id);

        let response = self
            .http
            .delete(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;

        if let Some(err) = ApiError::from_status(response.status().as_u16(), &resource) {
            let detail = response.text().await.unwrap_or_default();
            error!("Unable to deregister endpoint {}: {}", id, detail);
            return Err(err.into());
        }

        info!("Deregistered endpoint: {}", id);
        Ok(())
    }
}

#[async_trait]
impl EndpointDirectory for ServiceDirectoryClient {
    async fn list_endpoints(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Vec<Endpoint>, ApiError> {
        let url = self.endpoints_url(namespace, service).await?;
        let resource = format!("endpoints of {}.{}", service, namespace);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;

        let status = response.status();
        let data = response
            .text()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;

        if let Some(err) = ApiError::from_status(status.as_u16(), &resource) {
            error!("Listing {} returned {}: {}", resource, status, data);
            return Err(err);
        }

        let list: ListEndpoints =
            serde_json::from_str(&data).map_err(|e| ApiError::malformed(&resource, e))?;
        Ok(list.endpoints)
    }
}

/// Endpoint id of an instance: `<service>-<address with dashes>`.
pub fn endpoint_id(service: &str, address: IpAddr) -> String {
    format!("{}-{}", service, address.to_string().replace(['.', ':'], "-"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::error::ApiErrorKind;
    use pkg_types::token::AccessToken;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticMetadata;

    #[async_trait]
    impl TokenSource for StaticMetadata {
        async fn identity_token(&self, _audience: &str) -> Result<String, ApiError> {
            Ok("id-token".to_string())
        }

        async fn access_token(&self, _scopes: &[&str]) -> Result<AccessToken, ApiError> {
            Ok(serde_json::from_str(
                r#"{"access_token":"ya29.test","expires_in":3600,"token_type":"Bearer"}"#,
            )
            .unwrap())
        }
    }

    #[async_trait]
    impl InstanceMetadata for StaticMetadata {
        async fn project_id(&self) -> Result<String, ApiError> {
            Ok("test".to_string())
        }
        async fn numeric_project_id(&self) -> Result<String, ApiError> {
            Ok("123456789".to_string())
        }
        async fn region(&self) -> Result<String, ApiError> {
            Ok("test".to_string())
        }
        async fn instance_id(&self) -> Result<String, ApiError> {
            Ok("instance-1".to_string())
        }
    }

    const ENDPOINTS_PATH: &str =
        "/v1/projects/test/locations/test/namespaces/default/services/test/endpoints";

    fn client(server: &MockServer) -> ServiceDirectoryClient {
        let metadata = Arc::new(StaticMetadata);
        ServiceDirectoryClient::new(&server.uri(), metadata.clone(), metadata).unwrap()
    }

    #[tokio::test]
    async fn test_list_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ENDPOINTS_PATH))
            .and(header("Authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"endpoints":[
                    {"name":"test-10-0-0-1","address":"10.0.0.1","port":8080},
                    {"name":"test-10-0-0-2","address":"10.0.0.2","port":8080}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let endpoints = client(&server)
            .list_endpoints("default", "test")
            .await
            .unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].address, "10.0.0.1");
        assert_eq!(endpoints[1].name, "test-10-0-0-2");
    }

    #[tokio::test]
    async fn test_list_endpoints_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ENDPOINTS_PATH))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_endpoints("default", "test")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_register_and_deregister() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINTS_PATH))
            .and(query_param("endpointId", "test-10-0-0-7"))
            .and(body_partial_json(serde_json::json!({
                "address": "10.0.0.7",
                "port": 8080,
                "annotations": {"instance_id": "instance-1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/test-10-0-0-7", ENDPOINTS_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let registration = EndpointRegistration {
            service: "test".to_string(),
            address: "10.0.0.7".parse().unwrap(),
            port: 8080,
            instance_id: "instance-1".to_string(),
        };

        let id = client
            .register_endpoint("default", &registration)
            .await
            .unwrap();
        assert_eq!(id, "test-10-0-0-7");

        client
            .deregister_endpoint("default", "test", registration.address)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_rejects_public_address() {
        let server = MockServer::start().await;
        let registration = EndpointRegistration {
            service: "test".to_string(),
            address: "8.8.8.8".parse().unwrap(),
            port: 8080,
            instance_id: "instance-1".to_string(),
        };
        let err = client(&server)
            .register_endpoint("default", &registration)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnroutableAddress(_)));
    }

    #[tokio::test]
    async fn test_register_as_annotates_instance_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINTS_PATH))
            .and(query_param("endpointId", "test-10-8-0-4"))
            .and(body_partial_json(serde_json::json!({
                "address": "10.8.0.4",
                "port": 8443,
                "annotations": {"instance_id": "instance-1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .register_as("default", "test", "10.8.0.4".parse().unwrap(), 8443)
            .await
            .unwrap();
        assert_eq!(id, "test-10-8-0-4");
    }
}
