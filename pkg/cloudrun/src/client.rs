use async_trait::async_trait;
use pkg_constants::{auth, endpoints, timing};
use pkg_metadata::{InstanceMetadata, TokenSource};
use pkg_types::ApiError;
use pkg_types::service::Service;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Looks up the URL a named service is reachable at.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// `region` and `project` default to the caller's own when `None`.
    async fn resolve_service_url(
        &self,
        name: &str,
        region: Option<&str>,
        project: Option<&str>,
    ) -> Result<String, ApiError>;
}

/// Client for the Cloud Run Admin API (Knative serving v1 surface).
pub struct CloudRunClient {
    http: reqwest::Client,
    /// Fixed base URL; `None` selects the regional endpoint.
    endpoint: Option<String>,
    tokens: Arc<dyn TokenSource>,
    instance: Arc<dyn InstanceMetadata>,
}

impl CloudRunClient {
    pub fn new(
        endpoint: Option<&str>,
        tokens: Arc<dyn TokenSource>,
        instance: Arc<dyn InstanceMetadata>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(auth::USER_AGENT)
            .timeout(Duration::from_secs(timing::API_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::request("cloud run client", e))?;

        Ok(Self {
            http,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            tokens,
            instance,
        })
    }

    fn base_url(&self, region: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => endpoints::CLOUD_RUN_ENDPOINT_TEMPLATE.replace("{region}", region),
        }
    }

    /// Fetch the service resource `name`.
    pub async fn get_service(
        &self,
        name: &str,
        region: Option<&str>,
        project: Option<&str>,
    ) -> Result<Service, ApiError> {
        let region = match region {
            Some(r) => r.to_string(),
            None => self.instance.region().await?,
        };
        let project = match project {
            Some(p) => p.to_string(),
            None => self.instance.project_id().await?,
        };

        let url = format!(
            "{}/apis/serving.knative.dev/v1/namespaces/{}/services/{}",
            self.base_url(&region),
            project,
            name
        );
        let resource = format!("service {}", name);
        let token = self
            .tokens
            .access_token(&[auth::CLOUD_PLATFORM_SCOPE])
            .await?;

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .send()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;

        if let Some(err) = ApiError::from_status(response.status().as_u16(), &resource) {
            debug!("Cloud Run lookup of {} returned {}", name, response.status());
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;
        serde_json::from_str(&body).map_err(|e| ApiError::malformed(&resource, e))
    }
}

#[async_trait]
impl ServiceResolver for CloudRunClient {
    async fn resolve_service_url(
        &self,
        name: &str,
        region: Option<&str>,
        project: Option<&str>,
    ) -> Result<String, ApiError> {
        let service = self.get_service(name, region, project).await?;
        service
            .url()
            .map(str::to_string)
            .ok_or_else(|| ApiError::malformed(format!("service {}", name), "status has no url"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::error::ApiErrorKind;
    use pkg_types::token::AccessToken;
    use wiremock::matchers::{header, method, path};
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

    async fn cloud_run_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/serving.knative.dev/v1/namespaces/test/services/test"))
            .and(header("Authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":{"url":"https://test-6bn2iswfgq-ue.a.run.app",
                   "address":{"url":"https://test-6bn2iswfgq-ue.a.run.app"}}}"#,
            ))
            .mount(&server)
            .await;
        for (name, status) in [("not-found", 404), ("denied", 403), ("unauthorized", 401), ("broken", 500)] {
            Mock::given(method("GET"))
                .and(path(format!(
                    "/apis/serving.knative.dev/v1/namespaces/test/services/{}",
                    name
                )))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }
        server
    }

    fn client(server: &MockServer) -> CloudRunClient {
        let metadata = Arc::new(StaticMetadata);
        CloudRunClient::new(Some(&server.uri()), metadata.clone(), metadata).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_service_url() {
        let server = cloud_run_server().await;
        let url = client(&server)
            .resolve_service_url("test", None, None)
            .await
            .unwrap();
        assert_eq!(url, "https://test-6bn2iswfgq-ue.a.run.app");
    }

    #[tokio::test]
    async fn test_error_taxonomy() {
        let server = cloud_run_server().await;
        let client = client(&server);

        for (name, expected) in [
            ("not-found", ApiErrorKind::NotFound),
            ("denied", ApiErrorKind::PermissionDenied),
            ("unauthorized", ApiErrorKind::Unauthorized),
            ("broken", ApiErrorKind::Unknown),
        ] {
            let err = client
                .resolve_service_url(name, None, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), expected, "service {}", name);
        }
    }

    #[test]
    fn test_regional_endpoint() {
        let metadata = Arc::new(StaticMetadata);
        let client = CloudRunClient::new(None, metadata.clone(), metadata).unwrap();
        assert_eq!(
            client.base_url("us-central1"),
            "https://us-central1-run.googleapis.com"
        );
    }
}
