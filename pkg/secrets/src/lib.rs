//! Secret Manager access for workload configuration.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pkg_constants::{auth, timing};
use pkg_metadata::{InstanceMetadata, TokenSource};
use pkg_types::ApiError;
use pkg_types::secret::SecretVersion;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const LATEST_VERSION: &str = "latest";

pub struct SecretManagerClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
    instance: Arc<dyn InstanceMetadata>,
}

impl SecretManagerClient {
    pub fn new(
        endpoint: &str,
        tokens: Arc<dyn TokenSource>,
        instance: Arc<dyn InstanceMetadata>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(auth::USER_AGENT)
            .timeout(Duration::from_secs(timing::API_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::request("secret manager client", e))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            tokens,
            instance,
        })
    }

    /// Payload of the latest version of secret `name`.
    pub async fn access_secret(&self, name: &str) -> Result<Vec<u8>, ApiError> {
        self.access_secret_version(name, LATEST_VERSION).await
    }

    pub async fn access_secret_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let project = self.instance.numeric_project_id().await?;
        let url = format!(
            "{}/projects/{}/secrets/{}/versions/{}:access",
            self.endpoint, project, name, version
        );
        let resource = format!("secret {}/{}", name, version);
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
            debug!("Secret {} returned {}", name, response.status());
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;
        let version: SecretVersion =
            serde_json::from_str(&body).map_err(|e| ApiError::malformed(&resource, e))?;

        STANDARD
            .decode(version.payload.data.as_bytes())
            .map_err(|e| ApiError::malformed(&resource, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
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

    async fn secret_server() -> MockServer {
        let server = MockServer::start().await;
        // "VGVzdA==" is "Test".
        Mock::given(method("GET"))
            .and(path("/projects/123456789/secrets/foo/versions/latest:access"))
            .and(header("Authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name":"projects/123456789/secrets/foo/versions/1",
                   "payload":{"data":"VGVzdA=="}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/123456789/secrets/garbled/versions/latest:access"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"payload":{"data":"%%%"}}"#),
            )
            .mount(&server)
            .await;
        for (name, status) in [("bar", 404), ("denied", 403), ("unauthorized", 401), ("broken", 500)] {
            Mock::given(method("GET"))
                .and(path(format!(
                    "/projects/123456789/secrets/{}/versions/latest:access",
                    name
                )))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }
        server
    }

    fn client(server: &MockServer) -> SecretManagerClient {
        let metadata = Arc::new(StaticMetadata);
        SecretManagerClient::new(&server.uri(), metadata.clone(), metadata).unwrap()
    }

    #[tokio::test]
    async fn test_access_secret() {
        let server = secret_server().await;
        let payload = client(&server).access_secret("foo").await.unwrap();
        assert_eq!(payload, b"Test");
    }

    #[tokio::test]
    async fn test_access_secret_errors() {
        let server = secret_server().await;
        let client = client(&server);

        for (name, expected) in [
            ("bar", ApiErrorKind::NotFound),
            ("denied", ApiErrorKind::PermissionDenied),
            ("unauthorized", ApiErrorKind::Unauthorized),
            ("broken", ApiErrorKind::Unknown),
        ] {
            let err = client.access_secret(name).await.unwrap_err();
            assert_eq!(err.kind(), expected, "secret {}", name);
        }
    }

    #[tokio::test]
    async fn test_invalid_payload_encoding() {
        let server = secret_server().await;
        let err = client(&server).access_secret("garbled").await.unwrap_err();
        assert!(matches!(err, ApiError::Malformed { .. }));
    }
}
