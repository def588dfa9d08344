use async_trait::async_trait;
use pkg_constants::{auth, timing};
use pkg_types::ApiError;
use pkg_types::token::AccessToken;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{InstanceMetadata, TokenSource};

const PROJECT_ID: &str = "project/project-id";
const NUMERIC_PROJECT_ID: &str = "project/numeric-project-id";
const REGION: &str = "instance/region";
const INSTANCE_ID: &str = "instance/id";
const TOKEN: &str = "instance/service-accounts/default/token";
const IDENTITY: &str = "instance/service-accounts/default/identity";

/// HTTP client for the instance metadata server.
///
/// Instance facts (project, region, instance id) never change for the life
/// of an instance, so they are fetched once and memoised. Tokens are always
/// fetched fresh.
pub struct MetadataClient {
    http: reqwest::Client,
    endpoint: String,
    facts: Mutex<HashMap<&'static str, String>>,
}

impl MetadataClient {
    /// Create a client for the metadata server at `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(auth::USER_AGENT)
            .timeout(Duration::from_secs(timing::METADATA_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::request("metadata client", e))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            facts: Mutex::new(HashMap::new()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, key: &str, query: &[(&str, &str)]) -> Result<String, ApiError> {
        let url = format!("{}/computeMetadata/v1/{}", self.endpoint, key);
        let resource = format!("metadata key {}", key);

        let response = self
            .http
            .get(&url)
            .query(query)
            .header(auth::METADATA_FLAVOR_HEADER, auth::METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| ApiError::request(&resource, e))?;

        if let Some(err) = ApiError::from_status(response.status().as_u16(), &resource) {
            debug!("Metadata request for {} failed: {}", key, response.status());
            return Err(err);
        }

        response
            .text()
            .await
            .map_err(|e| ApiError::request(&resource, e))
    }

    /// Fetch a fact once; later calls are served from memory. The lock is
    /// held across the fetch so concurrent first callers share one request.
    async fn fact(&self, key: &'static str) -> Result<String, ApiError> {
        let mut facts = self.facts.lock().await;
        if let Some(value) = facts.get(key) {
            return Ok(value.clone());
        }

        let mut value = self.get(key, &[]).await?;
        if key == REGION {
            // Returned as "projects/<number>/regions/<region>".
            value = value.rsplit('/').next().unwrap_or_default().to_string();
        }

        facts.insert(key, value.clone());
        Ok(value)
    }
}

#[async_trait]
impl TokenSource for MetadataClient {
    async fn identity_token(&self, audience: &str) -> Result<String, ApiError> {
        self.get(IDENTITY, &[("audience", audience)]).await
    }

    async fn access_token(&self, scopes: &[&str]) -> Result<AccessToken, ApiError> {
        let scopes = scopes.join(",");
        let body = self.get(TOKEN, &[("scopes", scopes.as_str())]).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::malformed("access token", e))
    }
}

#[async_trait]
impl InstanceMetadata for MetadataClient {
    async fn project_id(&self) -> Result<String, ApiError> {
        self.fact(PROJECT_ID).await
    }

    async fn numeric_project_id(&self) -> Result<String, ApiError> {
        self.fact(NUMERIC_PROJECT_ID).await
    }

    async fn region(&self) -> Result<String, ApiError> {
        self.fact(REGION).await
    }

    async fn instance_id(&self) -> Result<String, ApiError> {
        self.fact(INSTANCE_ID).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::error::ApiErrorKind;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ID_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.e30.signature";

    async fn metadata_server() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/region"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("projects/123456789/regions/us-east1"),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/service-accounts/default/identity"))
            .and(query_param("audience", "https://ping.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ID_TOKEN))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
            .and(query_param("scopes", "https://www.googleapis.com/auth/cloud-platform"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"access_token":"ya29.test","expires_in":3484,"token_type":"Bearer"}"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/id"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/project/numeric-project-id"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        server
    }

    #[tokio::test]
    async fn test_project_id_is_memoised() {
        let server = metadata_server().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/project/project-id"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("test"))
            .expect(1)
            .mount(&server)
            .await;
        let client = MetadataClient::new(&server.uri()).unwrap();

        assert_eq!(client.project_id().await.unwrap(), "test");
        assert_eq!(client.project_id().await.unwrap(), "test");
        // `expect(1)` on the mock is verified when the server drops.
    }

    #[tokio::test]
    async fn test_region_is_last_path_segment() {
        let server = metadata_server().await;
        let client = MetadataClient::new(&server.uri()).unwrap();
        assert_eq!(client.region().await.unwrap(), "us-east1");
    }

    #[tokio::test]
    async fn test_identity_token_for_audience() {
        let server = metadata_server().await;
        let client = MetadataClient::new(&server.uri()).unwrap();
        let token = client
            .identity_token("https://ping.example.com")
            .await
            .unwrap();
        assert_eq!(token, ID_TOKEN);
    }

    #[tokio::test]
    async fn test_access_token() {
        let server = metadata_server().await;
        let client = MetadataClient::new(&server.uri()).unwrap();
        let token = client
            .access_token(&[auth::CLOUD_PLATFORM_SCOPE])
            .await
            .unwrap();
        assert_eq!(token.access_token, "ya29.test");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3484);
    }

    #[tokio::test]
    async fn test_status_errors() {
        let server = metadata_server().await;
        let client = MetadataClient::new(&server.uri()).unwrap();

        let err = client.instance_id().await.unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::NotFound);

        let err = client.numeric_project_id().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_malformed_token_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"broken\""))
            .mount(&server)
            .await;

        let client = MetadataClient::new(&server.uri()).unwrap();
        let err = client.access_token(&["scope"]).await.unwrap_err();
        assert!(matches!(err, ApiError::Malformed { .. }));
    }
}
