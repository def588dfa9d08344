//! Metadata server access: instance facts and service-account credentials.
//!
//! The traits are the seams the rest of the workspace depends on, so tests
//! can substitute in-memory sources for the real metadata server.

pub mod client;

use async_trait::async_trait;
use pkg_types::ApiError;
use pkg_types::token::AccessToken;

pub use client::MetadataClient;

/// Supplies bearer credentials for outbound calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Identity token whose audience is `audience` (usually `scheme://host`).
    async fn identity_token(&self, audience: &str) -> Result<String, ApiError>;

    /// OAuth2 access token for the given scopes.
    async fn access_token(&self, scopes: &[&str]) -> Result<AccessToken, ApiError>;
}

/// Facts about the running instance.
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    async fn project_id(&self) -> Result<String, ApiError>;
    async fn numeric_project_id(&self) -> Result<String, ApiError>;
    async fn region(&self) -> Result<String, ApiError>;
    async fn instance_id(&self) -> Result<String, ApiError>;
}
