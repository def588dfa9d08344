//! Default base URLs of the platform services.

/// Metadata server reachable from every instance.
pub const METADATA_ENDPOINT: &str = "http://metadata.google.internal";

/// Service Directory API.
pub const SERVICE_DIRECTORY_ENDPOINT: &str = "https://servicedirectory.googleapis.com";

/// Secret Manager API (v1).
pub const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com/v1";

/// Regional Cloud Run Admin API. `{region}` is substituted at call time.
pub const CLOUD_RUN_ENDPOINT_TEMPLATE: &str = "https://{region}-run.googleapis.com";
