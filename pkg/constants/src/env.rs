//! Environment variable names.

// ─── Platform-provided ────────────────────────────────────────────────────

/// Port the HTTP server should listen on.
pub const PORT: &str = "PORT";

/// Name of the running service.
pub const K_SERVICE: &str = "K_SERVICE";

/// Name of the running revision.
pub const K_REVISION: &str = "K_REVISION";

/// Name of the configuration that created the revision.
pub const K_CONFIGURATION: &str = "K_CONFIGURATION";

// ─── Library overrides ────────────────────────────────────────────────────

/// Port of the mutual-TLS listener.
pub const MTLS_PORT: &str = "MTLS_PORT";

/// Path of the mTLS configuration bundle.
pub const MTLS_CONFIGURATION_PATH: &str = "MTLS_CONFIGURATION_PATH";

/// Namespace used for single-label service names.
pub const DEFAULT_NAMESPACE: &str = "RUN_DEFAULT_NAMESPACE";

/// Domain suffix of structured `service.namespace.domain` names.
pub const RUN_DOMAIN: &str = "RUN_DOMAIN";

pub const METADATA_ENDPOINT: &str = "RUN_METADATA_ENDPOINT";
pub const SERVICE_DIRECTORY_ENDPOINT: &str = "RUN_SERVICE_DIRECTORY_ENDPOINT";
pub const CLOUD_RUN_ENDPOINT: &str = "RUN_CLOUD_RUN_ENDPOINT";
pub const SECRET_MANAGER_ENDPOINT: &str = "RUN_SECRET_MANAGER_ENDPOINT";

/// Seconds between background endpoint refreshes.
pub const ENDPOINT_REFRESH_SECS: &str = "RUN_ENDPOINT_REFRESH_SECS";

/// Seconds a resolved service URL stays cached. Unset means forever.
pub const SERVICE_URL_TTL_SECS: &str = "RUN_SERVICE_URL_TTL_SECS";
