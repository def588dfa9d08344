//! Credential-related constants.

/// OAuth scope requested for calls to Google Cloud control-plane APIs.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Header required by the metadata server on every request.
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

/// Value of the `Metadata-Flavor` header.
pub const METADATA_FLAVOR: &str = "Google";

/// User agent sent to the metadata server and Google APIs.
pub const USER_AGENT: &str = concat!("run-rs/", env!("CARGO_PKG_VERSION"));

/// Annotation key carrying the instance id on registered endpoints.
pub const INSTANCE_ID_ANNOTATION: &str = "instance_id";
