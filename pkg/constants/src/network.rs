//! Network-related constants.

/// Default port for the HTTP server when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Default port for the mutual-TLS listener when `MTLS_PORT` is unset.
pub const DEFAULT_MTLS_PORT: u16 = 8443;

/// Domain suffix of structured service names (`service.namespace.run.local`).
pub const DEFAULT_RUN_DOMAIN: &str = "run.local";

/// Namespace assigned to single-label service names.
pub const DEFAULT_NAMESPACE: &str = "";

/// Address reserved by the platform; never advertised as an instance address.
pub const RESERVED_INSTANCE_ADDRESS: &str = "192.168.1.1";
