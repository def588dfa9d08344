//! Filesystem path constants.

/// Default location of the mTLS configuration bundle.
pub const DEFAULT_MTLS_CONFIG: &str = "mtls.json";

/// Default YAML config file for binaries.
pub const DEFAULT_RUNTIME_CONFIG: &str = "/etc/run/config.yaml";
