//! Timeouts and intervals.

/// Interval between background refreshes of a load balancer's endpoint list.
pub const ENDPOINT_REFRESH_INTERVAL_SECS: u64 = 10;

/// Timeout for metadata server requests.
pub const METADATA_TIMEOUT_SECS: u64 = 5;

/// Timeout for Cloud Run Admin and Secret Manager requests.
pub const API_TIMEOUT_SECS: u64 = 5;

/// Timeout for Service Directory requests.
pub const SERVICE_DIRECTORY_TIMEOUT_SECS: u64 = 10;

/// Default timeout for outbound requests made through the transport.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
