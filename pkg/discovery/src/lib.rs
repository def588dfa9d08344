//! Endpoint discovery through Service Directory and round-robin selection
//! over the discovered replicas.

pub mod balancer;
pub mod directory;
pub mod network;

use pkg_types::ApiError;
use std::net::IpAddr;
use thiserror::Error;

pub use balancer::{EndpointSet, RoundRobinLoadBalancer};
pub use directory::{EndpointDirectory, EndpointRegistration, ServiceDirectoryClient};
pub use network::{NetworkInterface, ip_address, ip_addresses, network_interfaces};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("endpoint lookup failed: {0}")]
    Lookup(#[from] ApiError),

    #[error("no endpoints registered for service {service} in namespace '{namespace}'")]
    NoEndpoints { service: String, namespace: String },

    #[error("address {0} is not an RFC 1918 instance address")]
    UnroutableAddress(IpAddr),

    #[error("RFC 1918 address not found")]
    NoInstanceAddress,

    #[error("failed to list network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("K_SERVICE is not set")]
    MissingServiceName,
}
