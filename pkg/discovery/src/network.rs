//! Addresses assigned to the running instance.

use pkg_constants::network;
use serde::Serialize;
use std::net::IpAddr;

use crate::DiscoveryError;

/// A network interface and the addresses bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub index: Option<u32>,
    pub ip_addresses: Vec<IpAddr>,
}

/// Interfaces attached to the instance, in the order the OS reports them.
pub fn network_interfaces() -> Result<Vec<NetworkInterface>, DiscoveryError> {
    let addrs = if_addrs::get_if_addrs().map_err(DiscoveryError::Interfaces)?;

    let mut interfaces: Vec<NetworkInterface> = Vec::new();
    for addr in addrs {
        let ip = addr.ip();
        match interfaces.iter_mut().find(|i| i.name == addr.name) {
            Some(existing) => existing.ip_addresses.push(ip),
            None => interfaces.push(NetworkInterface {
                name: addr.name,
                index: addr.index,
                ip_addresses: vec![ip],
            }),
        }
    }
    Ok(interfaces)
}

/// Every non-loopback IPv4 address of the instance.
pub fn ip_addresses() -> Result<Vec<IpAddr>, DiscoveryError> {
    let addrs = if_addrs::get_if_addrs().map_err(DiscoveryError::Interfaces)?;
    Ok(addrs
        .iter()
        .filter(|a| !a.is_loopback())
        .map(|a| a.ip())
        .filter(IpAddr::is_ipv4)
        .collect())
}

/// The RFC 1918 address the instance should advertise as its endpoint.
pub fn ip_address() -> Result<IpAddr, DiscoveryError> {
    let addrs = if_addrs::get_if_addrs().map_err(DiscoveryError::Interfaces)?;
    instance_address(addrs.iter().map(|a| a.ip())).ok_or(DiscoveryError::NoInstanceAddress)
}

/// First RFC 1918 address in `addrs`.
pub fn instance_address<I>(addrs: I) -> Option<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find(|ip| is_rfc1918(*ip))
}

/// Whether `ip` is an RFC 1918 address usable as an instance endpoint.
pub fn is_rfc1918(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() && v4.to_string() != network::RESERVED_INSTANCE_ADDRESS,
        IpAddr::V6(_) => false,
    }
}
