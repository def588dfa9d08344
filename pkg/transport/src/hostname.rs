use pkg_types::config::RuntimeConfig;
use std::net::IpAddr;
use thiserror::Error;

/// A logical service name: `service` or `service.namespace.{run_domain}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hostname {
    /// Empty for single-label names.
    pub domain: String,
    pub namespace: String,
    pub service: String,
}

impl Hostname {
    /// `service.namespace`, the load balancer key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.service, self.namespace)
    }

    /// Whether the host was a single label.
    pub fn is_bare(&self) -> bool {
        self.domain.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostnameError {
    #[error("host {0} carries an explicit port")]
    PortPresent(String),

    #[error("host {0} is an IP address")]
    IpLiteral(String),

    #[error("empty host")]
    Empty,

    #[error("host has {0} labels, expected 1 or 4")]
    LabelCount(usize),

    #[error("domain {0} is not the platform domain")]
    UnknownDomain(String),
}

/// Classifies request hosts as logical service names.
#[derive(Debug, Clone)]
pub struct HostnameParser {
    default_namespace: String,
    run_domain: String,
}

impl HostnameParser {
    pub fn new(default_namespace: &str, run_domain: &str) -> Self {
        Self {
            default_namespace: default_namespace.to_string(),
            run_domain: run_domain.to_string(),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(&config.default_namespace, &config.run_domain)
    }

    pub fn run_domain(&self) -> &str {
        &self.run_domain
    }

    pub fn parse(&self, host: &str) -> Result<Hostname, HostnameError> {
        if host.is_empty() {
            return Err(HostnameError::Empty);
        }
        let unbracketed = host.trim_start_matches('[').trim_end_matches(']');
        if unbracketed.parse::<IpAddr>().is_ok() {
            return Err(HostnameError::IpLiteral(host.to_string()));
        }
        if host.contains(':') {
            return Err(HostnameError::PortPresent(host.to_string()));
        }

        let labels: Vec<&str> = host.split('.').collect();
        match labels.as_slice() {
            [service] => Ok(Hostname {
                domain: String::new(),
                namespace: self.default_namespace.clone(),
                service: service.to_string(),
            }),
            [service, namespace, tld @ ..] if tld.len() == 2 => {
                let domain = tld.join(".");
                if domain != self.run_domain {
                    return Err(HostnameError::UnknownDomain(domain));
                }
                Ok(Hostname {
                    domain,
                    namespace: namespace.to_string(),
                    service: service.to_string(),
                })
            }
            labels => Err(HostnameError::LabelCount(labels.len())),
        }
    }
}
