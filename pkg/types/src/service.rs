use serde::{Deserialize, Serialize};

/// The subset of a Cloud Run (Knative serving) service the resolver needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub status: ServiceStatus,
}

/// Current state of a Cloud Run service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// URL distributing traffic over the service's traffic targets, usually
    /// `https://{route-hash}-{project-hash}-{suffix}.a.run.app`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub address: ServiceAddress,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceAddress {
    #[serde(default)]
    pub url: String,
}

impl Service {
    /// The address URL, falling back to the status URL when absent.
    pub fn url(&self) -> Option<&str> {
        [&self.status.address.url, &self.status.url]
            .into_iter()
            .find(|u| !u.is_empty())
            .map(String::as_str)
    }
}
