use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One network-reachable replica of a logical service, as stored in
/// Service Directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl Endpoint {
    /// Convenience constructor for an endpoint without metadata.
    pub fn new(name: &str, address: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            port,
            ..Default::default()
        }
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Response body of the Service Directory `endpoints.list` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEndpoints {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}
