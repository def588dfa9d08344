use serde::{Deserialize, Serialize};

/// Response of the Secret Manager `versions.access` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretVersion {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub payload: SecretPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretPayload {
    /// Secret data stored as a base64-encoded value.
    #[serde(default)]
    pub data: String,
}
