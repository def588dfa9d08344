use serde::{Deserialize, Serialize};

/// On-disk mTLS configuration bundle (`mtls.json`).
///
/// Example:
/// ```json
/// {
///   "allow_list": ["spiffe://example.org/ns/default/sa/frontend"],
///   "ca": "<base64 PEM>",
///   "certificate": "<base64 PEM>",
///   "key": "<base64 PEM>"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtlsConfigFile {
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(rename = "ca")]
    pub ca_certificate: String,
    pub certificate: String,
    pub key: String,
}
