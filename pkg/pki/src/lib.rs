//! Mutual TLS with SPIFFE workload identities.
//!
//! [`MtlsConfigManager`] owns the `mtls.json` bundle. [`SpiffeVerifier`] and
//! [`CertResolver`] plug it into rustls for both the client and the server
//! side of a connection. [`WorkloadCA`] issues bundles for tests and local
//! development.

pub mod ca;
pub mod identity;
pub mod mtls;
pub mod verifier;

use std::path::PathBuf;
use thiserror::Error;

pub use ca::WorkloadCA;
pub use identity::{spiffe_id_from_certificate, verify_peer_certificate};
pub use mtls::{MtlsConfigManager, MtlsMaterial};
pub use verifier::{CertResolver, SpiffeVerifier};

/// Failure loading or using the mTLS bundle.
#[derive(Debug, Error)]
pub enum MtlsError {
    #[error("failed to read mTLS configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mTLS configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field '{field}' is not valid base64: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("field '{field}' is not valid PEM: {source}")]
    Pem {
        field: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("field '{0}' contains no certificates")]
    NoCertificates(&'static str),

    #[error("field 'key' contains no private key")]
    NoPrivateKey,

    #[error("CA certificate rejected as trust anchor: {0}")]
    TrustAnchor(#[source] rustls::Error),

    #[error("TLS error: {0}")]
    Tls(#[source] rustls::Error),
}

/// Reason a peer certificate chain was refused.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to parse certificate {index} of the peer chain")]
    ParseCertificate { index: usize },

    #[error("peer presented no certificates")]
    EmptyChain,

    #[error("peer certificate has no URI SAN")]
    MissingIdentity,

    #[error("peer certificate has {0} URI SANs, expected exactly one")]
    MultipleIdentities(usize),

    #[error("certificate chain verification failed: {0}")]
    Verification(#[source] webpki::Error),

    #[error("peer identity {0} is not in the allow list")]
    Rejected(String),

    #[error("mTLS configuration unavailable: {0}")]
    Config(#[from] MtlsError),
}
