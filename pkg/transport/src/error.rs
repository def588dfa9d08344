use pkg_discovery::DiscoveryError;
use pkg_pki::MtlsError;
use pkg_types::ApiError;
use pkg_types::error::ApiErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to fetch identity token: {0}")]
    Token(#[source] ApiError),

    #[error("endpoint discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to resolve service {service}: {source}")]
    Resolution {
        service: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to rewrite request URL: {0}")]
    Rewrite(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("failed to set up API client: {0}")]
    Setup(#[source] ApiError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mTLS configuration error: {0}")]
    Tls(#[from] MtlsError),
}

/// Coarse category of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Token,
    Discovery,
    Resolution,
    Rewrite,
    Http,
    Tls,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Token(_) => TransportErrorKind::Token,
            TransportError::Discovery(_) => TransportErrorKind::Discovery,
            TransportError::Resolution { .. } => TransportErrorKind::Resolution,
            TransportError::Rewrite(_) | TransportError::InvalidHeader(_) => {
                TransportErrorKind::Rewrite
            }
            TransportError::Setup(_) | TransportError::Http(_) => TransportErrorKind::Http,
            TransportError::Tls(_) => TransportErrorKind::Tls,
        }
    }

    /// Category of the underlying platform API failure, if any.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            TransportError::Token(e)
            | TransportError::Setup(e)
            | TransportError::Resolution { source: e, .. }
            | TransportError::Discovery(DiscoveryError::Lookup(e)) => Some(e.kind()),
            _ => None,
        }
    }
}
