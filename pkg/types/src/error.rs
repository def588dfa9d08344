use thiserror::Error;

/// Failure taxonomy shared by every platform API client
/// (metadata server, Service Directory, Cloud Run Admin, Secret Manager).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("permission denied accessing {0}")]
    PermissionDenied(String),

    #[error("unauthorized request to {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request to {0}")]
    InvalidRequest(String),

    #[error("unexpected status {status} retrieving {resource}")]
    UnexpectedStatus { status: u16, resource: String },

    #[error("request to {resource} failed: {source}")]
    Request {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {resource}: {reason}")]
    Malformed { resource: String, reason: String },
}

/// Coarse category of an [`ApiError`], for callers deciding on fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    PermissionDenied,
    Unauthorized,
    NotFound,
    Unknown,
}

impl ApiError {
    /// Map a non-success HTTP status to an error. Returns `None` for 2xx.
    pub fn from_status(status: u16, resource: impl Into<String>) -> Option<Self> {
        let resource = resource.into();
        match status {
            200..=299 => None,
            400 => Some(ApiError::InvalidRequest(resource)),
            401 => Some(ApiError::Unauthorized(resource)),
            403 => Some(ApiError::PermissionDenied(resource)),
            404 => Some(ApiError::NotFound(resource)),
            status => Some(ApiError::UnexpectedStatus { status, resource }),
        }
    }

    pub fn request(resource: impl Into<String>, source: reqwest::Error) -> Self {
        ApiError::Request {
            resource: resource.into(),
            source,
        }
    }

    pub fn malformed(resource: impl Into<String>, reason: impl ToString) -> Self {
        ApiError::Malformed {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::PermissionDenied(_) => ApiErrorKind::PermissionDenied,
            ApiError::Unauthorized(_) => ApiErrorKind::Unauthorized,
            ApiError::NotFound(_) => ApiErrorKind::NotFound,
            _ => ApiErrorKind::Unknown,
        }
    }
}
