//! Error types for cached requests

use thiserror::Error;

/// Failures of the underlying network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response payload: {reason}")]
    Decode { reason: String },
}

impl TransportError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// HTTP status code, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of a failed request. Every coalesced waiter receives a clone of
/// the same value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Not authenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Loader for {key} panicked or was torn down before settling")]
    LoaderPanicked { key: String },

    /// Rejected before anything was sent, e.g. an id that would change the
    /// request path.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl FetchError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for cached requests.
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::status(503, "Service Unavailable");
        assert_eq!(
            err.to_string(),
            "Request failed with status 503: Service Unavailable"
        );
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(TransportError::decode("eof").status_code(), None);
    }

    #[test]
    fn test_fetch_error_kinds() {
        let unauth = FetchError::unauthenticated("no session");
        assert!(unauth.is_unauthenticated());
        assert!(!unauth.is_transport());
        assert!(unauth.transport().is_none());

        let transport: FetchError = TransportError::connection("refused").into();
        assert!(transport.is_transport());
        assert_eq!(
            transport.transport(),
            Some(&TransportError::connection("refused"))
        );
        assert_eq!(transport.to_string(), "Connection failed: refused");

        let invalid = FetchError::invalid_request("bad id");
        assert!(!invalid.is_transport());
        assert_eq!(invalid.to_string(), "Invalid request: bad id");
    }
}
