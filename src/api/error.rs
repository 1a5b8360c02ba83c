use thiserror::Error;

/// Errors returned by [`GatorClient`](super::GatorClient) operations.
///
/// Variants fall into four groups:
/// - transport failures (`Network`, `Timeout`, `ResponseTooLarge`)
/// - backend-reported rejections (`Validation`, `Decode`)
/// - stale references (`NotFound`)
/// - local preconditions checked before any request is sent
///   (`Precondition`, `InvalidInput`)
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Backend rejected the request (400, 409, 422)
    #[error("{message}")]
    Validation { status: u16, message: String },
    /// Backend could not find the referenced resource (404)
    #[error("{message}")]
    NotFound { message: String },
    /// Any other non-2xx status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Operation cannot run in the current local state
    #[error("{0}")]
    Precondition(&'static str),
    /// Caller-supplied value failed local validation
    #[error("{0}")]
    InvalidInput(String),
}

impl ApiError {
    /// Returns true if this error is transient and the request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Network(_) => true,
            ApiError::HttpStatus(status) => *status >= 500,
            ApiError::ResponseTooLarge(_)
            | ApiError::Validation { .. }
            | ApiError::NotFound { .. }
            | ApiError::Decode(_)
            | ApiError::Precondition(_)
            | ApiError::InvalidInput(_) => false,
        }
    }

    /// Map a reqwest failure, keeping timeouts distinct from other transport errors.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }

    /// True for errors raised locally, before any request left the process.
    pub fn is_local(&self) -> bool {
        matches!(self, ApiError::Precondition(_) | ApiError::InvalidInput(_))
    }

    /// Single-line message suitable for showing to the user.
    ///
    /// Backend `{"error": "..."}` messages are passed through verbatim; transport
    /// failures are summarized without the underlying reqwest chain.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Could not reach the Gator server".to_string(),
            ApiError::Timeout => "The Gator server did not respond in time".to_string(),
            ApiError::HttpStatus(status) if *status >= 500 => {
                format!("The Gator server failed to handle the request (status {})", status)
            }
            other => other.to_string(),
        }
    }

    /// Map a non-success status and its body to an error.
    ///
    /// The body is expected to be `{"error": "..."}`; anything else falls back to
    /// a generic message for the status.
    pub(crate) fn from_status(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .map(|b| b.error)
            .filter(|m| !m.trim().is_empty());

        match status {
            400 | 409 | 422 => ApiError::Validation {
                status,
                message: message.unwrap_or_else(|| "Request rejected by server".to_string()),
            },
            404 => ApiError::NotFound {
                message: message.unwrap_or_else(|| "Not found".to_string()),
            },
            _ => ApiError::HttpStatus(status),
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
}
