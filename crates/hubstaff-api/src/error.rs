//! Error types for API calls

/// Errors from API requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable access token could be obtained.
    #[error("authentication failed: {0}")]
    Auth(#[from] hubstaff_auth::Error),

    /// The API answered with a non-success status. The body is kept verbatim.
    #[error("API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("invalid JSON response: {0}")]
    Decode(String),
}

impl Error {
    /// HTTP status of an API error response, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;
