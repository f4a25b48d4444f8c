//! Error types for state, issuer and token lifecycle operations

/// Errors from state persistence, issuer resolution and token refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The stored pair has no refresh token; re-authorize out-of-band.
    #[error("no refresh token available, a new token pair must be installed")]
    NoRefreshToken,

    /// The refresh token's own `exp` claim is in the past.
    #[error("refresh token expired at {expired_at} (unix seconds)")]
    RefreshTokenExpired { expired_at: i64 },

    /// The authorization server declined the refresh grant.
    #[error("refresh rejected by authorization server: {0}")]
    RefreshRejected(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("issuer discovery failed: {0}")]
    Discovery(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("corrupt state: {0}")]
    CorruptState(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether this failure can only be fixed by installing a new token pair.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Error::NoRefreshToken | Error::RefreshTokenExpired { .. } | Error::RefreshRejected(_)
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
