//! Command phase errors
//!
//! Each variant names the phase that failed and carries its own exit code, so
//! scripts can tell a broken config from an expired refresh token without
//! parsing stderr.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    Usage(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("loading state failed: {0}")]
    LoadState(#[source] hubstaff_auth::Error),

    #[error("saving state failed: {0}")]
    SaveState(#[source] hubstaff_auth::Error),

    #[error("resolving issuer failed: {0}")]
    ResolveIssuer(#[source] hubstaff_auth::Error),

    #[error("refreshing token failed: {0}")]
    RefreshToken(#[source] hubstaff_auth::Error),

    #[error("request failed: {0}")]
    IssueRequest(#[source] hubstaff_api::Error),
}

impl Error {
    /// Process exit code for this phase. 1 is left for unclassified errors
    /// and 2 matches clap's own usage errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Usage(_) => 2,
            Error::Config(_) => 3,
            Error::LoadState(_) => 4,
            Error::SaveState(_) => 5,
            Error::ResolveIssuer(_) => 6,
            Error::RefreshToken(_) => 7,
            Error::IssueRequest(_) => 8,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            Error::Usage(_) => "parse arguments",
            Error::Config(_) => "load config",
            Error::LoadState(_) => "load state",
            Error::SaveState(_) => "save state",
            Error::ResolveIssuer(_) => "resolve issuer",
            Error::RefreshToken(_) => "refresh token",
            Error::IssueRequest(_) => "issue request",
        }
    }

    /// Whether the user has to obtain a new personal access token.
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            Error::RefreshToken(e) => e.requires_reauthorization(),
            _ => false,
        }
    }
}

/// Errors from a token manager call, split by where the refresh chain broke.
impl From<hubstaff_auth::Error> for Error {
    fn from(err: hubstaff_auth::Error) -> Self {
        match err {
            hubstaff_auth::Error::Discovery(_) => Error::ResolveIssuer(err),
            _ => Error::RefreshToken(err),
        }
    }
}

/// Errors from an API call. Token failures surface through `Auth`.
impl From<hubstaff_api::Error> for Error {
    fn from(err: hubstaff_api::Error) -> Self {
        match err {
            hubstaff_api::Error::Auth(auth) => auth.into(),
            other => Error::IssueRequest(other),
        }
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
